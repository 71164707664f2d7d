//! Runs every definition of one generation concurrently and folds the
//! results into a single outcome.

use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::definitions::{MetricDefinition, MetricDefinitionSet};
use crate::error::{Error, Result};
use crate::rows;
use crate::scraper::{self, ScrapeSample};

/// The combined result of one scrape cycle: every sample that was produced,
/// plus the contexts that failed and why. Partial failure is the normal
/// case, not an abort.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub samples: Vec<ScrapeSample>,
    pub errors: Vec<(String, Error)>,
}

/// Fans out one scrape task per definition and waits for all of them. Tasks
/// share the pool; a failing or slow definition never blocks its siblings
/// beyond the join itself.
pub async fn run_all(
    set: Arc<MetricDefinitionSet>,
    pool: AnyPool,
    query_timeout: Duration,
) -> ScrapeOutcome {
    let mut tasks: FuturesUnordered<_> = set
        .definitions
        .iter()
        .map(|def| {
            let pool = pool.clone();
            async move {
                let started = std::time::Instant::now();
                let result = scrape_one(def, &pool, query_timeout).await;
                (def.context.clone(), started.elapsed(), result)
            }
        })
        .collect();

    let mut outcome = ScrapeOutcome::default();
    while let Some((context, elapsed, result)) = tasks.next().await {
        match result {
            Ok(samples) => {
                debug!(context, ?elapsed, samples = samples.len(), "scraped metric");
                outcome.samples.extend(samples);
            }
            Err(err) => {
                error!(context, ?elapsed, %err, "error scraping metric");
                outcome.errors.push((context, err));
            }
        }
    }
    outcome
}

async fn scrape_one(
    def: &MetricDefinition,
    pool: &AnyPool,
    query_timeout: Duration,
) -> Result<Vec<ScrapeSample>> {
    if def.request.is_empty() {
        return Err(Error::Config(format!(
            "context {:?} has no request", def.context
        )));
    }
    if def.metrics.is_empty() {
        return Err(Error::Config(format!(
            "context {:?} has no metricsdesc", def.context
        )));
    }

    let rows = rows::fetch_row_maps(pool, &def.request, query_timeout).await?;
    scraper::scrape_definition(crate::NAMESPACE, def, &rows)
}
