//! The Prometheus-facing exporter.
//!
//! [`Exporter`] owns the definition store, the connection manager and the
//! operational self-metrics, and implements [`prometheus::core::Collector`]
//! so a standard registry can drive it. Definition-derived samples are
//! converted into protobuf metric families on the fly; the operational
//! metrics ride along as ordinary registered primitives.

use prometheus::core::{Collector, Desc};
use prometheus::proto;
use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, Opts};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::error;

use crate::cache::ScrapeCache;
use crate::db::ConnectionManager;
use crate::orchestrator;
use crate::scraper::{SampleValue, ScrapeSample};
use crate::store::DefinitionStore;
use crate::{NAMESPACE, SUBSYSTEM};

/// Scrapes the target database and exposes the result as metric families.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Exporter {
    store: Arc<DefinitionStore>,
    conn: Arc<ConnectionManager>,
    cache: Option<Arc<ScrapeCache>>,
    query_timeout: Duration,
    runtime: Handle,

    duration: Gauge,
    total_scrapes: IntCounter,
    scrape_errors: IntCounterVec,
    last_error: IntGauge,
    up: IntGauge,
}

impl Exporter {
    /// Builds the exporter and its operational metrics. With `cached` set,
    /// collect requests serve the snapshot published by a
    /// [`ScrapeScheduler`](crate::cache::ScrapeScheduler); otherwise every
    /// collect triggers a fresh scrape.
    pub fn new(
        store: Arc<DefinitionStore>,
        conn: Arc<ConnectionManager>,
        query_timeout: Duration,
        cached: bool,
    ) -> crate::Result<Self> {
        let duration = Gauge::with_opts(
            Opts::new(
                "last_scrape_duration_seconds",
                "Duration of the last scrape of metrics from the database.",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        )?;
        let total_scrapes = IntCounter::with_opts(
            Opts::new(
                "scrapes_total",
                "Total number of times the database was scraped for metrics.",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        )?;
        let scrape_errors = IntCounterVec::new(
            Opts::new(
                "scrape_errors_total",
                "Total number of times an error occurred scraping a database metric.",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
            &["collector"],
        )?;
        let last_error = IntGauge::with_opts(
            Opts::new(
                "last_scrape_error",
                "Whether the last scrape of metrics from the database resulted in an error (1 for error, 0 for success).",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        )?;
        let up = IntGauge::with_opts(
            Opts::new("up", "Whether the database server is up.").namespace(NAMESPACE),
        )?;

        Ok(Self {
            store,
            conn,
            cache: cached.then(|| Arc::new(ScrapeCache::new())),
            query_timeout,
            runtime: Handle::current(),
            duration,
            total_scrapes,
            scrape_errors,
            last_error,
            up,
        })
    }

    /// Runs one full scrape cycle: reload definitions if their sources
    /// changed, verify the connection, fan out every definition, and update
    /// the operational metrics. Always returns the samples that were
    /// produced; failures surface through `up`, `last_scrape_error` and the
    /// per-collector error counters.
    pub async fn scrape(&self) -> Vec<ScrapeSample> {
        let started = std::time::Instant::now();
        self.total_scrapes.inc();
        let mut failed = false;

        if let Err(err) = self.store.reload_if_changed() {
            // The previous generation stays active; reload failure is an
            // error condition but not a scrape abort.
            error!(%err, "error reloading metric definitions");
            failed = true;
        }

        let samples = match self.conn.ensure_live().await {
            Ok(()) => {
                self.up.set(1);
                let outcome = orchestrator::run_all(
                    self.store.current(),
                    self.conn.pool(),
                    self.query_timeout,
                )
                .await;
                for (context, _) in &outcome.errors {
                    self.scrape_errors.with_label_values(&[context.as_str()]).inc();
                    failed = true;
                }
                outcome.samples
            }
            Err(err) => {
                error!(%err, "error pinging the database");
                self.up.set(0);
                failed = true;
                Vec::new()
            }
        };

        self.duration.set(started.elapsed().as_secs_f64());
        self.last_error.set(failed as i64);
        samples
    }

    /// Publishes a sample set into the snapshot cache. No-op when the
    /// exporter was built uncached.
    pub fn publish(&self, samples: Vec<ScrapeSample>) {
        if let Some(cache) = &self.cache {
            cache.publish(samples);
        }
    }

    /// Runs one scrape and reports the distinct `(name, help)` pairs it
    /// produced, in first-seen order.
    pub async fn describe(&self) -> Vec<(String, String)> {
        let samples = self.scrape().await;
        let mut seen = HashMap::new();
        let mut out = Vec::new();
        for sample in samples {
            if seen.insert(sample.name.clone(), ()).is_none() {
                out.push((sample.name, sample.help));
            }
        }
        out
    }

    fn sample_families(&self) -> Vec<proto::MetricFamily> {
        let samples = match &self.cache {
            Some(cache) => cache.latest().samples.clone(),
            // Synchronous collect path: block this worker thread on a fresh
            // scrape. Requires the multi-threaded runtime.
            None => tokio::task::block_in_place(|| {
                self.runtime.block_on(self.scrape())
            }),
        };
        to_metric_families(samples)
    }
}

impl Collector for Exporter {
    fn desc(&self) -> Vec<&Desc> {
        self.duration
            .desc()
            .into_iter()
            .chain(self.total_scrapes.desc())
            .chain(self.scrape_errors.desc())
            .chain(self.last_error.desc())
            .chain(self.up.desc())
            .collect()
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let mut families = self.sample_families();
        families.extend(self.duration.collect());
        families.extend(self.total_scrapes.collect());
        families.extend(self.scrape_errors.collect());
        families.extend(self.last_error.collect());
        families.extend(self.up.collect());
        families
    }
}

/// Groups flat samples into metric families, one per name, keeping
/// first-seen order. The family type is taken from the first sample.
fn to_metric_families(samples: Vec<ScrapeSample>) -> Vec<proto::MetricFamily> {
    let mut order = Vec::new();
    let mut by_name: HashMap<String, proto::MetricFamily> = HashMap::new();

    for sample in samples {
        let family_type = match &sample.value {
            SampleValue::Gauge(_) => proto::MetricType::GAUGE,
            SampleValue::Counter(_) => proto::MetricType::COUNTER,
            SampleValue::Histogram { .. } => proto::MetricType::HISTOGRAM,
        };
        let family = by_name.entry(sample.name.clone()).or_insert_with(|| {
            order.push(sample.name.clone());
            let mut family = proto::MetricFamily::default();
            family.set_name(sample.name.clone());
            family.set_help(sample.help.clone());
            family.set_field_type(family_type);
            family
        });
        family.mut_metric().push(to_proto_metric(&sample));
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

fn to_proto_metric(sample: &ScrapeSample) -> proto::Metric {
    let mut metric = proto::Metric::default();
    for (name, value) in &sample.labels {
        let mut pair = proto::LabelPair::default();
        pair.set_name(name.clone());
        pair.set_value(value.clone());
        metric.mut_label().push(pair);
    }

    match &sample.value {
        SampleValue::Gauge(v) => {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(*v);
            metric.set_gauge(gauge);
        }
        SampleValue::Counter(v) => {
            let mut counter = proto::Counter::default();
            counter.set_value(*v);
            metric.set_counter(counter);
        }
        SampleValue::Histogram { sum, count, buckets } => {
            let mut histogram = proto::Histogram::default();
            histogram.set_sample_sum(*sum);
            histogram.set_sample_count(*count);
            for (upper_bound, cumulative) in buckets {
                let mut bucket = proto::Bucket::default();
                bucket.set_upper_bound(*upper_bound);
                bucket.set_cumulative_count(*cumulative);
                histogram.mut_bucket().push(bucket);
            }
            // The +Inf bucket always carries the total count.
            let mut inf = proto::Bucket::default();
            inf.set_upper_bound(f64::INFINITY);
            inf.set_cumulative_count(*count);
            histogram.mut_bucket().push(inf);
            metric.set_histogram(histogram);
        }
    }
    metric
}
