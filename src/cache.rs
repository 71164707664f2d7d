//! Background scrape scheduling and the snapshot it publishes.
//!
//! With a scrape interval configured, collect requests never touch the
//! database: a scheduler task scrapes on a fixed cadence and atomically
//! publishes the resulting sample set, and every collect serves the latest
//! published snapshot.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::exporter::Exporter;
use crate::scraper::ScrapeSample;

/// One published scrape result. `taken_at` is `None` only for the initial
/// empty snapshot, before the first cycle completes.
#[derive(Debug, Default)]
pub struct ScrapeSnapshot {
    pub samples: Vec<ScrapeSample>,
    pub taken_at: Option<SystemTime>,
}

/// Atomically swapped snapshot holder. Readers always see a complete
/// generation, never a half-written one.
pub struct ScrapeCache {
    snapshot: ArcSwap<ScrapeSnapshot>,
}

impl ScrapeCache {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ScrapeSnapshot::default()),
        }
    }

    pub fn publish(&self, samples: Vec<ScrapeSample>) {
        self.snapshot.store(Arc::new(ScrapeSnapshot {
            samples,
            taken_at: Some(SystemTime::now()),
        }));
    }

    pub fn latest(&self) -> Arc<ScrapeSnapshot> {
        self.snapshot.load_full()
    }
}

impl Default for ScrapeCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically scrapes and publishes into the exporter's cache.
pub struct ScrapeScheduler {
    exporter: Exporter,
    interval: Duration,
}

impl ScrapeScheduler {
    pub fn new(exporter: Exporter, interval: Duration) -> Self {
        Self { exporter, interval }
    }

    /// Spawns the scheduler loop. The first scrape runs immediately so the
    /// endpoint has data before the first interval elapses; ticks that fall
    /// behind a slow scrape are skipped rather than bunched.
    pub fn start(self) -> JoinHandle<()> {
        info!(interval = ?self.interval, "starting background scraper");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let samples = self.exporter.scrape().await;
                debug!(samples = samples.len(), "published scrape snapshot");
                self.exporter.publish(samples);
            }
        })
    }
}
