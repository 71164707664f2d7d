//! Core of the database exporter: a declarative SQL-to-metrics pipeline.
//!
//! Metric definitions are loaded from TOML documents and interpreted
//! uniformly by a generic scrape engine: each definition's SQL request is
//! executed against one shared connection pool, result rows are mapped to
//! string-keyed maps, and the declared columns are turned into typed metric
//! samples. The [`Exporter`] facade composes the pipeline and implements the
//! prometheus collector contract, either scraping synchronously on each
//! collect request or serving an atomically published snapshot refreshed by
//! a background ticker.

pub mod cache;
pub mod config;
pub mod db;
pub mod definitions;
pub mod error;
pub mod exporter;
pub mod orchestrator;
pub mod rows;
pub mod scraper;
pub mod server;
pub mod store;

pub use error::{Error, Result};
pub use exporter::Exporter;

// Metric name parts.
pub const NAMESPACE: &str = "oracledb";
pub const SUBSYSTEM: &str = "exporter";
