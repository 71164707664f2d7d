//! Configuration management for the exporter.
//!
//! Settings are resolved from three layers, later ones overriding earlier:
//! 1. Built-in defaults
//! 2. An optional TOML settings file (`--config`)
//! 3. Environment variables and command-line flags
//!
//! The environment variable names match the historical flag surface:
//! `DATA_SOURCE_NAME`, `TELEMETRY_PATH`, `DEFAULT_METRICS`, `CUSTOM_METRICS`,
//! `QUERY_TIMEOUT`, `DATABASE_MAXIDLECONNS`, `DATABASE_MAXOPENCONNS`.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Command-line arguments
#[derive(Debug, Default, Parser)]
#[command(version, about = "Prometheus exporter for SQL-defined database metrics")]
pub struct Args {
    /// Optional TOML settings file layered under flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to expose metrics on
    #[arg(long = "web.listen-address", env = "LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", env = "TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    /// Connection string for the monitored database
    #[arg(long = "database.dsn", env = "DATA_SOURCE_NAME", hide_env_values = true)]
    pub dsn: Option<String>,

    /// File with default metric definitions (TOML)
    #[arg(long = "default.metrics", env = "DEFAULT_METRICS")]
    pub default_metrics: Option<PathBuf>,

    /// Comma-separated files with additional metric definitions (TOML)
    #[arg(long = "custom.metrics", env = "CUSTOM_METRICS")]
    pub custom_metrics: Option<String>,

    /// Query timeout in seconds
    #[arg(long = "query.timeout", env = "QUERY_TIMEOUT")]
    pub query_timeout: Option<u64>,

    /// Maximum idle connections kept in the pool
    #[arg(long = "database.max-idle-conns", env = "DATABASE_MAXIDLECONNS")]
    pub max_idle_conns: Option<u32>,

    /// Maximum open connections in the pool
    #[arg(long = "database.max-open-conns", env = "DATABASE_MAXOPENCONNS")]
    pub max_open_conns: Option<u32>,

    /// Seconds between background scrapes; 0 scrapes on collect requests
    #[arg(long = "scrape.interval", env = "SCRAPE_INTERVAL")]
    pub scrape_interval: Option<u64>,
}

/// Resolved service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen_address: String,
    pub telemetry_path: String,
    #[serde(default)]
    pub dsn: String,
    pub default_metrics: PathBuf,
    #[serde(default)]
    pub custom_metrics: Vec<PathBuf>,
    pub query_timeout: u64,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub scrape_interval: u64,
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("listen_address", "0.0.0.0:9161")?
            .set_default("telemetry_path", "/metrics")?
            .set_default("default_metrics", "default-metrics.toml")?
            .set_default("query_timeout", 5_i64)?
            .set_default("max_idle_conns", 0_i64)?
            .set_default("max_open_conns", 10_i64)?
            .set_default("scrape_interval", 0_i64)?;

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Some(v) = &args.listen_address {
            settings.listen_address = v.clone();
        }
        if let Some(v) = &args.telemetry_path {
            settings.telemetry_path = v.clone();
        }
        if let Some(v) = &args.dsn {
            settings.dsn = v.clone();
        }
        if let Some(v) = &args.default_metrics {
            settings.default_metrics = v.clone();
        }
        if let Some(v) = &args.custom_metrics {
            settings.custom_metrics = v
                .split(',')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(v) = args.query_timeout {
            settings.query_timeout = v;
        }
        if let Some(v) = args.max_idle_conns {
            settings.max_idle_conns = v;
        }
        if let Some(v) = args.max_open_conns {
            settings.max_open_conns = v;
        }
        if let Some(v) = args.scrape_interval {
            settings.scrape_interval = v;
        }

        if settings.dsn.is_empty() {
            return Err(Error::Config(
                "no connection string; set DATA_SOURCE_NAME or --database.dsn".into(),
            ));
        }

        // The router requires an absolute route path.
        if !settings.telemetry_path.starts_with('/') {
            return Err(Error::Config(format!(
                "telemetry path {:?} must start with '/'",
                settings.telemetry_path
            )));
        }

        Ok(settings)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// The background scrape cadence; `None` means scrape synchronously on
    /// every collect request.
    pub fn scrape_interval(&self) -> Option<Duration> {
        (self.scrape_interval > 0).then(|| Duration::from_secs(self.scrape_interval))
    }
}
