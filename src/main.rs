use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oracledb_exporter::cache::ScrapeScheduler;
use oracledb_exporter::config::{Args, Settings};
use oracledb_exporter::db::{mask_dsn, ConnectionManager, PoolLimits};
use oracledb_exporter::store::DefinitionStore;
use oracledb_exporter::{server, Exporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(&args).context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dsn = %mask_dsn(&settings.dsn),
        "starting database exporter"
    );

    let store = Arc::new(
        DefinitionStore::load(
            settings.default_metrics.clone(),
            settings.custom_metrics.clone(),
        )
        .context("failed to load metric definitions")?,
    );

    let conn = Arc::new(
        ConnectionManager::open(
            &settings.dsn,
            PoolLimits {
                max_open: settings.max_open_conns,
                max_idle: settings.max_idle_conns,
            },
        )
        .context("failed to open database pool")?,
    );

    let exporter = Exporter::new(
        store,
        conn,
        settings.query_timeout(),
        settings.scrape_interval().is_some(),
    )
    .context("failed to build exporter")?;

    let registry = Registry::new();
    registry
        .register(Box::new(exporter.clone()))
        .context("failed to register exporter")?;

    if let Some(interval) = settings.scrape_interval() {
        ScrapeScheduler::new(exporter, interval).start();
    }

    let addr: SocketAddr = settings
        .listen_address
        .parse()
        .context("invalid listen address")?;
    let app = server::router(registry, &settings.telemetry_path);
    server::serve(addr, app).await?;
    Ok(())
}
