//! Connection handling for the monitored database.
//!
//! One pooled handle per target DSN. The pool is opened lazily, probed with
//! a trivial query before each scrape cycle, and transparently reopened when
//! the probe reports the session closed. Connection strings are masked in
//! every log line.

use parking_lot::RwLock;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};

const PROBE_QUERY: &str = "SELECT 1";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

static INSTALL_DRIVERS: Once = Once::new();

/// Pool limits applied once at open time.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub max_open: u32,
    pub max_idle: u32,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 0,
        }
    }
}

/// Owns the live database session for one target DSN.
pub struct ConnectionManager {
    dsn: String,
    limits: PoolLimits,
    pool: RwLock<AnyPool>,
}

impl ConnectionManager {
    /// Opens a lazy pool for the DSN; no round trip happens until the first
    /// query, so an unreachable database is only visible to [`ensure_live`].
    ///
    /// [`ensure_live`]: ConnectionManager::ensure_live
    pub fn open(dsn: &str, limits: PoolLimits) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
        let pool = Self::connect(dsn, limits)?;
        Ok(Self {
            dsn: dsn.to_string(),
            limits,
            pool: RwLock::new(pool),
        })
    }

    fn connect(dsn: &str, limits: PoolLimits) -> Result<AnyPool> {
        debug!(
            dsn = %mask_dsn(dsn),
            max_open = limits.max_open,
            max_idle = limits.max_idle,
            "opening connection pool"
        );
        AnyPoolOptions::new()
            .max_connections(limits.max_open)
            .min_connections(limits.max_idle)
            .connect_lazy(dsn)
            .map_err(|e| Error::Connection(e.to_string()))
    }

    /// A clone of the current pool, shared query-only by all scrape tasks.
    pub fn pool(&self) -> AnyPool {
        self.pool.read().clone()
    }

    /// Probes the current pool with a trivial query. When the failure
    /// reports a closed connection the pool is reopened and probed again;
    /// any other failure propagates without a reconnect.
    pub async fn ensure_live(&self) -> Result<()> {
        match self.probe(&self.pool()).await {
            Ok(()) => Ok(()),
            Err(err) if is_closed(&err) => {
                info!(dsn = %mask_dsn(&self.dsn), "connection closed, reconnecting");
                let fresh = Self::connect(&self.dsn, self.limits)?;
                let probed = self.probe(&fresh).await;
                *self.pool.write() = fresh;
                probed
            }
            Err(err) => Err(err),
        }
    }

    async fn probe(&self, pool: &AnyPool) -> Result<()> {
        let ping = sqlx::query(PROBE_QUERY).execute(pool);
        match tokio::time::timeout(PROBE_TIMEOUT, ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::Connection(e.to_string())),
            Err(_) => Err(Error::Connection(format!(
                "liveness probe timed out after {PROBE_TIMEOUT:?}"
            ))),
        }
    }
}

fn is_closed(err: &Error) -> bool {
    matches!(err, Error::Connection(msg) if msg.contains("closed"))
}

/// Masks credentials in a connection string: everything before the first
/// `@` is dropped. A string without `@` is treated as malformed outright so
/// that no fragment of it can leak into logs.
pub fn mask_dsn(dsn: &str) -> String {
    match dsn.split_once('@') {
        Some((_, tail)) => format!("***@{tail}"),
        None => "malformedDSN:=***@".to_string(),
    }
}
