//! Connection provider
//!
//! Builds the pooled database handle that every other component receives
//! explicitly. There is no process-wide engine: binaries call [`connect`]
//! once and pass the pool down.

use crate::config::Config;
use crate::error::{Result, StorageError};
use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use serde::Serialize;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Point-in-time view of pool usage
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

impl PoolStats {
    pub fn of(pool: &Pool) -> Self {
        let status = pool.status();
        Self {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }
}

/// Create the pool without opening any connection
pub fn create_pool(config: &Config) -> Result<Pool> {
    let mut cfg = PgConfig::new();
    cfg.url = Some(config.database_url.clone());

    // Verified recycling runs a liveness query before a connection is handed out
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Verified,
    });

    cfg.pool = Some(PoolConfig {
        max_size: config.max_connections as usize,
        timeouts: Timeouts {
            wait: Some(config.pool_timeout),
            create: Some(config.pool_timeout),
            recycle: Some(config.pool_timeout),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StorageError::Config {
            message: format!("Failed to create pool: {}", e),
        })
}

/// Create the pool, check the server answers, and open `min_connections`
pub async fn connect(config: &Config) -> Result<Pool> {
    let pool = create_pool(config)?;

    let client = pool.get().await.map_err(|e| StorageError::ConnectionFailed {
        cause: e.to_string(),
    })?;

    // Simple ping query
    client
        .execute("SELECT 1", &[])
        .await
        .map_err(|e| StorageError::ConnectionFailed {
            cause: format!("Ping failed: {}", e),
        })?;
    drop(client);

    let warm = config.min_connections.min(config.max_connections) as usize;
    let mut held = Vec::with_capacity(warm);
    for _ in 0..warm {
        held.push(pool.get().await?);
    }
    drop(held);

    let stats = PoolStats::of(&pool);
    debug!("Pool warmed: {:?}", stats);
    info!(
        "Connected to PostgreSQL ({} of {} connections open)",
        stats.size, stats.max_size
    );

    Ok(pool)
}
