use quotes_storage::api;
use quotes_storage::config::Config;
use quotes_storage::health::{HealthChecker, SERVICE_NAME};
use quotes_storage::logging;
use quotes_storage::pool::{connect, PoolStats};
use quotes_storage::schema::{ensure_schema, RetentionPolicy};

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env()?;
    let _guard = logging::init(SERVICE_NAME, &config.log_dir);

    if let Err(e) = dotenv {
        warn!("No .env file found or error loading it: {}", e);
    }

    let socket_addr = config.socket_addr()?;

    info!("Starting {} health endpoint on {}", SERVICE_NAME, socket_addr);
    info!(
        "Pool size: min {} / max {}, acquire timeout {:?}",
        config.min_connections, config.max_connections, config.pool_timeout
    );
    info!("Quote table: {}", config.table);

    let pool = connect(&config).await?;

    if config.bootstrap_schema {
        let policy = RetentionPolicy {
            compress_after_days: config.compress_after_days,
            retention_days: config.retention_days,
        };
        ensure_schema(&pool, &config.table, policy).await?;
    }

    let checker = Arc::new(HealthChecker::new(pool.clone(), config.table.clone()));
    let app = api::router(checker);

    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("Server listening on {}", socket_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = PoolStats::of(&pool);
    info!(
        "Closing pool ({} connections, {} idle)",
        stats.size, stats.available
    );
    pool.close();

    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
