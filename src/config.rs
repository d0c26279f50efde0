use crate::error::{Result, StorageError};
use crate::schema::TableRef;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub pool_timeout: Duration,
    pub table: TableRef,
    pub insert_batch_size: usize,
    pub compress_after_days: u32,
    pub retention_days: u32,
    pub bootstrap_schema: bool,
    pub health_host: String,
    pub health_port: u16,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Build database_url from individual fields or use DATABASE_URL if provided
        let database_url = if let Ok(url) = env::var("DATABASE_URL") {
            url
        } else {
            let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5433".to_string());
            let db_name = env::var("DB_NAME").unwrap_or_else(|_| "quotes".to_string());
            let db_user = env::var("DB_USER").unwrap_or_else(|_| "quotes_user".to_string());
            let db_password = env::var("DB_PASSWORD").unwrap_or_else(|_| "password".to_string());

            // URL-encode password to handle special characters
            let encoded_password = urlencoding::encode(&db_password);

            format!(
                "postgres://{}:{}@{}:{}/{}",
                db_user, encoded_password, db_host, db_port, db_name
            )
        };

        let min_connections = env_or("POOL_MIN_CONNECTIONS", 10);
        let max_connections = env_or("POOL_MAX_CONNECTIONS", 30).max(min_connections).max(1);
        let pool_timeout_secs: u64 = env_or("POOL_TIMEOUT_SECS", 5);

        let schema = env::var("QUOTES_SCHEMA").unwrap_or_else(|_| "quotes".to_string());
        let table_name = env::var("QUOTES_TABLE").unwrap_or_else(|_| "real_time".to_string());
        let table = TableRef::new(&schema, &table_name).map_err(|e| StorageError::Config {
            message: e.to_string(),
        })?;

        let health_host = env::var("HEALTH_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let health_port = env_or("HEALTH_PORT", 9100);

        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./logs"));

        let bootstrap_schema = env::var("BOOTSTRAP_SCHEMA")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            database_url,
            min_connections,
            max_connections,
            pool_timeout: Duration::from_secs(pool_timeout_secs),
            table,
            insert_batch_size: env_or("INSERT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            compress_after_days: env_or("COMPRESS_AFTER_DAYS", 30),
            retention_days: env_or("RETENTION_DAYS", 730),
            bootstrap_schema,
            health_host,
            health_port,
            log_dir,
        })
    }

    /// Minimal config for tools that only need a database URL
    pub fn with_database_url(database_url: &str) -> Self {
        Config {
            database_url: database_url.to_string(),
            min_connections: 1,
            max_connections: 4,
            pool_timeout: Duration::from_secs(5),
            table: TableRef::default(),
            insert_batch_size: DEFAULT_BATCH_SIZE,
            compress_after_days: 30,
            retention_days: 730,
            bootstrap_schema: false,
            health_host: "127.0.0.1".to_string(),
            health_port: 9100,
            log_dir: PathBuf::from("./logs"),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.health_host, self.health_port);
        addr.parse().map_err(|e| StorageError::Config {
            message: format!("Invalid socket address {}: {}", addr, e),
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
