//! Health probe for the TimescaleDB store
//!
//! Three independent read-only diagnostics: server reachability, presence of
//! the `timescaledb` extension, and existence of the quote hypertable. Each
//! check reports its own status and the report reduces them to one overall
//! status.

use crate::schema::TableRef;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use tracing::{debug, warn};

pub const SERVICE_NAME: &str = "quotes-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        self == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<i64>,
}

impl CheckResult {
    fn healthy(message: &str) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.to_string(),
            version: None,
            chunks: None,
        }
    }

    fn unhealthy(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message,
            version: None,
            chunks: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub timescaledb: CheckResult,
    pub hypertable: CheckResult,
}

impl HealthChecks {
    pub fn statuses(&self) -> [HealthStatus; 3] {
        [
            self.database.status,
            self.timescaledb.status,
            self.hypertable.status,
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub checks: HealthChecks,
    pub overall_status: HealthStatus,
}

/// Envelope expected by the external supervisor's status collector
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorReport {
    pub repository: String,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
}

impl From<HealthReport> for SupervisorReport {
    fn from(report: HealthReport) -> Self {
        Self {
            repository: report.service,
            status: report.overall_status,
            timestamp: report.timestamp,
            checks: report.checks,
        }
    }
}

/// All healthy → healthy; any unhealthy → unhealthy; anything else → degraded
pub fn overall_status<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let statuses: Vec<HealthStatus> = statuses.into_iter().collect();

    if statuses.iter().all(|s| s.is_healthy()) {
        HealthStatus::Healthy
    } else if statuses.contains(&HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

pub struct HealthChecker {
    pool: Pool,
    table: TableRef,
}

impl HealthChecker {
    pub fn new(pool: Pool, table: TableRef) -> Self {
        Self { pool, table }
    }

    /// `SELECT version()` round trip
    pub async fn check_database_connection(&self) -> CheckResult {
        let result = async {
            let client = self.pool.get().await.map_err(|e| e.to_string())?;
            let row = client
                .query_one("SELECT version()", &[])
                .await
                .map_err(|e| e.to_string())?;
            Ok::<String, String>(row.get(0))
        }
        .await;

        database_result(result)
    }

    pub async fn check_timescaledb_extension(&self) -> CheckResult {
        let result = async {
            let client = self.pool.get().await.map_err(|e| e.to_string())?;
            let row = client
                .query_opt(
                    "SELECT extversion FROM pg_extension WHERE extname = 'timescaledb'",
                    &[],
                )
                .await
                .map_err(|e| e.to_string())?;
            Ok::<Option<String>, String>(row.map(|r| r.get(0)))
        }
        .await;

        extension_result(result)
    }

    pub async fn check_hypertable(&self) -> CheckResult {
        let result = async {
            let client = self.pool.get().await.map_err(|e| e.to_string())?;
            let row = client
                .query_opt(
                    r#"
                    SELECT num_chunks
                    FROM timescaledb_information.hypertables
                    WHERE hypertable_schema = $1 AND hypertable_name = $2
                    "#,
                    &[&self.table.schema(), &self.table.table()],
                )
                .await
                .map_err(|e| e.to_string())?;
            Ok::<Option<i64>, String>(row.map(|r| r.get(0)))
        }
        .await;

        hypertable_result(result)
    }

    /// Run every check concurrently and reduce the statuses
    pub async fn check_all(&self) -> HealthReport {
        let (database, timescaledb, hypertable) = tokio::join!(
            self.check_database_connection(),
            self.check_timescaledb_extension(),
            self.check_hypertable(),
        );

        let checks = HealthChecks {
            database,
            timescaledb,
            hypertable,
        };
        let overall = overall_status(checks.statuses());

        match overall {
            HealthStatus::Healthy => debug!("Health check passed for {}", self.table),
            status => warn!("Health check for {} is {:?}: {:?}", self.table, status, checks),
        }

        HealthReport {
            timestamp: Utc::now(),
            service: SERVICE_NAME.to_string(),
            checks,
            overall_status: overall,
        }
    }
}

fn database_result(result: Result<String, String>) -> CheckResult {
    match result {
        Ok(version) => CheckResult {
            // "PostgreSQL 16.2 on x86_64-pc-linux-gnu, ..." -> "PostgreSQL 16.2"
            version: Some(version.split_whitespace().take(2).collect::<Vec<_>>().join(" ")),
            ..CheckResult::healthy("Database connected")
        },
        Err(e) => CheckResult::unhealthy(format!("Database connection failed: {}", e)),
    }
}

fn extension_result(result: Result<Option<String>, String>) -> CheckResult {
    match result {
        Ok(Some(version)) => CheckResult {
            version: Some(version),
            ..CheckResult::healthy("TimescaleDB extension loaded")
        },
        Ok(None) => CheckResult::unhealthy("TimescaleDB extension not found".to_string()),
        Err(e) => CheckResult::unhealthy(format!("Extension check failed: {}", e)),
    }
}

fn hypertable_result(result: Result<Option<i64>, String>) -> CheckResult {
    match result {
        Ok(Some(chunks)) => CheckResult {
            chunks: Some(chunks),
            ..CheckResult::healthy("Hypertable operational")
        },
        Ok(None) => CheckResult::unhealthy("Hypertable not found".to_string()),
        Err(e) => CheckResult::unhealthy(format!("Hypertable check failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pool::create_pool;
    use std::time::Duration;
    use HealthStatus::*;

    #[test]
    fn test_overall_status() {
        assert_eq!(overall_status([Healthy, Healthy, Healthy]), Healthy);
        assert_eq!(overall_status([Healthy, Unhealthy, Healthy]), Unhealthy);
        assert_eq!(overall_status([Healthy, Degraded, Healthy]), Degraded);
        assert_eq!(overall_status([Degraded, Unhealthy, Healthy]), Unhealthy);
    }

    #[test]
    fn test_database_result() {
        let ok = database_result(Ok("PostgreSQL 14.0 on x86_64-linux".to_string()));
        assert_eq!(ok.status, Healthy);
        assert_eq!(ok.message, "Database connected");
        assert_eq!(ok.version.as_deref(), Some("PostgreSQL 14.0"));

        let err = database_result(Err("Connection refused".to_string()));
        assert_eq!(err.status, Unhealthy);
        assert!(err.message.contains("Connection refused"));
    }

    #[test]
    fn test_extension_result() {
        let ok = extension_result(Ok(Some("2.12.0".to_string())));
        assert_eq!(ok.status, Healthy);
        assert_eq!(ok.version.as_deref(), Some("2.12.0"));

        let missing = extension_result(Ok(None));
        assert_eq!(missing.status, Unhealthy);
        assert!(missing.message.contains("not found"));

        let err = extension_result(Err("permission denied".to_string()));
        assert!(err.message.contains("permission denied"));
    }

    #[test]
    fn test_hypertable_result() {
        let ok = hypertable_result(Ok(Some(5)));
        assert_eq!(ok.status, Healthy);
        assert_eq!(ok.message, "Hypertable operational");
        assert_eq!(ok.chunks, Some(5));

        assert_eq!(hypertable_result(Ok(None)).status, Unhealthy);
        assert!(hypertable_result(Err("Schema error".to_string()))
            .message
            .contains("Schema error"));
    }

    #[test]
    fn test_report_serialization() {
        let checks = HealthChecks {
            database: database_result(Ok("PostgreSQL 16.1".to_string())),
            timescaledb: extension_result(Ok(Some("2.14.2".to_string()))),
            hypertable: hypertable_result(Ok(Some(3))),
        };
        let report = HealthReport {
            timestamp: Utc::now(),
            service: SERVICE_NAME.to_string(),
            overall_status: overall_status(checks.statuses()),
            checks,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["service"], "quotes-storage");
        assert_eq!(json["overall_status"], "healthy");
        assert_eq!(json["checks"]["hypertable"]["chunks"], 3);
        assert!(json["checks"]["database"].get("chunks").is_none());

        let supervisor = serde_json::to_value(SupervisorReport::from(report)).unwrap();
        assert_eq!(supervisor["repository"], "quotes-storage");
        assert_eq!(supervisor["status"], "healthy");
    }

    #[tokio::test]
    async fn test_unreachable_database_is_unhealthy() {
        let mut config = Config::with_database_url("postgres://user:pw@127.0.0.1:1/quotes");
        config.pool_timeout = Duration::from_millis(200);
        let checker = HealthChecker::new(create_pool(&config).unwrap(), TableRef::default());

        let report = checker.check_all().await;
        assert_eq!(report.overall_status, Unhealthy);
        assert_eq!(report.checks.database.status, Unhealthy);
        assert_eq!(report.checks.timescaledb.status, Unhealthy);
        assert_eq!(report.checks.hypertable.status, Unhealthy);
    }
}
