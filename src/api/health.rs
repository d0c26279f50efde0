use crate::health::{HealthChecker, HealthReport, HealthStatus};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

/// 200 unless a check is unhealthy, then 503; the body is the full report
pub async fn health_check(
    State(checker): State<Arc<HealthChecker>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = checker.check_all().await;
    (status_code(report.overall_status), Json(report))
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}
