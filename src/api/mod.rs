mod health;

use crate::health::HealthChecker;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use health::health_check;

pub fn router(checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(checker)
}
