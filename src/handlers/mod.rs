mod admit;
mod health;
mod metrics;

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

use crate::state::AppState;

pub use admit::admit_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/admit/{policy}", post(admit_handler))
        .with_state(state)
}
