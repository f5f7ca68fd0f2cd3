use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::{diagnostics, health_check, ready_check};
use crate::ws::CollabHub;

/// Create API routes
pub fn create_api_routes(hub: Arc<CollabHub>) -> Router {
    Router::<Arc<CollabHub>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .with_state(hub)
}
