use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
///
/// - `GET /health` - liveness check
/// - `GET /model-info` - configured model, upstream URL and rates
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/model-info", get(api::model_info))
        .layer(TraceLayer::new_for_http())
}
