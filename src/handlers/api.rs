use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::core::relay::OPENAI_BETA_HEADER;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PricingInfo {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    pub cached_per_1k: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub configured_model: String,
    pub websocket_url: String,
    pub api_version: &'static str,
    pub pricing: PricingInfo,
}

/// Liveness endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

/// Report the configured realtime model, its upstream URL and its rates.
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfoResponse> {
    let pricing = state.pricing();

    Json(ModelInfoResponse {
        configured_model: state.config.openai_model.clone(),
        websocket_url: state.websocket_url(),
        api_version: OPENAI_BETA_HEADER,
        pricing: PricingInfo {
            input_per_1k: pricing.input_per_1k,
            output_per_1k: pricing.output_per_1k,
            cached_per_1k: pricing.cached_per_1k,
        },
    })
}
