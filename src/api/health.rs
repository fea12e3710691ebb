use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a secret-free config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let features = &state.config.features;
    Json(json!({
        "status": "chat-relay is running",
        "config": {
            "upstream_configured": state.upstream_configured(),
            "default_model": state.default_model(),
            "environment": features.environment.to_string(),
            "log_level": features.log_level,
        }
    }))
}
