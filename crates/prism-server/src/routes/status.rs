//! Status and health

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let fan_out = &state.orchestrator.options().fan_out;
    Json(json!({
        "system": {
            "uptimeSecs": state.uptime_secs(),
            "version": env!("CARGO_PKG_VERSION"),
            "fanOut": fan_out.degree,
            "forwardText": fan_out.forward_text,
        },
        "cache": state.store.stats(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "prismd",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
