use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use tracing::{error, instrument};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReadinessBody {
    pub ready: bool,
    pub updates_total: u64,
    pub messages_sent_total: u64,
}

#[instrument(skip(_state))]
pub async fn health_check(State(_state): State<AppState>) -> &'static str {
    "OK"
}

/// 200 while the bot is polling, 503 before start-up completes and after
/// shutdown begins.
#[instrument(skip(state))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessBody>) {
    let ready = state.readiness.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadinessBody {
        ready,
        updates_total: state.metrics.updates_total(),
        messages_sent_total: state.metrics.messages_sent_total(),
    };
    (status, Json(body))
}

#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    match state.metrics.get_metrics() {
        Ok(metrics) => Ok(metrics),
        Err(e) => {
            error!("Failed to get metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
