use axum::{extract::State, Json};

use crate::api::{
    state::AppState,
    types::{HealthResponse, StatsResponse},
};

/// GET /health -- liveness probe
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue = state.queue.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_seconds(),
        in_flight: state.metrics.in_flight(),
        queued: queue.waiting + queue.delayed,
    })
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        pipeline: state.metrics.snapshot(),
        queue: state.queue.stats().await,
        broadcaster: state.broadcaster.stats(),
    })
}

/// GET /metrics -- Prometheus text format
pub async fn get_metrics(State(state): State<AppState>) -> String {
    state.metrics.prometheus()
}
