use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::api::{
    state::AppState,
    types::{ErrorResponse, OrderAccepted},
};
use crate::domain::OrderDraft;
use crate::error::DexflowError;

/// POST /api/orders -- validate and enqueue; execution is asynchronous
pub async fn submit_order(
    State(state): State<AppState>,
    body: std::result::Result<Json<OrderDraft>, JsonRejection>,
) -> Response {
    let Json(draft) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::message(rejection.body_text())),
            )
                .into_response();
        }
    };

    match state.gate.submit(draft).await {
        Ok(admission) => (
            StatusCode::ACCEPTED,
            Json(OrderAccepted::from(admission)),
        )
            .into_response(),
        Err(DexflowError::Validation(err)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::validation(&err)),
        )
            .into_response(),
        Err(DexflowError::Admission(reason)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::message(format!(
                "Order could not be queued: {}",
                reason
            ))),
        )
            .into_response(),
        Err(e) => {
            warn!("Unexpected admission error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::message(e.to_string())),
            )
                .into_response()
        }
    }
}
