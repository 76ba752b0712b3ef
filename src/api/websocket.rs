use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, error, info};

use crate::api::state::AppState;
use crate::api::types::{ErrorResponse, SubscribeQuery, WsMessage};

/// WebSocket handler -- streams one order's lifecycle, selected via ?orderId=
pub async fn order_stream_handler(
    Query(query): Query<SubscribeQuery>,
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> std::result::Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let order_id = query
        .order_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::message("orderId query parameter is required")),
            )
        })?;

    let ws = ws.ok_or_else(|| {
        (
            StatusCode::UPGRADE_REQUIRED,
            Json(ErrorResponse::message("websocket upgrade required")),
        )
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, order_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, order_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // Register before acknowledging so no event after the ack is missed
    let (subscription, mut rx) = state.broadcaster.channel(&order_id);
    info!("Subscriber connected for order {}", order_id);

    let ack = WsMessage::Connected {
        order_id: order_id.clone(),
    };
    match serde_json::to_string(&ack) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                state.broadcaster.release(&order_id, subscription);
                return;
            }
        }
        Err(e) => error!("Failed to serialize WebSocket ack: {}", e),
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                // None: a newer subscriber replaced this one
                let Some(event) = event else { break };

                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize lifecycle event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
                if event.is_final() {
                    debug!("Order {} reached a final state, closing stream", order_id);
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Axum answers pings itself
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcaster.release(&order_id, subscription);
    info!("WebSocket connection closed for order {}", order_id);
}
