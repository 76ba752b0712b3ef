use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::order_stream_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Order endpoints
        .route("/api/orders", post(handlers::submit_order))
        .route("/api/orders/ws", get(order_stream_handler))
        // System endpoints
        .route("/api/stats", get(handlers::get_stats))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::get_metrics))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
