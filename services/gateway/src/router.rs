use crate::handlers::{health, measurements, stream, ws};
use crate::state::AppState;
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/measurements", get(measurements::list_measurements))
        .route("/measurements/{source}", get(measurements::get_measurement))
        .route("/stream", get(stream::measurement_stream))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
