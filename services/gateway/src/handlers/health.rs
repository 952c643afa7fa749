use std::collections::BTreeMap;

use crate::models::HealthResponse;
use crate::state::AppState;
use axum::{Json, extract::State};
use sensor_feed::bus::BroadcastBus;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sources: state.reader.source_count(),
        subscribers: state.bus.subscriber_count(),
    })
}

/// Feed counters plus gauges read from the live bus.
pub async fn metrics(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    let mut exported = state.metrics.export();
    exported.insert(
        "subscribers".to_string(),
        state.bus.subscriber_count() as u64,
    );
    exported.insert(
        "lagging_subscribers".to_string(),
        state.bus.lagging_subscribers() as u64,
    );
    Json(exported)
}
