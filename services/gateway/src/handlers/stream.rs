use std::sync::Arc;

use crate::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use sensor_feed::bus::BroadcastBus;
use sensor_feed::session::{ChannelSink, StreamSession};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// Records buffered between the session task and the response body
const SSE_BUFFER: usize = 16;

/// SSE endpoint: one `message` event per changed measurement
///
/// The session task ends when the client goes away (the response body, and
/// with it the channel receiver, is dropped) or on shutdown.
pub async fn measurement_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel(SSE_BUFFER);
    let session = StreamSession::new(state.bus.subscribe(), Arc::clone(&state.metrics));
    tokio::spawn(session.run(ChannelSink::new(tx), state.shutdown.child_token()));

    let events = ReceiverStream::new(rx)
        .map(|measurement| Event::default().event("message").json_data(&measurement));

    Sse::new(events).keep_alive(KeepAlive::default())
}
