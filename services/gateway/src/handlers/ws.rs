use std::sync::Arc;

use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    SinkExt,
    stream::{SplitSink, StreamExt},
};
use sensor_feed::bus::BroadcastBus;
use sensor_feed::session::{EventSink, StreamSession};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use types::errors::SinkError;
use types::measurement::Measurement;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Writes each measurement as a JSON text frame.
struct WsSink {
    sender: SplitSink<WebSocket, Message>,
    client_gone: CancellationToken,
}

#[async_trait]
impl EventSink for WsSink {
    async fn send(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        let text = serde_json::to_string(measurement).map_err(|e| SinkError::Encode {
            reason: e.to_string(),
        })?;
        self.sender
            .send(Message::Text(Utf8Bytes::from(text)))
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn closed(&self) {
        self.client_gone.cancelled().await
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let client_gone = CancellationToken::new();

    // Inbound frames are ignored; the reader only watches for the client leaving.
    let reader = {
        let client_gone = client_gone.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                if let Message::Close(_) = msg {
                    break;
                }
            }
            debug!("WebSocket client disconnected");
            client_gone.cancel();
        })
    };

    let sink = WsSink {
        sender,
        client_gone,
    };
    let session = StreamSession::new(state.bus.subscribe(), Arc::clone(&state.metrics));
    session.run(sink, state.shutdown.child_token()).await;

    reader.abort();
}
