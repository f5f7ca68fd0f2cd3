//! WebSocket endpoint: upgrades the connection and pumps frames between
//! the socket and the session coordinator.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::ws::coordinator::Coordinator;
use crate::ws::registry::CollabHub;

/// WebSocket handler for `/ws`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<CollabHub>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Pump one socket until it closes.
///
/// Receiving and sending are independent directions: outgoing messages are
/// queued on an unbounded outbox drained by a separate task, so a slow
/// reader never blocks the relay. Transport close or error is treated
/// identically to an explicit `leave`.
async fn handle_socket(socket: WebSocket, hub: Arc<CollabHub>) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel();
    let mut coordinator = Coordinator::new(hub, outbox);

    // Drain the outbox into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Feed incoming text frames to the coordinator. Binary frames and
    // transport errors fall through; stream end exits the loop.
    while let Some(Ok(frame)) = stream.next().await {
        if let Message::Text(text) = frame {
            coordinator.handle_text(&text).await;
            if coordinator.is_disconnected() {
                break;
            }
        }
    }

    // Implicit leave for abrupt closes, no-op after an explicit leave.
    coordinator.disconnect();
    send_task.abort();
    info!("WebSocket connection terminated");
}
