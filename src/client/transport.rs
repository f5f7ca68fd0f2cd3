//! WebSocket transport for the reconciliation layer.
//!
//! Connects to the relay, drives the [`ClientCore`] state machine, and
//! reconnects after a fixed delay whenever the transport drops, until the
//! consumer tears the client down. Teardown sends a best-effort `leave`
//! before closing.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::client::buffer::EditBuffer;
use crate::client::core::ClientCore;
use crate::error::CollabError;
use crate::models::{ClientMessage, ServerMessage};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Retry policy for dropped transports. Unbounded by default: the layer
/// keeps retrying silently rather than surfacing every transient drop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// `None` retries indefinitely.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_retries: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_retries.map_or(true, |max| attempts <= max)
    }
}

/// Local events fed in by the consumer (the editor UI).
#[derive(Debug, Clone)]
pub enum LocalEvent {
    Edit {
        change_type: String,
        position: Option<u64>,
        content: Option<String>,
        previous_content: Option<String>,
    },
    Cursor(u64),
    Chat(String),
    /// Tear the client down (e.g. navigating away).
    Shutdown,
}

enum Outcome {
    TornDown,
    Dropped,
}

/// Collaboration client: one relay connection plus reconnect loop.
pub struct CollabClient<B: EditBuffer> {
    core: ClientCore<B>,
    url: String,
    policy: ReconnectPolicy,
}

impl<B: EditBuffer> CollabClient<B> {
    pub fn new(
        core: ClientCore<B>,
        url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> Result<Self, CollabError> {
        let url = url.into();
        validate_endpoint(&url)?;
        Ok(Self { core, url, policy })
    }

    pub fn core(&self) -> &ClientCore<B> {
        &self.core
    }

    /// Run until the consumer shuts the client down (or retries run out
    /// under a bounded policy). Returns the core so the consumer keeps its
    /// buffer, presence, and chat record.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<LocalEvent>,
    ) -> Result<ClientCore<B>, CollabError> {
        let mut attempts: u32 = 0;
        loop {
            self.core.on_connecting();
            match connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    info!("Connected to relay at {}", self.url);
                    attempts = 0;
                    match self.drive(stream, &mut events).await {
                        Outcome::TornDown => return Ok(self.core),
                        Outcome::Dropped => self.core.on_disconnected(),
                    }
                }
                Err(e) => {
                    warn!("Relay connection failed: {}", e);
                    self.core.on_disconnected();
                }
            }

            attempts += 1;
            if !self.policy.should_retry(attempts) {
                return Err(CollabError::Transport(format!(
                    "gave up after {} reconnect attempts",
                    attempts
                )));
            }
            if self.wait_for_retry(&mut events).await {
                return Ok(self.core);
            }
        }
    }

    /// Drive one live connection until it drops or is torn down.
    async fn drive(
        &mut self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        events: &mut mpsc::UnboundedReceiver<LocalEvent>,
    ) -> Outcome {
        let (mut sink, mut source) = stream.split();

        let auth = self.core.on_connected();
        if send_frame(&mut sink, &auth).await.is_err() {
            return Outcome::Dropped;
        }

        loop {
            tokio::select! {
                incoming = source.next() => match incoming {
                    Some(Ok(frame)) if frame.is_text() => {
                        let Ok(text) = frame.into_text() else { continue };
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(message) => {
                                if let Some(reply) = self.core.on_message(message) {
                                    if send_frame(&mut sink, &reply).await.is_err() {
                                        return Outcome::Dropped;
                                    }
                                }
                            }
                            Err(e) => error!("Ignoring malformed server frame: {}", e),
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Transport error: {}", e);
                        return Outcome::Dropped;
                    }
                    None => return Outcome::Dropped,
                },

                event = events.recv() => match event {
                    Some(LocalEvent::Shutdown) | None => {
                        // Best-effort leave before closing.
                        let _ = send_frame(&mut sink, &self.core.leave_message()).await;
                        let _ = sink.close().await;
                        return Outcome::TornDown;
                    }
                    Some(event) => {
                        let frame = self.apply_local(event);
                        if send_frame(&mut sink, &frame).await.is_err() {
                            return Outcome::Dropped;
                        }
                    }
                },
            }
        }
    }

    /// Sit out the reconnect delay. Local edits arriving meanwhile are
    /// applied optimistically but not synchronized; they fall outside any
    /// peer's view until the author types again. Returns true on shutdown.
    async fn wait_for_retry(&mut self, events: &mut mpsc::UnboundedReceiver<LocalEvent>) -> bool {
        let delay = sleep(self.policy.delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => return false,
                event = events.recv() => match event {
                    Some(LocalEvent::Shutdown) | None => return true,
                    Some(event) => {
                        self.apply_local(event);
                    }
                },
            }
        }
    }

    fn apply_local(&mut self, event: LocalEvent) -> ClientMessage {
        match event {
            LocalEvent::Edit {
                change_type,
                position,
                content,
                previous_content,
            } => self
                .core
                .local_edit(change_type, position, content, previous_content),
            LocalEvent::Cursor(position) => self.core.local_cursor(position),
            LocalEvent::Chat(text) => self.core.local_chat(text),
            LocalEvent::Shutdown => unreachable!("shutdown handled by callers"),
        }
    }
}

async fn send_frame(sink: &mut WsSink, message: &ClientMessage) -> Result<(), CollabError> {
    let text = serde_json::to_string(message)?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| CollabError::Transport(e.to_string()))
}

/// Secure transport is required for anything that is not local loopback.
fn validate_endpoint(url: &str) -> Result<(), CollabError> {
    if url.starts_with("wss://") {
        return Ok(());
    }
    let Some(rest) = url.strip_prefix("ws://") else {
        return Err(CollabError::Transport(
            "endpoint must use ws:// or wss://".to_string(),
        ));
    };

    let authority = rest.split('/').next().unwrap_or("");
    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or("")
    } else {
        authority.split(':').next().unwrap_or("")
    };

    match host {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        _ => Err(CollabError::Transport(
            "plaintext ws:// is permitted only for local loopback".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_policy_always_retries() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(1_000_000));
    }

    #[test]
    fn bounded_policy_stops_after_max() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(1),
            max_retries: Some(2),
        };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn loopback_may_use_plaintext() {
        assert!(validate_endpoint("ws://localhost:3000/ws").is_ok());
        assert!(validate_endpoint("ws://127.0.0.1/ws").is_ok());
        assert!(validate_endpoint("ws://[::1]:3000/ws").is_ok());
    }

    #[test]
    fn remote_hosts_require_wss() {
        assert!(validate_endpoint("ws://books.example.com/ws").is_err());
        assert!(validate_endpoint("wss://books.example.com/ws").is_ok());
        assert!(validate_endpoint("http://example.com").is_err());
    }
}
