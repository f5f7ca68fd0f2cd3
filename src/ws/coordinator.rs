//! Per-connection session coordination.
//!
//! Each live socket is driven by one `Coordinator` holding the connection's
//! protocol state machine:
//!
//! ```text
//! Connecting --auth--> Authenticated --join--> Joined --leave/close--> Disconnected
//! ```
//!
//! Malformed payloads are logged and ignored; known messages arriving in
//! the wrong state get an `error` reply; neither terminates the connection.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::CollabError;
use crate::models::{ClientMessage, ServerMessage};
use crate::ws::registry::{CollabHub, Outbox, ParticipantConnection, SessionKey};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnPhase {
    Connecting,
    Authenticated,
    Joined,
    Disconnected,
}

/// Drives one connection through the handshake and relays its traffic.
pub struct Coordinator {
    hub: Arc<CollabHub>,
    outbox: Outbox,
    phase: ConnPhase,
    conn: Option<Arc<ParticipantConnection>>,
}

impl Coordinator {
    pub fn new(hub: Arc<CollabHub>, outbox: Outbox) -> Self {
        Self {
            hub,
            outbox,
            phase: ConnPhase::Connecting,
            conn: None,
        }
    }

    pub fn phase(&self) -> ConnPhase {
        self.phase
    }

    pub fn is_disconnected(&self) -> bool {
        self.phase == ConnPhase::Disconnected
    }

    /// Entry point for one raw text frame off the socket.
    pub async fn handle_text(&mut self, raw: &str) {
        let message: ClientMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                // Non-parseable payloads do not terminate the connection.
                error!("Ignoring malformed message: {}", e);
                return;
            }
        };

        if let Err(e) = self.handle_message(message).await {
            match &e {
                CollabError::Protocol(_) | CollabError::Auth(_) | CollabError::Capacity(_) => {
                    warn!("Rejected message: {}", e);
                    self.reply(ServerMessage::Error {
                        message: e.to_string(),
                    });
                }
                other => error!("Connection error: {}", other),
            }
        }
    }

    /// Dispatch one parsed message against the state machine.
    pub async fn handle_message(&mut self, message: ClientMessage) -> Result<(), CollabError> {
        match self.phase {
            ConnPhase::Connecting => match message {
                ClientMessage::Auth {
                    participant_id,
                    display_name,
                } => self.authenticate(participant_id, display_name),
                _ => Err(CollabError::Protocol(
                    "not authenticated, send auth first".to_string(),
                )),
            },

            ConnPhase::Authenticated => match message {
                ClientMessage::Join {
                    book_id,
                    chapter_id,
                } => self.join(SessionKey::new(book_id, chapter_id)).await,
                ClientMessage::Auth { .. } => {
                    Err(CollabError::Protocol("already authenticated".to_string()))
                }
                _ => Err(CollabError::Protocol(
                    "not joined to a session, send join first".to_string(),
                )),
            },

            ConnPhase::Joined => {
                let conn = self
                    .conn
                    .clone()
                    .ok_or_else(|| CollabError::Protocol("no registered connection".to_string()))?;
                let session = self.hub.find_session(&conn).ok_or_else(|| {
                    CollabError::Protocol("session no longer exists".to_string())
                })?;

                match message {
                    ClientMessage::Change(change) => {
                        session.submit_change(&conn, change);
                        self.hub.record_change();
                        Ok(())
                    }
                    ClientMessage::CursorMove { position, .. } => {
                        session.submit_cursor(&conn, position);
                        Ok(())
                    }
                    ClientMessage::ChatMessage { text, .. } => {
                        session.submit_chat(&conn, text);
                        self.hub.record_chat();
                        Ok(())
                    }
                    ClientMessage::Leave { .. } => {
                        self.disconnect();
                        Ok(())
                    }
                    ClientMessage::Auth { .. } | ClientMessage::Join { .. } => Err(
                        CollabError::Protocol("already joined to a session".to_string()),
                    ),
                }
            }

            // Handle discarded, nothing is accepted anymore.
            ConnPhase::Disconnected => Ok(()),
        }
    }

    fn authenticate(
        &mut self,
        participant_id: String,
        display_name: Option<String>,
    ) -> Result<(), CollabError> {
        if participant_id.trim().is_empty() {
            return Err(CollabError::Auth("missing participantId".to_string()));
        }

        let display_name = display_name.unwrap_or_else(|| participant_id.clone());
        let conn = self
            .hub
            .register(participant_id, display_name, self.outbox.clone())?;

        self.conn = Some(conn);
        self.phase = ConnPhase::Authenticated;
        self.reply(ServerMessage::AuthSuccess { message: None });
        Ok(())
    }

    async fn join(&mut self, key: SessionKey) -> Result<(), CollabError> {
        let conn = self
            .conn
            .clone()
            .ok_or_else(|| CollabError::Protocol("no registered connection".to_string()))?;

        debug!(session = %key, participant_id = %conn.participant_id, "Join requested");
        self.hub.join(&conn, key).await;
        self.phase = ConnPhase::Joined;
        Ok(())
    }

    /// Explicit `leave` and transport close both land here; both remove the
    /// connection from its session and discard the handle.
    pub fn disconnect(&mut self) {
        if self.phase == ConnPhase::Disconnected {
            return;
        }
        if let Some(conn) = self.conn.take() {
            self.hub.unregister(&conn);
        }
        self.phase = ConnPhase::Disconnected;
    }

    fn reply(&self, message: ServerMessage) {
        if self.outbox.send(message).is_err() {
            debug!("Outbox closed while replying");
        }
    }
}
