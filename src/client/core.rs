//! Transport-agnostic client state machine.
//!
//! `ClientCore` mirrors the server-side connection lifecycle as an explicit
//! state machine driven by transport events and server messages, instead of
//! ad hoc callbacks on a socket object. It owns the local editor buffer
//! (optimistic apply), the peer presence map, and the session chat record.
//! The transport layer feeds it events and sends whatever frames it emits.

use chrono::Utc;
use tracing::{debug, warn};

use crate::client::buffer::EditBuffer;
use crate::client::presence::PeerPresence;
use crate::models::{Change, ChatEntry, ClientMessage, ParticipantId, ServerMessage};

/// Client-side connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Disconnected,
    Connecting,
    Authenticated,
    Joined,
}

pub struct ClientCore<B: EditBuffer> {
    participant_id: ParticipantId,
    display_name: String,
    book_id: String,
    chapter_id: Option<String>,
    phase: ClientPhase,
    buffer: B,
    presence: PeerPresence,
    chat: Vec<ChatEntry>,
    /// Human-readable reason for the last server-reported failure, kept as
    /// a flag for the UI; transient drops are retried silently.
    last_error: Option<String>,
}

impl<B: EditBuffer> ClientCore<B> {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        display_name: impl Into<String>,
        book_id: impl Into<String>,
        chapter_id: Option<String>,
        buffer: B,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            book_id: book_id.into(),
            chapter_id,
            phase: ClientPhase::Disconnected,
            buffer,
            presence: PeerPresence::new(),
            chat: Vec::new(),
            last_error: None,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn presence(&self) -> &PeerPresence {
        &self.presence
    }

    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Transport dial started.
    pub fn on_connecting(&mut self) {
        self.phase = ClientPhase::Connecting;
    }

    /// Transport is open: authenticate. Still `Connecting` until the relay
    /// confirms.
    pub fn on_connected(&mut self) -> ClientMessage {
        self.phase = ClientPhase::Connecting;
        ClientMessage::Auth {
            participant_id: self.participant_id.clone(),
            display_name: Some(self.display_name.clone()),
        }
    }

    /// Transport dropped. Local edits keep applying optimistically while
    /// disconnected; presence is stale and cleared. The history replay on
    /// re-join partially catches the buffer up.
    pub fn on_disconnected(&mut self) {
        self.phase = ClientPhase::Disconnected;
        self.presence.clear();
    }

    /// Feed one server message; returns a frame to send back, if any.
    pub fn on_message(&mut self, message: ServerMessage) -> Option<ClientMessage> {
        match message {
            ServerMessage::AuthSuccess { .. } => {
                self.phase = ClientPhase::Authenticated;
                Some(ClientMessage::Join {
                    book_id: self.book_id.clone(),
                    chapter_id: self.chapter_id.clone(),
                })
            }
            ServerMessage::SessionInfo { participants } => {
                self.phase = ClientPhase::Joined;
                self.presence.set_roster(participants);
                None
            }
            ServerMessage::RecentChanges { changes } => {
                for change in &changes {
                    if change.participant_id != self.participant_id {
                        self.buffer.apply(change);
                    }
                }
                debug!("Replayed {} buffered changes", changes.len());
                None
            }
            ServerMessage::Change(change) => {
                // Applied directly at the stated position, no transform
                // against in-flight local edits.
                self.buffer.apply(&change);
                None
            }
            ServerMessage::CursorMove(cursor) => {
                self.presence.cursor_moved(cursor);
                None
            }
            ServerMessage::ChatMessage(entry) => {
                self.chat.push(entry);
                None
            }
            ServerMessage::UserJoined {
                participant_id,
                display_name,
                color,
            } => {
                self.presence.peer_joined(crate::models::ParticipantInfo {
                    participant_id,
                    display_name,
                    color,
                });
                None
            }
            ServerMessage::UserLeft { participant_id } => {
                self.presence.peer_left(&participant_id);
                None
            }
            ServerMessage::Error { message } => {
                warn!("Relay reported an error: {}", message);
                self.last_error = Some(message);
                None
            }
        }
    }

    /// Apply a local edit optimistically and produce the frame to relay.
    pub fn local_edit(
        &mut self,
        change_type: impl Into<String>,
        position: Option<u64>,
        content: Option<String>,
        previous_content: Option<String>,
    ) -> ClientMessage {
        let change = Change {
            participant_id: self.participant_id.clone(),
            book_id: self.book_id.clone(),
            chapter_id: self.chapter_id.clone(),
            change_type: change_type.into(),
            position,
            content,
            previous_content,
            timestamp: None,
        };
        self.buffer.apply(&change);
        ClientMessage::Change(change)
    }

    pub fn local_cursor(&self, position: u64) -> ClientMessage {
        ClientMessage::CursorMove {
            participant_id: self.participant_id.clone(),
            position,
        }
    }

    /// Record a chat line locally (the relay never echoes it back) and
    /// produce the frame to send.
    pub fn local_chat(&mut self, text: impl Into<String>) -> ClientMessage {
        let text = text.into();
        self.chat.push(ChatEntry {
            participant_id: self.participant_id.clone(),
            text: text.clone(),
            timestamp: Utc::now(),
        });
        ClientMessage::ChatMessage {
            participant_id: self.participant_id.clone(),
            text,
        }
    }

    /// Frame sent best-effort when the consumer tears the client down.
    pub fn leave_message(&self) -> ClientMessage {
        ClientMessage::Leave {
            participant_id: self.participant_id.clone(),
            book_id: self.book_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::buffer::PlainTextBuffer;
    use crate::models::{CursorPosition, ParticipantInfo};

    fn core() -> ClientCore<PlainTextBuffer> {
        ClientCore::new(
            "1",
            "Ada",
            "10",
            Some("1".into()),
            PlainTextBuffer::new("hello world"),
        )
    }

    fn peer_change(position: u64, content: &str) -> Change {
        Change {
            participant_id: "2".into(),
            book_id: "10".into(),
            chapter_id: Some("1".into()),
            change_type: "insert".into(),
            position: Some(position),
            content: Some(content.into()),
            previous_content: None,
            timestamp: None,
        }
    }

    #[test]
    fn handshake_walks_the_state_machine() {
        let mut core = core();
        assert_eq!(core.phase(), ClientPhase::Disconnected);

        let auth = core.on_connected();
        assert!(matches!(auth, ClientMessage::Auth { .. }));
        assert_eq!(core.phase(), ClientPhase::Connecting);

        let join = core
            .on_message(ServerMessage::AuthSuccess { message: None })
            .unwrap();
        assert!(matches!(join, ClientMessage::Join { .. }));
        assert_eq!(core.phase(), ClientPhase::Authenticated);

        core.on_message(ServerMessage::SessionInfo {
            participants: vec![ParticipantInfo {
                participant_id: "1".into(),
                display_name: "Ada".into(),
                color: "#e6194b".into(),
            }],
        });
        assert_eq!(core.phase(), ClientPhase::Joined);
    }

    #[test]
    fn local_edit_applies_optimistically() {
        let mut core = core();
        let frame = core.local_edit("insert", Some(5), Some(",".into()), None);

        assert_eq!(core.buffer().contents(), "hello, world");
        assert!(matches!(frame, ClientMessage::Change(c) if c.timestamp.is_none()));
    }

    #[test]
    fn peer_change_merges_into_buffer() {
        let mut core = core();
        core.on_message(ServerMessage::Change(peer_change(5, "!")));
        assert_eq!(core.buffer().contents(), "hello! world");
    }

    #[test]
    fn replay_skips_own_changes() {
        let mut core = core();
        let mut own = peer_change(0, "x");
        own.participant_id = "1".into();

        core.on_message(ServerMessage::RecentChanges {
            changes: vec![own, peer_change(5, "!")],
        });
        // Own change was already applied optimistically before the outage;
        // only the peer's lands.
        assert_eq!(core.buffer().contents(), "hello! world");
    }

    #[test]
    fn chat_recorded_locally_without_echo() {
        let mut core = core();
        core.local_chat("hi");
        assert_eq!(core.chat().len(), 1);
        assert_eq!(core.chat()[0].participant_id, "1");
    }

    #[test]
    fn disconnect_clears_presence_but_keeps_buffer() {
        let mut core = core();
        core.on_message(ServerMessage::CursorMove(CursorPosition {
            participant_id: "2".into(),
            position: 3,
            color: "#3cb44b".into(),
        }));
        core.local_edit("insert", Some(0), Some(">".into()), None);

        core.on_disconnected();
        assert_eq!(core.phase(), ClientPhase::Disconnected);
        assert!(core.presence().cursor_of("2").is_none());
        assert_eq!(core.buffer().contents(), ">hello world");
    }

    #[test]
    fn relay_error_is_surfaced_as_flag() {
        let mut core = core();
        core.on_message(ServerMessage::Error {
            message: "not authenticated".into(),
        });
        assert_eq!(core.last_error(), Some("not authenticated"));
    }
}
