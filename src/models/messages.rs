use serde::{Deserialize, Serialize};

use crate::models::{Change, ChatEntry, CursorPosition, ParticipantId, ParticipantInfo};

/// Messages a client may send over the collaboration socket.
///
/// Closed tagged union: anything outside the known tag set fails to parse
/// and is handled as a protocol error at the boundary, it never reaches the
/// relay.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Auth {
        participant_id: ParticipantId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    Join {
        book_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chapter_id: Option<String>,
    },
    Change(Change),
    CursorMove {
        participant_id: ParticipantId,
        position: u64,
    },
    ChatMessage {
        participant_id: ParticipantId,
        text: String,
    },
    Leave {
        participant_id: ParticipantId,
        book_id: String,
    },
}

/// Messages the relay sends to clients.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AuthSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
    SessionInfo {
        participants: Vec<ParticipantInfo>,
    },
    UserJoined {
        participant_id: ParticipantId,
        display_name: String,
        color: String,
    },
    UserLeft {
        participant_id: ParticipantId,
    },
    Change(Change),
    CursorMove(CursorPosition),
    ChatMessage(ChatEntry),
    RecentChanges {
        changes: Vec<Change>,
    },
}
