use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ParticipantId;

/// One edit operation, forwarded verbatim between participants.
///
/// A `Change` is never mutated after the relay stamps it: it is appended to
/// the session's rolling history buffer and fanned out as-is. The server
/// does not merge or transform concurrent changes; each client applies
/// changes in delivery order (last delivered wins).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub participant_id: ParticipantId,
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    /// Open set of edit tags ("insert", "delete", "replace", ...), treated
    /// as opaque by the relay.
    pub change_type: String,
    /// Character offset into the chapter buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    /// New text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Superseded text, kept for audit/history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
    /// Assigned at relay time, never trusted from the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One entry in the per-session chat log. Lives only as long as the session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub participant_id: ParticipantId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A participant's last-known cursor. Transient: superseded by the next
/// update from the same participant, no history retained.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub participant_id: ParticipantId,
    pub position: u64,
    pub color: String,
}
