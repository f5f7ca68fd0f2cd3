//! A live editing session and its relays.
//!
//! All session state sits behind one mutex. Every relay operation locks,
//! mutates, and fans out before releasing, which is what gives each session
//! its total delivery order: two changes submitted in order are pushed into
//! every recipient's outbox in that order. Sessions share nothing with each
//! other, so distinct sessions proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::models::{
    Change, ChatEntry, CursorPosition, ParticipantId, ParticipantInfo, ServerMessage,
};
use crate::ws::registry::{ConnectionId, ParticipantConnection, SessionKey};

struct SessionState {
    /// Live connections in join order.
    connections: Vec<Arc<ParticipantConnection>>,
    /// Rolling change history for late-joiner backfill. Bounded; oldest
    /// entries are evicted silently once capacity is exceeded.
    history: VecDeque<Change>,
    /// Session-lifetime chat log. Not persisted anywhere.
    chat_log: Vec<ChatEntry>,
    /// Last-known cursor per participant. No history.
    cursors: HashMap<ParticipantId, CursorPosition>,
}

/// One shared editing context for a (book, chapter) pair.
pub struct Session {
    pub key: SessionKey,
    history_capacity: usize,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(key: SessionKey, history_capacity: usize, seed: Vec<Change>) -> Self {
        let mut history = VecDeque::with_capacity(seed.len().min(history_capacity));
        for change in seed {
            if history.len() == history_capacity {
                history.pop_front();
            }
            history.push_back(change);
        }
        Self {
            key,
            history_capacity,
            state: Mutex::new(SessionState {
                connections: Vec::new(),
                history,
                chat_log: Vec::new(),
                cursors: HashMap::new(),
            }),
        }
    }

    /// Add a connection: the joiner gets `session-info` plus the buffered
    /// history, everyone else gets `user-joined`.
    pub fn add_connection(&self, conn: Arc<ParticipantConnection>) {
        let mut state = self.state.lock();

        for peer in &state.connections {
            peer.send(ServerMessage::UserJoined {
                participant_id: conn.participant_id.clone(),
                display_name: conn.display_name.clone(),
                color: conn.color.to_string(),
            });
        }

        state.connections.push(conn.clone());

        conn.send(ServerMessage::SessionInfo {
            participants: participants_in_join_order(&state.connections),
        });
        conn.send(ServerMessage::RecentChanges {
            changes: state.history.iter().cloned().collect(),
        });

        info!(
            session = %self.key,
            participant_id = %conn.participant_id,
            "Participant joined"
        );
    }

    /// Remove a connection and tell the remaining participants. Returns
    /// whether the session is now empty and should be destroyed.
    pub fn remove_connection(&self, conn: &ParticipantConnection) -> bool {
        let mut state = self.state.lock();

        let before = state.connections.len();
        state
            .connections
            .retain(|c| c.connection_id != conn.connection_id);
        if state.connections.len() == before {
            // Already removed (leave raced a transport close).
            return state.connections.is_empty();
        }

        // Drop the cursor once the participant's last connection is gone.
        if !state
            .connections
            .iter()
            .any(|c| c.participant_id == conn.participant_id)
        {
            state.cursors.remove(&conn.participant_id);
        }

        for peer in &state.connections {
            peer.send(ServerMessage::UserLeft {
                participant_id: conn.participant_id.clone(),
            });
        }

        info!(
            session = %self.key,
            participant_id = %conn.participant_id,
            "Participant left"
        );
        state.connections.is_empty()
    }

    /// Stamp a change, append it to the history buffer, and forward it
    /// verbatim to every other participant connection.
    pub fn submit_change(&self, sender: &ParticipantConnection, mut change: Change) -> Change {
        change.participant_id = sender.participant_id.clone();
        change.timestamp = Some(Utc::now());

        let mut state = self.state.lock();
        if state.history.len() == self.history_capacity {
            // Silent eviction; late joiners only ever see the retained tail.
            state.history.pop_front();
        }
        state.history.push_back(change.clone());

        broadcast_except(
            &state.connections,
            sender.connection_id,
            ServerMessage::Change(change.clone()),
        );
        debug!(session = %self.key, participant_id = %sender.participant_id, "Change relayed");
        change
    }

    /// Overwrite the sender's cursor and forward it to every other
    /// participant connection.
    pub fn submit_cursor(&self, sender: &ParticipantConnection, position: u64) {
        let cursor = CursorPosition {
            participant_id: sender.participant_id.clone(),
            position,
            color: sender.color.to_string(),
        };

        let mut state = self.state.lock();
        state
            .cursors
            .insert(sender.participant_id.clone(), cursor.clone());
        broadcast_except(
            &state.connections,
            sender.connection_id,
            ServerMessage::CursorMove(cursor),
        );
    }

    /// Append to the chat log and forward to every other participant
    /// connection. The sender records its own message locally, the relay
    /// does not echo.
    pub fn submit_chat(&self, sender: &ParticipantConnection, text: String) -> ChatEntry {
        let entry = ChatEntry {
            participant_id: sender.participant_id.clone(),
            text,
            timestamp: Utc::now(),
        };

        let mut state = self.state.lock();
        state.chat_log.push(entry.clone());
        broadcast_except(
            &state.connections,
            sender.connection_id,
            ServerMessage::ChatMessage(entry.clone()),
        );
        entry
    }

    /// Distinct participants in join order.
    pub fn current_participants(&self) -> Vec<ParticipantInfo> {
        participants_in_join_order(&self.state.lock().connections)
    }

    pub fn current_participant_ids(&self) -> Vec<ParticipantId> {
        self.current_participants()
            .into_iter()
            .map(|p| p.participant_id)
            .collect()
    }

    pub fn recent_changes(&self) -> Vec<Change> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn chat_log(&self) -> Vec<ChatEntry> {
        self.state.lock().chat_log.clone()
    }

    pub fn cursor_of(&self, participant_id: &str) -> Option<CursorPosition> {
        self.state.lock().cursors.get(participant_id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }
}

fn participants_in_join_order(connections: &[Arc<ParticipantConnection>]) -> Vec<ParticipantInfo> {
    let mut seen: Vec<ParticipantInfo> = Vec::new();
    for conn in connections {
        if !seen.iter().any(|p| p.participant_id == conn.participant_id) {
            seen.push(ParticipantInfo {
                participant_id: conn.participant_id.clone(),
                display_name: conn.display_name.clone(),
                color: conn.color.to_string(),
            });
        }
    }
    seen
}

fn broadcast_except(
    connections: &[Arc<ParticipantConnection>],
    sender: ConnectionId,
    message: ServerMessage,
) {
    for conn in connections {
        if conn.connection_id == sender {
            continue;
        }
        conn.send(message.clone());
    }
}
