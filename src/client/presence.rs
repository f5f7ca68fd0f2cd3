//! Peer roster and cursor map kept by the reconciliation layer for
//! rendering presence indicators.

use std::collections::HashMap;

use crate::models::{CursorPosition, ParticipantId, ParticipantInfo};

#[derive(Debug, Default)]
pub struct PeerPresence {
    /// Participants in join order, as reported by the relay.
    participants: Vec<ParticipantInfo>,
    /// Last-known cursor per peer. Overwritten on every `cursor-move`.
    cursors: HashMap<ParticipantId, CursorPosition>,
}

impl PeerPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster from a `session-info` payload.
    pub fn set_roster(&mut self, participants: Vec<ParticipantInfo>) {
        self.participants = participants;
    }

    pub fn peer_joined(&mut self, info: ParticipantInfo) {
        if !self
            .participants
            .iter()
            .any(|p| p.participant_id == info.participant_id)
        {
            self.participants.push(info);
        }
    }

    pub fn peer_left(&mut self, participant_id: &str) {
        self.participants
            .retain(|p| p.participant_id != participant_id);
        self.cursors.remove(participant_id);
    }

    /// Record a peer cursor; the previous position is discarded.
    pub fn cursor_moved(&mut self, cursor: CursorPosition) {
        self.cursors.insert(cursor.participant_id.clone(), cursor);
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.participants
    }

    pub fn cursor_of(&self, participant_id: &str) -> Option<&CursorPosition> {
        self.cursors.get(participant_id)
    }

    pub fn cursors(&self) -> impl Iterator<Item = &CursorPosition> {
        self.cursors.values()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: id.into(),
            display_name: id.into(),
            color: "#e6194b".into(),
        }
    }

    #[test]
    fn roster_tracks_joins_and_leaves() {
        let mut presence = PeerPresence::new();
        presence.set_roster(vec![info("1"), info("2")]);
        presence.peer_joined(info("3"));
        presence.peer_joined(info("3")); // duplicate join is a no-op
        presence.peer_left("2");

        let ids: Vec<_> = presence
            .participants()
            .iter()
            .map(|p| p.participant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn cursor_overwrites_and_clears_on_leave() {
        let mut presence = PeerPresence::new();
        presence.cursor_moved(CursorPosition {
            participant_id: "2".into(),
            position: 4,
            color: "#3cb44b".into(),
        });
        presence.cursor_moved(CursorPosition {
            participant_id: "2".into(),
            position: 9,
            color: "#3cb44b".into(),
        });
        assert_eq!(presence.cursor_of("2").unwrap().position, 9);

        presence.peer_left("2");
        assert!(presence.cursor_of("2").is_none());
    }
}
