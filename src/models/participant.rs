use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A user's logical identity within a session. A participant may hold
/// several live connections (multiple tabs), each tracked independently.
pub type ParticipantId = String;

/// Fixed palette for presence/cursor rendering. Both the server and the
/// reconciliation layer derive colors from it so no negotiation is needed.
pub const COLOR_PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46918f", "#f032e6", "#9a6324",
];

/// Deterministic color for a participant, drawn from [`COLOR_PALETTE`].
pub fn color_for(participant_id: &str) -> &'static str {
    let sum: usize = participant_id.bytes().map(|b| b as usize).sum();
    COLOR_PALETTE[sum % COLOR_PALETTE.len()]
}

/// Participant entry as carried in `session-info`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_deterministic() {
        assert_eq!(color_for("alice"), color_for("alice"));
    }

    #[test]
    fn color_comes_from_palette() {
        assert!(COLOR_PALETTE.contains(&color_for("some-participant")));
    }
}
