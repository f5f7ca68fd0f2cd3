//! Error taxonomy for the collaboration core.

use thiserror::Error;

/// Errors that can occur while coordinating a collaboration session.
///
/// None of these ever take the hub down: protocol and auth failures are
/// answered on the offending connection, transport failures become implicit
/// leaves, capacity failures reject the single connection that hit the cap.
#[derive(Debug, Error)]
pub enum CollabError {
    /// Known message received in a state where it is not allowed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Missing or invalid participant identity at handshake time.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Underlying connection dropped or refused.
    #[error("transport error: {0}")]
    Transport(String),

    /// A fixed capacity was exceeded.
    #[error("capacity exceeded: max {0}")]
    Capacity(usize),

    /// Malformed wire payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
