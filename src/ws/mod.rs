pub mod coordinator;
pub mod handler;
pub mod registry;
pub mod session;

pub use coordinator::{ConnPhase, Coordinator};
pub use registry::{CollabHub, ConnectionId, HubStats, Outbox, ParticipantConnection, SessionKey};
pub use session::Session;
