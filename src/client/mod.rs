//! Consumer-side reconciliation layer: local buffer, presence, and the
//! reconnecting relay client.

pub mod buffer;
pub mod core;
pub mod presence;
pub mod transport;

pub use buffer::{EditBuffer, PlainTextBuffer};
pub use core::{ClientCore, ClientPhase};
pub use presence::PeerPresence;
pub use transport::{CollabClient, LocalEvent, ReconnectPolicy};
