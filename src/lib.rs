//! Real-time collaborative chapter editing for the book platform.
//!
//! The server side is a relay/broadcast hub: it authenticates connections,
//! assigns them to per-(book, chapter) sessions, stamps and fans out edit,
//! cursor, and chat events to the other participants, and replays a
//! bounded change history to late joiners. It deliberately does not merge
//! or transform concurrent edits; each client applies what it receives in
//! delivery order.
//!
//! The client side ([`client`]) is the reconciliation layer: an explicit
//! connection state machine with optimistic local apply, peer presence and
//! cursor tracking, and a fixed-delay reconnect loop.

pub mod client;
pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod ws;

pub use client::{ClientCore, ClientPhase, CollabClient, EditBuffer, PlainTextBuffer};
pub use error::CollabError;
pub use store::{DocumentStore, MemoryStore, NullStore};
pub use ws::{CollabHub, Coordinator, Session, SessionKey};
