//! Connection registry and session table.
//!
//! The hub is an explicitly owned object handed to the axum state, not a
//! process global: ownership and lifecycle are visible at the call sites
//! and tests can spin up as many independent hubs as they like.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CollabError;
use crate::models::{color_for, ParticipantId, ServerMessage};
use crate::store::DocumentStore;
use crate::ws::session::Session;

/// Maximum number of concurrent connections across all sessions.
pub const MAX_CONNECTIONS: usize = 10_000;

/// Identifies one shared editing context: a chapter of a book, or the book
/// itself when no chapter is given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub book_id: String,
    pub chapter_id: Option<String>,
}

impl SessionKey {
    pub fn new(book_id: impl Into<String>, chapter_id: Option<String>) -> Self {
        Self {
            book_id: book_id.into(),
            chapter_id,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.chapter_id {
            Some(chapter) => write!(f, "{}/{}", self.book_id, chapter),
            None => write!(f, "{}", self.book_id),
        }
    }
}

/// Unique handle for one live transport connection.
pub type ConnectionId = Uuid;

/// Channel used to push server messages towards one connection's socket.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// One live transport connection of an authenticated participant.
pub struct ParticipantConnection {
    pub connection_id: ConnectionId,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub color: &'static str,
    outbox: Outbox,
    /// Session this connection has joined, if any.
    session_key: parking_lot::Mutex<Option<SessionKey>>,
}

impl ParticipantConnection {
    /// Best-effort send towards this connection's socket. A closed outbox
    /// means the socket pump is already tearing the connection down.
    pub fn send(&self, message: ServerMessage) {
        if self.outbox.send(message).is_err() {
            debug!(connection_id = %self.connection_id, "Outbox closed, dropping message");
        }
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        self.session_key.lock().clone()
    }

    fn set_session_key(&self, key: Option<SessionKey>) {
        *self.session_key.lock() = key;
    }
}

/// Hub-wide counters, surfaced by the diagnostics endpoint.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub current_connections: usize,
    pub open_sessions: usize,
    pub total_connections: u64,
    pub total_changes: u64,
    pub total_chat_messages: u64,
}

/// Owns the process-wide session table and every registered connection.
///
/// Per-session mutation is serialized by the session's own lock; the hub
/// locks here only guard the two maps.
pub struct CollabHub {
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
    connections: RwLock<HashMap<ConnectionId, Arc<ParticipantConnection>>>,
    stats: RwLock<HubStats>,
    history_capacity: usize,
    store: Arc<dyn DocumentStore>,
}

impl CollabHub {
    pub fn new(history_capacity: usize, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            stats: RwLock::new(HubStats::default()),
            history_capacity,
            store,
        }
    }

    /// Register an authenticated transport connection.
    pub fn register(
        &self,
        participant_id: ParticipantId,
        display_name: String,
        outbox: Outbox,
    ) -> Result<Arc<ParticipantConnection>, CollabError> {
        if self.connections.read().len() >= MAX_CONNECTIONS {
            warn!("Connection limit reached, rejecting registration");
            return Err(CollabError::Capacity(MAX_CONNECTIONS));
        }

        let conn = Arc::new(ParticipantConnection {
            connection_id: Uuid::new_v4(),
            color: color_for(&participant_id),
            participant_id,
            display_name,
            outbox,
            session_key: parking_lot::Mutex::new(None),
        });

        self.connections
            .write()
            .insert(conn.connection_id, conn.clone());
        self.stats.write().total_connections += 1;

        info!(
            connection_id = %conn.connection_id,
            participant_id = %conn.participant_id,
            "Connection registered"
        );
        Ok(conn)
    }

    /// Attach a connection to its session, creating the session on first
    /// join. Creation seeds the history buffer from the Document Store;
    /// a store failure is logged and the session starts empty.
    pub async fn join(
        &self,
        conn: &Arc<ParticipantConnection>,
        key: SessionKey,
    ) -> Arc<Session> {
        let existing = self.sessions.read().get(&key).cloned();
        let session = match existing {
            Some(session) => session,
            None => {
                let seed = match self.store.load_recent_changes(&key).await {
                    Ok(changes) => changes,
                    Err(e) => {
                        warn!(session = %key, "History seed failed: {}", e);
                        Vec::new()
                    }
                };
                // Another connection may have raced us past the read lock.
                self.sessions
                    .write()
                    .entry(key.clone())
                    .or_insert_with(|| {
                        info!(session = %key, "Session created");
                        Arc::new(Session::new(key.clone(), self.history_capacity, seed))
                    })
                    .clone()
            }
        };

        conn.set_session_key(Some(key));
        session.add_connection(conn.clone());
        session
    }

    /// Detach a connection from its session, destroying the session when it
    /// empties. Explicit `leave` and transport close both end up here.
    pub fn leave(&self, conn: &Arc<ParticipantConnection>) {
        let Some(key) = conn.session_key() else {
            return;
        };
        conn.set_session_key(None);

        let session = self.sessions.read().get(&key).cloned();
        if let Some(session) = session {
            let now_empty = session.remove_connection(conn);
            if now_empty {
                self.sessions.write().remove(&key);
                info!(session = %key, "Session destroyed (last participant left)");
            }
        }
    }

    /// Discard a connection handle entirely. Leaves its session first.
    pub fn unregister(&self, conn: &Arc<ParticipantConnection>) {
        self.leave(conn);
        if self
            .connections
            .write()
            .remove(&conn.connection_id)
            .is_some()
        {
            info!(
                connection_id = %conn.connection_id,
                participant_id = %conn.participant_id,
                "Connection unregistered"
            );
        }
    }

    /// Session a connection is currently joined to, if any.
    pub fn find_session(&self, conn: &ParticipantConnection) -> Option<Arc<Session>> {
        let key = conn.session_key()?;
        self.sessions.read().get(&key).cloned()
    }

    /// Live session for a key, if one exists.
    pub fn session(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.read().get(key).cloned()
    }

    /// Distinct participants of a session, in join order.
    pub fn participants_of(&self, key: &SessionKey) -> Vec<ParticipantId> {
        self.session(key)
            .map(|s| s.current_participant_ids())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub(crate) fn record_change(&self) {
        self.stats.write().total_changes += 1;
    }

    pub(crate) fn record_chat(&self) {
        self.stats.write().total_chat_messages += 1;
    }

    pub fn stats(&self) -> HubStats {
        let mut stats = self.stats.read().clone();
        stats.current_connections = self.connection_count();
        stats.open_sessions = self.session_count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NullStore;

    fn hub() -> CollabHub {
        CollabHub::new(16, Arc::new(NullStore))
    }

    fn connect(hub: &CollabHub, id: &str) -> (Arc<ParticipantConnection>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = hub.register(id.to_string(), id.to_string(), tx).unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let hub = hub();
        let (conn, _rx) = connect(&hub, "alice");
        assert_eq!(hub.connection_count(), 1);

        hub.unregister(&conn);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn join_creates_session_and_leave_destroys_it() {
        let hub = hub();
        let (conn, _rx) = connect(&hub, "alice");

        let key = SessionKey::new("10", Some("1".into()));
        hub.join(&conn, key.clone()).await;
        assert_eq!(hub.session_count(), 1);
        assert_eq!(hub.participants_of(&key), vec!["alice".to_string()]);

        hub.leave(&conn);
        assert_eq!(hub.session_count(), 0);
        assert!(hub.participants_of(&key).is_empty());
    }

    #[tokio::test]
    async fn session_survives_until_last_connection_leaves() {
        let hub = hub();
        let (a, _arx) = connect(&hub, "alice");
        let (b, _brx) = connect(&hub, "bob");
        let key = SessionKey::new("10", Some("1".into()));

        hub.join(&a, key.clone()).await;
        hub.join(&b, key.clone()).await;
        assert_eq!(
            hub.participants_of(&key),
            vec!["alice".to_string(), "bob".to_string()]
        );

        hub.leave(&a);
        assert_eq!(hub.session_count(), 1);
        assert_eq!(hub.participants_of(&key), vec!["bob".to_string()]);

        hub.leave(&b);
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn find_session_follows_membership() {
        let hub = hub();
        let (conn, _rx) = connect(&hub, "alice");
        assert!(hub.find_session(&conn).is_none());

        hub.join(&conn, SessionKey::new("10", None)).await;
        assert!(hub.find_session(&conn).is_some());

        hub.leave(&conn);
        assert!(hub.find_session(&conn).is_none());
    }
}
