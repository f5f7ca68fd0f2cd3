//! Seam to the external Document Store.
//!
//! The durable chapter store is an external collaborator: the relay only
//! touches it once per session, to seed the history buffer when the first
//! participant joins. The read happens off the hot broadcast path. Saving
//! chapter content is driven elsewhere (explicit save in the CRUD layer)
//! and is not part of this core.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;

use crate::models::Change;
use crate::ws::SessionKey;

/// Future type returned by store loads.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// Read side of the external Document Store.
pub trait DocumentStore: Send + Sync {
    /// Load recently persisted changes for a (book, chapter), used to seed
    /// a freshly created session's history buffer. An empty list is a
    /// perfectly normal answer for a chapter nobody edited recently.
    fn load_recent_changes<'a>(&'a self, key: &'a SessionKey) -> StoreFuture<'a, Vec<Change>>;
}

/// Store that never has history. Used when no durable backend is wired,
/// e.g. local development.
pub struct NullStore;

impl DocumentStore for NullStore {
    fn load_recent_changes<'a>(&'a self, _key: &'a SessionKey) -> StoreFuture<'a, Vec<Change>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

/// In-memory store, mainly for tests and demos.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<SessionKey, Vec<Change>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record persisted history for a (book, chapter).
    pub fn put(&self, key: SessionKey, changes: Vec<Change>) {
        self.inner.lock().insert(key, changes);
    }
}

impl DocumentStore for MemoryStore {
    fn load_recent_changes<'a>(&'a self, key: &'a SessionKey) -> StoreFuture<'a, Vec<Change>> {
        let changes = self.inner.lock().get(key).cloned().unwrap_or_default();
        Box::pin(async move { Ok(changes) })
    }
}
