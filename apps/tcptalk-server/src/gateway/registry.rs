//! Registry of live, handshake-complete sessions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tcptalk_common::SessionId;
use thiserror::Error;

use super::session::ClientSession;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateId(SessionId),
    #[error("display name `{0}` is already in use")]
    NameTaken(String),
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<ClientSession>>,
    names: HashSet<String>,
}

/// Shared registry of all live chat sessions.
///
/// One `parking_lot::Mutex` guards both the session map and the name index, so
/// register, deregister and snapshot are mutually exclusive and the name check
/// is atomic with insertion. The lock is never held across I/O.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session after a successful handshake.
    pub fn register(&self, id: SessionId, session: Arc<ClientSession>) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        if inner.names.contains(&session.name) {
            return Err(RegistryError::NameTaken(session.name.clone()));
        }
        inner.names.insert(session.name.clone());
        inner.sessions.insert(id, session);
        Ok(())
    }

    /// Remove a session. Returns `None` if it was already gone.
    pub fn deregister(&self, id: &SessionId) -> Option<Arc<ClientSession>> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.remove(id)?;
        inner.names.remove(&session.name);
        Some(session)
    }

    /// Point-in-time copy of every live session except `excluding`.
    pub fn snapshot_others(&self, excluding: &SessionId) -> Vec<Arc<ClientSession>> {
        let inner = self.inner.lock();
        inner
            .sessions
            .iter()
            .filter(|(id, _)| *id != excluding)
            .map(|(_, session)| Arc::clone(session))
            .collect()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.lock().sessions.contains_key(id)
    }

    /// Sorted snapshot of the display names in use.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().names.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
