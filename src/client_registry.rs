//! Global username → session table. One lock, small operation surface;
//! mirrors the registry shape in `pty/registry.rs` (map keyed by a
//! stable id, guarded by a single mutex, no nested locking inside).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::Session;

pub const MAX_USERNAME_LEN: usize = 16;

pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_USERNAME_LEN && name.chars().all(|c| c.is_ascii_alphanumeric())
}

#[derive(Default)]
pub struct ClientRegistry {
    by_username: Mutex<HashMap<String, Arc<Session>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly logged-in session. Fails if the username is
    /// already taken by another active session.
    pub fn add(&self, session: Arc<Session>) -> Result<(), ()> {
        let mut map = self.by_username.lock();
        if map.contains_key(&session.username) {
            return Err(());
        }
        map.insert(session.username.clone(), session);
        Ok(())
    }

    /// Atomically checks the username is free and, only then, builds and
    /// inserts the session. `build` owns resources (like the connection's
    /// write half) that can't cheaply be reconstructed on a retry, so the
    /// duplicate check and the insert happen under one lock acquisition.
    pub fn try_insert_with(
        &self,
        username: &str,
        build: impl FnOnce() -> Arc<Session>,
    ) -> Result<Arc<Session>, ()> {
        let mut map = self.by_username.lock();
        if map.contains_key(username) {
            return Err(());
        }
        let session = build();
        map.insert(username.to_string(), session.clone());
        Ok(session)
    }

    pub fn remove_by_username(&self, username: &str) -> Option<Arc<Session>> {
        self.by_username.lock().remove(username)
    }

    pub fn remove_session(&self, session: &Session) -> Option<Arc<Session>> {
        self.remove_by_username(&session.username)
    }

    pub fn find_by_username(&self, username: &str) -> Option<Arc<Session>> {
        self.by_username.lock().get(username).cloned()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.by_username.lock().contains_key(username)
    }

    pub fn count(&self) -> usize {
        self.by_username.lock().len()
    }

    /// Snapshot of all active sessions, used for shutdown fan-out.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.by_username.lock().values().cloned().collect()
    }
}
