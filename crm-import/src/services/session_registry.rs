//! In-memory registry of import sessions
//!
//! Sessions are independent; the registry only guards the map. Closures run
//! under a std lock and must not await.

use crate::models::{ImportSession, SessionError};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, ImportSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: ImportSession) -> Uuid {
        let session_id = session.session_id();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, session);
        session_id
    }

    /// Read a session
    pub fn with<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&ImportSession) -> R,
    ) -> Result<R, SessionError> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(&session_id)
            .map(f)
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Mutate a session
    pub fn with_mut<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut ImportSession) -> R,
    ) -> Result<R, SessionError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get_mut(&session_id)
            .map(f)
            .ok_or(SessionError::NotFound(session_id))
    }

    pub fn remove(&self, session_id: Uuid) -> Option<ImportSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id)
    }

    /// Drop every session matching `expired`; returns how many were dropped
    pub fn evict(&self, mut expired: impl FnMut(&ImportSession) -> bool) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| !expired(session));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
