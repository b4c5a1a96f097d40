//! Session lifecycle management
//!
//! The manager is the in-memory authority over sessions. Persistence is
//! best-effort: storage failures are logged at warn level and never
//! surfaced, since in-memory state stays authoritative for the process.

use tracing::{debug, info, warn};

use crate::context::ContextDelta;
use crate::session::{Message, Session, SessionStore};
use crate::{Error, Result};

/// Owns every session, the active-session marker, and their persistence
pub struct SessionManager {
    /// Sessions in creation order
    sessions: Vec<Session>,
    /// Id of the active session, if any
    active: Option<String>,
    /// Optional durable store behind the in-memory state
    store: Option<SessionStore>,
    /// Session cap
    max_sessions: usize,
}

impl SessionManager {
    /// Create an in-memory manager
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Vec::new(),
            active: None,
            store: None,
            max_sessions,
        }
    }

    /// Create a manager backed by a store, restoring persisted state
    pub fn with_store(store: SessionStore, max_sessions: usize) -> Result<Self> {
        let sessions = store.load_all()?;
        let active = store
            .active_session()?
            .filter(|id| sessions.iter().any(|s| &s.id == id));
        if !sessions.is_empty() {
            info!(count = sessions.len(), "restored sessions from storage");
        }
        Ok(Self {
            sessions,
            active,
            store: Some(store),
            max_sessions,
        })
    }

    /// Create a new session and make it active
    pub fn create_session(&mut self) -> Result<Session> {
        if self.sessions.len() >= self.max_sessions {
            return Err(Error::SessionLimitExceeded {
                limit: self.max_sessions,
            });
        }
        let session = Session::new();
        info!(session = %session.id, "created session");
        self.active = Some(session.id.clone());
        self.sessions.push(session.clone());
        self.persist(&session);
        self.persist_active();
        Ok(session)
    }

    /// Append a message to a session, in order
    pub fn append_message(&mut self, id: &str, message: Message) -> Result<()> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        session.add_message(message);
        let session = session.clone();
        self.persist(&session);
        Ok(())
    }

    /// Merge an extraction delta into a session's context
    pub fn merge_context(&mut self, id: &str, delta: ContextDelta) -> Result<()> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        session.context.merge(delta);
        session.updated_at = chrono::Utc::now();
        let session = session.clone();
        self.persist(&session);
        Ok(())
    }

    /// Switch the active session
    pub fn load_session(&mut self, id: &str) -> Result<()> {
        if !self.sessions.iter().any(|s| s.id == id) {
            return Err(Error::SessionNotFound(id.to_string()));
        }
        self.active = Some(id.to_string());
        self.persist_active();
        Ok(())
    }

    /// Remove a session permanently
    pub fn delete_session(&mut self, id: &str) -> Result<()> {
        let position = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        self.sessions.remove(position);
        info!(session = %id, "deleted session");
        if self.active.as_deref() == Some(id) {
            self.active = None;
            self.persist_active();
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(id) {
                warn!(session = %id, error = %e, "failed to delete persisted session");
            }
        }
        Ok(())
    }

    /// Remove every session
    pub fn clear_all(&mut self) {
        self.sessions.clear();
        self.active = None;
        info!("cleared all sessions");
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "failed to clear persisted sessions");
            }
        }
    }

    /// Get the active session
    pub fn active(&self) -> Option<&Session> {
        let id = self.active.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Get a session by id
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// All sessions, in creation order
    pub fn list(&self) -> &[Session] {
        &self.sessions
    }

    /// Session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn persist(&self, session: &Session) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(session) {
                warn!(session = %session.id, error = %e, "failed to persist session");
            } else {
                debug!(session = %session.id, "persisted session");
            }
        }
    }

    fn persist_active(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_active(self.active.as_deref()) {
                warn!(error = %e, "failed to persist active session marker");
            }
        }
    }
}
