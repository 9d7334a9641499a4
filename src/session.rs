//! Session records and their Active -> Completed state machine.

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::types::{Metadata, Session, SessionStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SessionRegistry {
    db: Arc<Database>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn open(db: Arc<Database>) -> Result<Self> {
        let sessions = db
            .load_sessions()?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        Ok(Self {
            db,
            sessions: RwLock::new(sessions),
        })
    }

    /// Start a new active session
    pub fn create(&self, metadata: Metadata) -> Result<Session> {
        let session = Session::new(metadata);
        let mut sessions = self.sessions.write();
        self.db.put_session(&session)?;
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Session> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::session_not_found(id))
    }

    /// All sessions, newest first
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// (active, completed) counts
    pub fn counts(&self) -> (usize, usize) {
        let sessions = self.sessions.read();
        let active = sessions.values().filter(|s| s.is_active()).count();
        (active, sessions.len() - active)
    }

    /// Flip an active session to Completed.
    ///
    /// Runs under the write lock, so it waits for every in-flight
    /// [`with_active`](Self::with_active) call and every later one observes
    /// the completed state. Ending twice is rejected with `SessionNotActive`.
    pub fn end(&self, id: &str, summary: Option<String>) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::session_not_found(id))?;
        if !session.is_active() {
            return Err(StoreError::SessionNotActive(id.to_string()));
        }

        let mut ended = session.clone();
        ended.status = SessionStatus::Completed;
        ended.ended_at = Some(Utc::now());
        ended.summary = summary;
        self.db.put_session(&ended)?;
        *session = ended.clone();
        Ok(ended)
    }

    /// Run `f` while the session is guaranteed to stay active
    pub fn with_active<T>(&self, id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let sessions = self.sessions.read();
        let session = sessions
            .get(id)
            .ok_or_else(|| StoreError::session_not_found(id))?;
        if !session.is_active() {
            return Err(StoreError::SessionNotActive(id.to_string()));
        }
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::open(Arc::new(Database::in_memory().unwrap())).unwrap()
    }

    #[test]
    fn test_end_once() {
        let reg = registry();
        let session = reg.create(Metadata::new()).unwrap();
        assert!(session.is_active());

        let ended = reg.end(&session.id, Some("wrapped up".to_string())).unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.ended_at.is_some());
        assert_eq!(ended.summary.as_deref(), Some("wrapped up"));

        assert!(matches!(
            reg.end(&session.id, None),
            Err(StoreError::SessionNotActive(_))
        ));
        assert_eq!(reg.get(&session.id).unwrap().summary.as_deref(), Some("wrapped up"));
    }

    #[test]
    fn test_end_unknown_session() {
        assert!(registry().end("nope", None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_with_active_guards_writes() {
        let reg = registry();
        let session = reg.create(Metadata::new()).unwrap();
        assert_eq!(reg.with_active(&session.id, || Ok(7)).unwrap(), 7);

        reg.end(&session.id, None).unwrap();
        let mut ran = false;
        let result = reg.with_active(&session.id, || {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::SessionNotActive(_))));
        assert!(!ran);
        assert!(reg.with_active("nope", || Ok(())).unwrap_err().is_not_found());
    }

    #[test]
    fn test_reopen_keeps_sessions() {
        let db = Arc::new(Database::in_memory().unwrap());
        let reg = SessionRegistry::open(db.clone()).unwrap();
        let a = reg.create(Metadata::new()).unwrap();
        reg.create(Metadata::new()).unwrap();
        reg.end(&a.id, None).unwrap();

        let reopened = SessionRegistry::open(db).unwrap();
        assert_eq!(reopened.list().len(), 2);
        assert_eq!(reopened.counts(), (1, 1));
    }
}
