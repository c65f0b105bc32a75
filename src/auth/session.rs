use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Session data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// In-memory session store
///
/// Sessions do not survive a restart.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    default_ttl: Duration,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Create a new session
    pub fn create(&self, username: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            created_at: now,
            expires_at: now + self.default_ttl,
        };
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Get a live session by ID; an expired one is removed
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let session = self.sessions.read().get(session_id).cloned()?;
        if session.is_expired() {
            self.delete(session_id);
            return None;
        }
        Some(session)
    }

    /// Delete a session
    pub fn delete(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    /// Delete all expired sessions, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Start the periodic expired-session sweep
    pub fn start_cleanup_task(self: Arc<Self>, interval: std::time::Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_expired();
                if removed > 0 {
                    debug!("Removed {} expired sessions", removed);
                }
            }
        });
    }
}
