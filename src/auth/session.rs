use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::telegram::TelegramUser;

struct Session {
    user: TelegramUser,
    expires_at: Instant,
}

/// Cookie sessions created by Telegram logins. Process-local.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session for `user` and return its id.
    pub fn create(&self, user: TelegramUser) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            id.clone(),
            Session {
                user,
                expires_at: Instant::now() + self.ttl,
            },
        );
        id
    }

    /// User of a live session. Expired sessions are dropped on access.
    pub fn get(&self, id: &str) -> Option<TelegramUser> {
        {
            let session = self.sessions.get(id)?;
            if session.expires_at > Instant::now() {
                return Some(session.user.clone());
            }
        }
        // The read guard must be released before removing.
        self.sessions.remove(id);
        None
    }

    pub fn destroy(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Remove expired sessions, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        before - self.sessions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
