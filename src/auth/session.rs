//! Sessions and the server session table.
//!
//! A session stands in for user credentials until it expires. Every
//! successful authentication refreshes the expiry instant; a zero
//! `expire_after` makes the session non-expiring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default retry budget for session ID minting.
pub const DEFAULT_GEN_LIMIT: u32 = 16;

/// One issued session token.
pub struct Session {
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    username: String,
    expire_after: Duration,
    expire_at: Instant,
}

impl Session {
    fn new(id: Uuid, username: &str, expire_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(SessionInner {
                id,
                username: username.to_owned(),
                expire_after,
                expire_at: Instant::now() + expire_after,
            }),
        })
    }

    pub async fn id(&self) -> Uuid {
        self.inner.read().await.id
    }

    pub async fn username(&self) -> String {
        self.inner.read().await.username.clone()
    }

    pub async fn expire_after(&self) -> Duration {
        self.inner.read().await.expire_after
    }

    /// Checks the session for validity and refreshes its expiry.
    ///
    /// Returns [`Error::SessionExpired`] when the expiry instant has
    /// passed; otherwise `expire_at` advances to `now + expire_after`
    /// (non-expiring sessions are left alone).
    pub async fn authenticate(&self) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.expire_after != Duration::ZERO {
            if Instant::now() > guard.expire_at {
                return Err(Error::SessionExpired);
            }
            guard.expire_at = Instant::now() + guard.expire_after;
        }
        Ok(())
    }

    /// Whether the expiry sweep should remove this session.
    pub async fn should_expire(&self) -> bool {
        let guard = self.inner.read().await;
        guard.expire_after != Duration::ZERO && Instant::now() > guard.expire_at
    }
}

/// The server session table.
///
/// ID minting runs under a dedicated generation lock so two logins can
/// never race the same fresh UUID into the table.
pub struct SessionList {
    inner: RwLock<SessionListInner>,
    gen_lock: Mutex<()>,
    gen_limit: u32,
}

struct SessionListInner {
    sessions: HashMap<Uuid, Arc<Session>>,
    order: Vec<Uuid>,
}

impl SessionList {
    pub fn new(gen_limit: u32) -> Self {
        Self {
            inner: RwLock::new(SessionListInner {
                sessions: HashMap::new(),
                order: Vec::new(),
            }),
            gen_lock: Mutex::new(()),
            gen_limit,
        }
    }

    /// Mints a fresh session ID, retrying on table collision up to the
    /// generation budget.
    async fn mint_id(&self) -> Result<Uuid> {
        for _ in 0..self.gen_limit {
            let id = Uuid::new_v4();
            if !self.inner.read().await.sessions.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(Error::SessionGenLimitReached)
    }

    /// Creates, registers and returns a session for `username`.
    ///
    /// Fails with [`Error::PerUserLimitReached`] when the user already
    /// holds `per_user_cap` sessions (zero disables the cap).
    pub async fn create(
        &self,
        username: &str,
        expire_after: Duration,
        per_user_cap: usize,
    ) -> Result<Arc<Session>> {
        let _minting = self.gen_lock.lock().await;
        let id = self.mint_id().await?;
        let session = Session::new(id, username, expire_after);

        let mut guard = self.inner.write().await;
        if per_user_cap > 0 {
            let mut held = 0usize;
            for existing in guard.sessions.values() {
                if existing.username().await == username {
                    held += 1;
                }
            }
            if held >= per_user_cap {
                return Err(Error::PerUserLimitReached);
            }
        }
        guard.order.push(id);
        guard.sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Session>> {
        self.inner
            .read()
            .await
            .sessions
            .get(&id)
            .cloned()
            .ok_or(Error::SessionNotFound)
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.sessions.remove(&id).is_none() {
            return Err(Error::SessionNotFound);
        }
        guard.order.retain(|existing| *existing != id);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    /// Removes every session whose expiry has passed. Holds the table
    /// write lock for the duration of the sweep.
    pub async fn expire_sessions(&self) -> usize {
        let mut guard = self.inner.write().await;
        let mut expired = Vec::new();
        for (id, session) in &guard.sessions {
            if session.should_expire().await {
                expired.push(*id);
            }
        }
        for id in &expired {
            guard.sessions.remove(id);
        }
        guard.order.retain(|id| !expired.contains(id));
        expired.len()
    }
}
