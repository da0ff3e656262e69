//! Users and the server user list.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::access::check_clearance;
use crate::auth::password;
use crate::error::{Error, Result};
use crate::wire::primitive::{parse_string, parse_u16, parse_u32, write_string, write_u16, write_u32};

/// One credential: username, bcrypt hash and clearance.
pub struct User {
    inner: RwLock<UserInner>,
}

struct UserInner {
    username: String,
    password_hash: String,
    clearance: u8,
}

impl User {
    /// Creates a user from a plaintext password.
    pub fn new(username: &str, plain_password: &str, clearance: u8) -> Result<Arc<Self>> {
        if username.is_empty() {
            return Err(Error::InvalidName(String::new()));
        }
        check_clearance(clearance)?;
        let password_hash = password::hash_password(plain_password)?;
        Ok(Arc::new(Self {
            inner: RwLock::new(UserInner {
                username: username.to_owned(),
                password_hash,
                clearance,
            }),
        }))
    }

    /// Restores a user from an on-disk hash. The empty password never
    /// reaches this path; the hash format is validated instead.
    pub fn from_hash(username: &str, password_hash: &str, clearance: u8) -> Result<Arc<Self>> {
        if username.is_empty() {
            return Err(Error::InvalidName(String::new()));
        }
        check_clearance(clearance)?;
        password::check_hash_format(password_hash)?;
        Ok(Arc::new(Self {
            inner: RwLock::new(UserInner {
                username: username.to_owned(),
                password_hash: password_hash.to_owned(),
                clearance,
            }),
        }))
    }

    pub async fn username(&self) -> String {
        self.inner.read().await.username.clone()
    }

    pub async fn clearance(&self) -> u8 {
        self.inner.read().await.clearance
    }

    pub async fn password_hash(&self) -> String {
        self.inner.read().await.password_hash.clone()
    }

    /// Verifies a plaintext password against the stored hash.
    pub async fn verify_password(&self, plain: &str) -> Result<()> {
        let hash = self.password_hash().await;
        password::verify_password(plain, &hash)
    }

    pub async fn set_password(&self, plain: &str) -> Result<()> {
        let hash = password::hash_password(plain)?;
        self.inner.write().await.password_hash = hash;
        Ok(())
    }

    pub async fn set_clearance(&self, clearance: u8) -> Result<()> {
        check_clearance(clearance)?;
        self.inner.write().await.clearance = clearance;
        Ok(())
    }
}

/// The server's user table, with insertion order and a dirty flag.
pub struct UserList {
    inner: RwLock<UserListInner>,
}

struct UserListInner {
    users: HashMap<String, Arc<User>>,
    order: Vec<String>,
    dirty: bool,
}

impl Default for UserList {
    fn default() -> Self {
        Self::new()
    }
}

impl UserList {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(UserListInner {
                users: HashMap::new(),
                order: Vec::new(),
                dirty: false,
            }),
        }
    }

    pub async fn add(&self, user: Arc<User>) -> Result<()> {
        let username = user.username().await;
        let mut guard = self.inner.write().await;
        if guard.users.contains_key(&username) {
            return Err(Error::UserAlreadyExists(username));
        }
        guard.order.push(username.clone());
        guard.users.insert(username, user);
        guard.dirty = true;
        Ok(())
    }

    pub async fn remove(&self, username: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.users.remove(username).is_none() {
            return Err(Error::UserNotFound(username.to_owned()));
        }
        guard.order.retain(|name| name != username);
        guard.dirty = true;
        Ok(())
    }

    pub async fn get(&self, username: &str) -> Result<Arc<User>> {
        self.inner
            .read()
            .await
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| Error::UserNotFound(username.to_owned()))
    }

    /// Usernames in insertion order.
    pub async fn usernames(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.users.is_empty()
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.read().await.dirty
    }

    pub async fn set_dirty(&self, dirty: bool) {
        self.inner.write().await.dirty = dirty;
    }

    /// Serializes the list in insertion order.
    pub async fn marshal(&self, dest: &mut impl Write) -> Result<()> {
        let guard = self.inner.read().await;
        let count = u16::try_from(guard.order.len()).map_err(|_| Error::InvalidSliceLength)?;
        write_u16(dest, count)?;
        for name in &guard.order {
            let user = guard
                .users
                .get(name)
                .ok_or_else(|| Error::UserNotFound(name.clone()))?;
            let inner = user.inner.read().await;
            write_string(dest, &inner.username)?;
            write_string(dest, &inner.password_hash)?;
            write_u32(dest, inner.clearance as u32)?;
        }
        Ok(())
    }

    /// Restores a list from its marshalled form.
    pub async fn unmarshal(src: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self> {
        let count = parse_u16(src)? as usize;
        let list = Self::new();
        for _ in 0..count {
            let username = parse_string(src)?;
            let hash = parse_string(src)?;
            let clearance = parse_u32(src)? as u8;
            list.add(User::from_hash(&username, &hash, clearance)?).await?;
        }
        list.set_dirty(false).await;
        Ok(list)
    }
}
