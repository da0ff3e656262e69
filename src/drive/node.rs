//! Directory and file nodes of the in-memory drive tree.
//!
//! Every node owns a reader/writer lock guarding its scalar fields and (for
//! directories) its children maps. Children are owned exclusively by their
//! parent; the upward reference is a non-owning weak handle used for
//! relation checks only and never dereferenced during lookups.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use tokio::sync::{
    OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::access::AccessSettings;
use crate::error::{Error, Result};

/// Characters that may not appear in a node name.
pub const ILLEGAL_NAME_CHARS: &[char] = &['"', '*', '/', ':', '<', '>', '?', '\\', '|'];

/// Length of a stored file content hash (SHA-256).
pub const HASH_LEN: usize = 32;

/// Validates a node-local name.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(ILLEGAL_NAME_CHARS) {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// A directory node.
pub struct Directory {
    lock: Arc<RwLock<DirectoryInner>>,
}

/// Lock-guarded state of a [`Directory`].
pub struct DirectoryInner {
    name: String,
    is_root: bool,
    parent: Weak<Directory>,
    settings: AccessSettings,
    last_editor: String,
    last_edit: SystemTime,
    dirs: BTreeMap<String, Arc<Directory>>,
    files: BTreeMap<String, Arc<File>>,
}

impl Directory {
    /// Creates a drive root. The root's name is empty and its parent
    /// handle is never resolvable.
    pub fn new_root(settings: AccessSettings, editor: &str) -> Arc<Self> {
        Arc::new(Self {
            lock: Arc::new(RwLock::new(DirectoryInner {
                name: String::new(),
                is_root: true,
                parent: Weak::new(),
                settings,
                last_editor: editor.to_owned(),
                last_edit: SystemTime::now(),
                dirs: BTreeMap::new(),
                files: BTreeMap::new(),
            })),
        })
    }

    /// Creates a detached directory node under `parent`.
    ///
    /// The node is not inserted into the parent's children map; the caller
    /// does that under the parent's write lock.
    pub fn new(
        name: &str,
        settings: AccessSettings,
        parent: &Arc<Directory>,
        editor: &str,
    ) -> Result<Arc<Self>> {
        check_name(name)?;
        Ok(Arc::new(Self {
            lock: Arc::new(RwLock::new(DirectoryInner {
                name: name.to_owned(),
                is_root: false,
                parent: Arc::downgrade(parent),
                settings,
                last_editor: editor.to_owned(),
                last_edit: SystemTime::now(),
                dirs: BTreeMap::new(),
                files: BTreeMap::new(),
            })),
        }))
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, DirectoryInner> {
        self.lock.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, DirectoryInner> {
        self.lock.write().await
    }

    /// Self-locking name getter.
    pub async fn name(&self) -> String {
        self.lock.read().await.name.clone()
    }

    /// Self-locking settings snapshot.
    pub async fn settings(&self) -> AccessSettings {
        self.lock.read().await.settings.clone()
    }

    /// Self-locking last-editor getter.
    pub async fn last_editor(&self) -> String {
        self.lock.read().await.last_editor.clone()
    }
}

impl DirectoryInner {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// The parent handle; resolution may fail during teardown.
    pub fn parent(&self) -> Weak<Directory> {
        self.parent.clone()
    }

    pub fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut AccessSettings {
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: AccessSettings) {
        self.settings = settings;
    }

    pub fn last_editor(&self) -> &str {
        &self.last_editor
    }

    pub fn last_edit(&self) -> SystemTime {
        self.last_edit
    }

    /// Records `editor` as the last principal to touch this node.
    pub fn touch(&mut self, editor: &str) {
        self.last_editor = editor.to_owned();
        self.last_edit = SystemTime::now();
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_parent(&mut self, parent: &Arc<Directory>) {
        self.parent = Arc::downgrade(parent);
    }

    pub(crate) fn set_last_edit(&mut self, at: SystemTime) {
        self.last_edit = at;
    }

    pub fn get_dir(&self, name: &str) -> Option<Arc<Directory>> {
        self.dirs.get(name).cloned()
    }

    pub fn get_file(&self, name: &str) -> Option<Arc<File>> {
        self.files.get(name).cloned()
    }

    /// Whether `name` is taken by either a subdirectory or a file.
    pub fn has_child(&self, name: &str) -> bool {
        self.dirs.contains_key(name) || self.files.contains_key(name)
    }

    pub fn insert_dir(&mut self, name: String, dir: Arc<Directory>) {
        self.dirs.insert(name, dir);
    }

    pub fn insert_file(&mut self, name: String, file: Arc<File>) {
        self.files.insert(name, file);
    }

    pub fn remove_dir(&mut self, name: &str) -> Option<Arc<Directory>> {
        self.dirs.remove(name)
    }

    pub fn remove_file(&mut self, name: &str) -> Option<Arc<File>> {
        self.files.remove(name)
    }

    /// Subdirectories in name order.
    pub fn dirs(&self) -> impl Iterator<Item = (&String, &Arc<Directory>)> {
        self.dirs.iter()
    }

    /// Files in name order.
    pub fn files(&self) -> impl Iterator<Item = (&String, &Arc<File>)> {
        self.files.iter()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// A file node. Content lives on the host filesystem; the node carries the
/// metadata.
pub struct File {
    lock: Arc<RwLock<FileInner>>,
}

/// Lock-guarded state of a [`File`].
pub struct FileInner {
    name: String,
    settings: AccessSettings,
    last_editor: String,
    last_edit: SystemTime,
    hash: [u8; HASH_LEN],
    encrypted: bool,
}

impl File {
    /// Creates a detached file node.
    pub fn new(name: &str, settings: AccessSettings, editor: &str) -> Result<Arc<Self>> {
        check_name(name)?;
        Ok(Arc::new(Self {
            lock: Arc::new(RwLock::new(FileInner {
                name: name.to_owned(),
                settings,
                last_editor: editor.to_owned(),
                last_edit: SystemTime::now(),
                hash: [0u8; HASH_LEN],
                encrypted: false,
            })),
        }))
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, FileInner> {
        self.lock.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, FileInner> {
        self.lock.write().await
    }

    /// Read guard that owns its lock handle, usable across await points
    /// while other guards are collected.
    pub async fn read_owned(&self) -> OwnedRwLockReadGuard<FileInner> {
        self.lock.clone().read_owned().await
    }

    /// Owned write guard; see [`File::read_owned`].
    pub async fn write_owned(&self) -> OwnedRwLockWriteGuard<FileInner> {
        self.lock.clone().write_owned().await
    }

    pub async fn name(&self) -> String {
        self.lock.read().await.name.clone()
    }

    pub async fn settings(&self) -> AccessSettings {
        self.lock.read().await.settings.clone()
    }

    pub async fn last_editor(&self) -> String {
        self.lock.read().await.last_editor.clone()
    }
}

impl FileInner {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut AccessSettings {
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: AccessSettings) {
        self.settings = settings;
    }

    pub fn last_editor(&self) -> &str {
        &self.last_editor
    }

    pub fn last_edit(&self) -> SystemTime {
        self.last_edit
    }

    pub fn touch(&mut self, editor: &str) {
        self.last_editor = editor.to_owned();
        self.last_edit = SystemTime::now();
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_last_edit(&mut self, at: SystemTime) {
        self.last_edit = at;
    }

    /// Stored content hash; all-zero when never hashed.
    pub fn hash(&self) -> &[u8; HASH_LEN] {
        &self.hash
    }

    pub fn set_hash(&mut self, hash: [u8; HASH_LEN]) {
        self.hash = hash;
    }

    /// Metadata-only flag; stored bytes are never transformed.
    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }
}
