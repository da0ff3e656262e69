//! The drive: a named store backed by one host directory, with an
//! authoritative in-memory tree.

pub mod health;
pub mod marshal;
pub mod node;
pub mod ops;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;

use crate::access::AccessSettings;
use crate::error::{Error, Result};
use crate::path::{clean_path, split_path};

use node::{check_name, Directory, File};

/// A named file store rooted at one host directory.
///
/// The drive-level lock protects the scalar fields only; tree mutations
/// synchronize on the per-node locks.
pub struct Drive {
    root: Arc<Directory>,
    state: RwLock<DriveState>,
}

struct DriveState {
    name: String,
    host_path: PathBuf,
    dirty: bool,
}

impl Drive {
    pub fn new(name: impl Into<String>, host_path: impl Into<PathBuf>, root: Arc<Directory>) -> Self {
        Self {
            root,
            state: RwLock::new(DriveState {
                name: name.into(),
                host_path: host_path.into(),
                dirty: false,
            }),
        }
    }

    pub fn root(&self) -> &Arc<Directory> {
        &self.root
    }

    pub async fn name(&self) -> String {
        self.state.read().await.name.clone()
    }

    pub async fn set_name(&self, name: impl Into<String>) {
        self.state.write().await.name = name.into();
    }

    pub async fn host_path(&self) -> PathBuf {
        self.state.read().await.host_path.clone()
    }

    pub async fn set_host_path(&self, host_path: impl Into<PathBuf>) {
        self.state.write().await.host_path = host_path.into();
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.read().await.dirty
    }

    pub async fn set_dirty(&self, dirty: bool) {
        self.state.write().await.dirty = dirty;
    }

    /// Joins a cleaned drive-relative path onto the host prefix with the
    /// platform separator.
    pub async fn host_path_of(&self, path: &str) -> PathBuf {
        let mut host = self.host_path().await;
        for component in split_path(path) {
            host.push(component);
        }
        host
    }

    /// Resolves a drive-relative path to a directory node.
    ///
    /// The walk holds each parent's read lock until a reference to the
    /// chosen child has been captured, then releases it before descending.
    /// No lock is held when the node is returned.
    pub async fn dir_by_path(&self, path: &str) -> Result<Arc<Directory>> {
        let cleaned = clean_path(path)?;
        let mut current = Arc::clone(&self.root);
        for component in split_path(&cleaned) {
            let child = {
                let guard = current.read().await;
                guard
                    .get_dir(&component)
                    .ok_or_else(|| Error::PathNotFound(cleaned.clone()))?
            };
            current = child;
        }
        Ok(current)
    }

    /// Resolves a drive-relative path to a file node.
    pub async fn file_by_path(&self, path: &str) -> Result<Arc<File>> {
        let cleaned = clean_path(path)?;
        let components = split_path(&cleaned);
        let (name, parents) = components
            .split_last()
            .ok_or(Error::EmptyPath)?;
        let mut current = Arc::clone(&self.root);
        for component in parents {
            let child = {
                let guard = current.read().await;
                guard
                    .get_dir(component)
                    .ok_or_else(|| Error::PathNotFound(cleaned.clone()))?
            };
            current = child;
        }
        let guard = current.read().await;
        guard
            .get_file(name)
            .ok_or_else(|| Error::PathNotFound(cleaned.clone()))
    }
}

/// Builds a fresh tree by walking a host directory.
///
/// Every imported node receives a copy of `settings` and `editor` as its
/// last editor. Host entries whose names the tree cannot hold are
/// skipped.
pub async fn import_root(
    host: &Path,
    settings: AccessSettings,
    editor: &str,
) -> Result<Arc<Directory>> {
    let root = Directory::new_root(settings.clone(), editor);
    let mut stack: Vec<(Arc<Directory>, PathBuf)> =
        vec![(Arc::clone(&root), host.to_owned())];

    while let Some((dir, host_dir)) = stack.pop() {
        let mut entries = fs::read_dir(&host_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if check_name(&name).is_err() {
                continue;
            }
            let kind = entry.file_type().await?;
            if kind.is_dir() {
                let child = Directory::new(&name, settings.clone(), &dir, editor)?;
                dir.write().await.insert_dir(name, Arc::clone(&child));
                stack.push((child, entry.path()));
            } else if kind.is_file() {
                let file = File::new(&name, settings.clone(), editor)?;
                dir.write().await.insert_file(name, file);
            }
        }
    }
    Ok(root)
}
