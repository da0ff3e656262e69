//! Sub-tree creation: a new parent directory plus an ordered list of
//! descendants in one operation.
//!
//! The new sub-root's write lock is held for the whole build, so a racing
//! reader can never observe a half-built tree.

use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLockWriteGuard;

use crate::access::AccessSettings;
use crate::drive::node::{Directory, DirectoryInner};
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path::{self, clean_path, split_parent, split_path};

use super::clean_all;

/// Creates the directory at `parent_path` and every descendant beneath it.
///
/// The parent must not exist yet while its own parent must; descendants
/// are relative to the parent and must arrive in traversal order (each
/// resolvable when it is added), otherwise the operation fails with
/// [`Error::InvalidDirectoryTree`].
pub async fn create_dirs_tree(
    drive: &Drive,
    parent_path: &str,
    descendants: &[String],
    parent_settings: Option<AccessSettings>,
    descendant_settings: Option<&[AccessSettings]>,
    use_parent_settings: bool,
    editor: &str,
) -> Result<()> {
    let cleaned_parent = clean_path(parent_path)?;
    if cleaned_parent.is_empty() {
        return Err(Error::EmptyPath);
    }
    if let Some(list) = descendant_settings {
        if list.len() != descendants.len() {
            return Err(Error::InvalidLength);
        }
    }
    let cleaned_descendants = clean_all(descendants)?;

    let (grandparent_path, name) = split_parent(&cleaned_parent);
    let grandparent = drive.dir_by_path(&grandparent_path).await?;

    let sub_root;
    let mut sub_guard;
    {
        let mut guard = grandparent.write().await;
        if guard.has_child(&name) {
            return Err(Error::AlreadyExists(cleaned_parent.clone()));
        }
        let settings = match &parent_settings {
            Some(settings) => settings.clone(),
            None => guard.settings().clone(),
        };
        sub_root = Directory::new(&name, settings, &grandparent, editor)?;
        guard.insert_dir(name.clone(), Arc::clone(&sub_root));
        drive.set_dirty(true).await;
        // lock the sub-root before the grandparent guard drops, so no
        // reader can slip into the half-built tree
        sub_guard = sub_root.write().await;
    }
    fs::create_dir(drive.host_path_of(&cleaned_parent).await).await?;

    for (index, descendant) in cleaned_descendants.iter().enumerate() {
        if descendant.is_empty() {
            return Err(Error::InvalidDirectoryTree);
        }
        insert_descendant(
            drive,
            &cleaned_parent,
            &sub_root,
            &mut sub_guard,
            descendant,
            descendant_settings.map(|list| &list[index]),
            use_parent_settings,
            editor,
        )
        .await?;
    }
    Ok(())
}

/// Adds one descendant under the held sub-root.
///
/// The first path component resolves through the held guard; deeper
/// components take their own locks, which cannot contend while the
/// sub-root is write-held.
#[allow(clippy::too_many_arguments)]
async fn insert_descendant(
    drive: &Drive,
    tree_root_path: &str,
    sub_root: &Arc<Directory>,
    sub_guard: &mut RwLockWriteGuard<'_, DirectoryInner>,
    descendant: &str,
    settings: Option<&AccessSettings>,
    use_parent_settings: bool,
    editor: &str,
) -> Result<()> {
    let components = split_path(descendant);
    let full = path::join(tree_root_path, descendant);

    if components.len() == 1 {
        let name = &components[0];
        if sub_guard.has_child(name) {
            return Err(Error::AlreadyExists(full));
        }
        let node_settings = descendant_settings(settings, use_parent_settings, sub_guard);
        let node = Directory::new(name, node_settings, sub_root, editor)?;
        sub_guard.insert_dir(name.clone(), node);
    } else {
        let mut current = sub_guard
            .get_dir(&components[0])
            .ok_or(Error::InvalidDirectoryTree)?;
        for component in &components[1..components.len() - 1] {
            let child = {
                let guard = current.read().await;
                guard.get_dir(component).ok_or(Error::InvalidDirectoryTree)?
            };
            current = child;
        }
        let name = &components[components.len() - 1];
        let mut guard = current.write().await;
        if guard.has_child(name) {
            return Err(Error::AlreadyExists(full));
        }
        let node_settings = descendant_settings(settings, use_parent_settings, &guard);
        let node = Directory::new(name, node_settings, &current, editor)?;
        guard.insert_dir(name.to_string(), node);
    }
    drive.set_dirty(true).await;

    fs::create_dir(drive.host_path_of(&full).await).await?;
    Ok(())
}

fn descendant_settings(
    settings: Option<&AccessSettings>,
    use_parent_settings: bool,
    parent: &DirectoryInner,
) -> AccessSettings {
    if use_parent_settings {
        return parent.settings().clone();
    }
    match settings {
        Some(settings) => settings.clone(),
        None => parent.settings().clone(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn settings() -> AccessSettings {
        AccessSettings::new(1, 1).unwrap()
    }

    fn drive_at(dir: &TempDir) -> Drive {
        Drive::new("main", dir.path(), Directory::new_root(settings(), "lily"))
    }

    #[tokio::test]
    async fn test_tree_built_in_traversal_order() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let descendants = vec![
            "a".to_string(),
            "a/b".to_string(),
            "a/b/c".to_string(),
            "d".to_string(),
        ];
        create_dirs_tree(&drive, "tree", &descendants, None, None, true, "lily")
            .await
            .unwrap();

        assert!(drive.dir_by_path("tree/a/b/c").await.is_ok());
        assert!(drive.dir_by_path("tree/d").await.is_ok());
        assert!(host.path().join("tree/a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_tree_out_of_order_rejected() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let descendants = vec!["a/b".to_string()];
        let result =
            create_dirs_tree(&drive, "tree", &descendants, None, None, true, "lily").await;
        assert!(matches!(result, Err(Error::InvalidDirectoryTree)));
    }

    #[tokio::test]
    async fn test_tree_empty_parent_rejected() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let result = create_dirs_tree(&drive, "", &[], None, None, true, "lily").await;
        assert!(matches!(result, Err(Error::EmptyPath)));
    }

    #[tokio::test]
    async fn test_tree_existing_parent_rejected() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_dirs_tree(&drive, "tree", &[], None, None, true, "lily").await.unwrap();
        let result = create_dirs_tree(&drive, "tree", &[], None, None, true, "lily").await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_tree_grandparent_must_exist() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let result =
            create_dirs_tree(&drive, "missing/tree", &[], None, None, true, "lily").await;
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_tree_descendant_settings_parallel() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let custom = AccessSettings::new(3, 4).unwrap();
        create_dirs_tree(
            &drive,
            "tree",
            &["a".to_string()],
            Some(settings()),
            Some(std::slice::from_ref(&custom)),
            false,
            "lily",
        )
        .await
        .unwrap();
        let a = drive.dir_by_path("tree/a").await.unwrap();
        assert_eq!(a.settings().await, custom);
    }
}
