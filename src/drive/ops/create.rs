//! Directory and file creation.

use std::sync::Arc;

use tokio::fs::{self, OpenOptions};
use tokio::sync::RwLockWriteGuard;

use crate::access::AccessSettings;
use crate::drive::node::{Directory, DirectoryInner, File};
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path;

use super::{bucket_by_parent, clean_all, parent_and_name};

/// Creates one directory per path.
///
/// With `use_parent_settings` each new node inherits a copy of its
/// immediate parent's access settings; otherwise the parallel `settings`
/// list supplies them (parent copy when absent). The in-memory insert
/// precedes the host-FS create; a host failure leaves the insert in place
/// for the health pass to flag.
pub async fn create_dirs(
    drive: &Drive,
    paths: &[String],
    settings: Option<&[AccessSettings]>,
    use_parent_settings: bool,
    editor: &str,
    grouped: bool,
) -> Result<()> {
    create_nodes(drive, paths, settings, use_parent_settings, editor, grouped, false).await
}

/// Creates one empty file per path. Host files are created and
/// immediately closed.
pub async fn create_files(
    drive: &Drive,
    paths: &[String],
    settings: Option<&[AccessSettings]>,
    use_parent_settings: bool,
    editor: &str,
    grouped: bool,
) -> Result<()> {
    create_nodes(drive, paths, settings, use_parent_settings, editor, grouped, true).await
}

async fn create_nodes(
    drive: &Drive,
    paths: &[String],
    settings: Option<&[AccessSettings]>,
    use_parent_settings: bool,
    editor: &str,
    grouped: bool,
    as_files: bool,
) -> Result<()> {
    let cleaned = clean_all(paths)?;
    if let Some(list) = settings {
        if list.len() != paths.len() {
            return Err(Error::InvalidLength);
        }
    }

    if grouped {
        for bucket in bucket_by_parent(&cleaned)? {
            let parent = drive.dir_by_path(&bucket.parent_path).await?;
            let mut guard = parent.write().await;
            for (index, name) in &bucket.entries {
                let node_settings = pick_settings(settings, *index, use_parent_settings, &guard);
                create_one(
                    drive,
                    &parent,
                    &mut guard,
                    &bucket.parent_path,
                    name,
                    node_settings,
                    editor,
                    as_files,
                )
                .await?;
            }
        }
    } else {
        for (index, cleaned_path) in cleaned.iter().enumerate() {
            let (parent_path, name) = parent_and_name(cleaned_path)?;
            let parent = drive.dir_by_path(&parent_path).await?;
            let mut guard = parent.write().await;
            let node_settings = pick_settings(settings, index, use_parent_settings, &guard);
            create_one(
                drive,
                &parent,
                &mut guard,
                &parent_path,
                &name,
                node_settings,
                editor,
                as_files,
            )
            .await?;
        }
    }
    Ok(())
}

fn pick_settings(
    settings: Option<&[AccessSettings]>,
    index: usize,
    use_parent_settings: bool,
    parent: &RwLockWriteGuard<'_, DirectoryInner>,
) -> AccessSettings {
    if use_parent_settings {
        return parent.settings().clone();
    }
    match settings {
        Some(list) => list[index].clone(),
        None => parent.settings().clone(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_one(
    drive: &Drive,
    parent: &Arc<Directory>,
    guard: &mut RwLockWriteGuard<'_, DirectoryInner>,
    parent_path: &str,
    name: &str,
    settings: AccessSettings,
    editor: &str,
    as_file: bool,
) -> Result<()> {
    let full = path::join(parent_path, name);
    if guard.has_child(name) {
        return Err(Error::AlreadyExists(full));
    }
    if as_file {
        let file = File::new(name, settings, editor)?;
        guard.insert_file(name.to_owned(), file);
    } else {
        let dir = Directory::new(name, settings, parent, editor)?;
        guard.insert_dir(name.to_owned(), dir);
    }
    drive.set_dirty(true).await;

    let host = drive.host_path_of(&full).await;
    if as_file {
        // created then immediately closed on drop
        OpenOptions::new().write(true).create(true).open(&host).await?;
    } else {
        fs::create_dir(&host).await?;
    }
    Ok(())
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
    async fn test_create_dirs_grouped() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let paths = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        create_dirs(&drive, &paths, None, true, "lily", true).await.unwrap();

        for name in ["a", "b", "c"] {
            assert!(drive.dir_by_path(name).await.is_ok());
            assert!(host.path().join(name).is_dir());
        }
        assert!(drive.is_dirty().await);
    }

    #[tokio::test]
    async fn test_create_files_then_collision() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let paths = vec!["a.txt".to_string()];
        create_files(&drive, &paths, None, true, "lily", false).await.unwrap();
        assert!(host.path().join("a.txt").is_file());

        // same name as a file, as a dir
        let result = create_dirs(&drive, &paths, None, true, "lily", false).await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_create_missing_parent() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let result =
            create_dirs(&drive, &["x/y".to_string()], None, true, "lily", false).await;
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_settings_list_length_checked() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let list = vec![settings()];
        let result = create_dirs(
            &drive,
            &["a".to_string(), "b".to_string()],
            Some(&list),
            false,
            "lily",
            false,
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidLength)));
    }

    #[tokio::test]
    async fn test_inherits_parent_settings_copy() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let mut root_settings = AccessSettings::new(2, 4).unwrap();
        root_settings.add_users_access_whitelist(&["lily".to_string()]);
        drive.root().write().await.set_settings(root_settings.clone());

        create_dirs(&drive, &["a".to_string()], None, true, "lily", false).await.unwrap();
        let a = drive.dir_by_path("a").await.unwrap();
        assert_eq!(a.settings().await, root_settings);
    }
}
