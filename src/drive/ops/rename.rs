//! Directory and file renaming.
//!
//! A rename detaches the node under the parent's write lock, gives it the
//! new local name and re-attaches it. The node's access settings travel
//! with it verbatim.

use tokio::fs;

use crate::drive::node::{check_name, DirectoryInner};
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path;

use super::{bucket_by_parent, clean_all, parent_and_name};

/// Renames one directory per path to the parallel new local name.
pub async fn rename_dirs(
    drive: &Drive,
    paths: &[String],
    new_names: &[String],
    editor: &str,
    grouped: bool,
) -> Result<()> {
    rename_nodes(drive, paths, new_names, editor, grouped, false).await
}

/// Renames one file per path to the parallel new local name.
pub async fn rename_files(
    drive: &Drive,
    paths: &[String],
    new_names: &[String],
    editor: &str,
    grouped: bool,
) -> Result<()> {
    rename_nodes(drive, paths, new_names, editor, grouped, true).await
}

async fn rename_nodes(
    drive: &Drive,
    paths: &[String],
    new_names: &[String],
    editor: &str,
    grouped: bool,
    as_files: bool,
) -> Result<()> {
    if paths.len() != new_names.len() {
        return Err(Error::InvalidLength);
    }
    for name in new_names {
        check_name(name)?;
    }
    let cleaned = clean_all(paths)?;

    if grouped {
        for bucket in bucket_by_parent(&cleaned)? {
            let parent = drive.dir_by_path(&bucket.parent_path).await?;
            let mut guard = parent.write().await;
            for (index, name) in &bucket.entries {
                rename_one(
                    drive,
                    &mut guard,
                    &bucket.parent_path,
                    name,
                    &new_names[*index],
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
            rename_one(
                drive,
                &mut guard,
                &parent_path,
                &name,
                &new_names[index],
                editor,
                as_files,
            )
            .await?;
        }
    }
    Ok(())
}

async fn rename_one(
    drive: &Drive,
    guard: &mut DirectoryInner,
    parent_path: &str,
    old_name: &str,
    new_name: &str,
    editor: &str,
    as_file: bool,
) -> Result<()> {
    let old_full = path::join(parent_path, old_name);
    if guard.has_child(new_name) {
        return Err(Error::AlreadyExists(path::join(parent_path, new_name)));
    }

    if as_file {
        let node = guard
            .remove_file(old_name)
            .ok_or_else(|| Error::PathNotFound(old_full.clone()))?;
        {
            let mut inner = node.write().await;
            inner.set_name(new_name.to_owned());
            inner.touch(editor);
        }
        guard.insert_file(new_name.to_owned(), node);
    } else {
        let node = guard
            .remove_dir(old_name)
            .ok_or_else(|| Error::PathNotFound(old_full.clone()))?;
        {
            let mut inner = node.write().await;
            inner.set_name(new_name.to_owned());
            inner.touch(editor);
        }
        guard.insert_dir(new_name.to_owned(), node);
    }
    drive.set_dirty(true).await;

    let host_old = drive.host_path_of(&old_full).await;
    let host_new = drive.host_path_of(&path::join(parent_path, new_name)).await;
    fs::rename(&host_old, &host_new).await?;
    Ok(())
}
