//! Directory and file deletion.

use tokio::fs;

use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path;

use super::{bucket_by_parent, clean_all, parent_and_name};

/// Deletes one directory per path, recursively removing the host
/// counterpart.
pub async fn delete_dirs(drive: &Drive, paths: &[String], grouped: bool) -> Result<()> {
    delete_nodes(drive, paths, grouped, false).await
}

/// Deletes one file per path.
pub async fn delete_files(drive: &Drive, paths: &[String], grouped: bool) -> Result<()> {
    delete_nodes(drive, paths, grouped, true).await
}

async fn delete_nodes(
    drive: &Drive,
    paths: &[String],
    grouped: bool,
    as_files: bool,
) -> Result<()> {
    let cleaned = clean_all(paths)?;

    if grouped {
        for bucket in bucket_by_parent(&cleaned)? {
            let parent = drive.dir_by_path(&bucket.parent_path).await?;
            let mut guard = parent.write().await;
            for (_, name) in &bucket.entries {
                let full = path::join(&bucket.parent_path, name);
                delete_one(drive, &mut *guard, &full, name, as_files).await?;
            }
        }
    } else {
        for cleaned_path in &cleaned {
            let (parent_path, name) = parent_and_name(cleaned_path)?;
            let parent = drive.dir_by_path(&parent_path).await?;
            let mut guard = parent.write().await;
            delete_one(drive, &mut *guard, cleaned_path, &name, as_files).await?;
        }
    }
    Ok(())
}

async fn delete_one(
    drive: &Drive,
    guard: &mut crate::drive::node::DirectoryInner,
    full: &str,
    name: &str,
    as_file: bool,
) -> Result<()> {
    let removed = if as_file {
        guard.remove_file(name).is_some()
    } else {
        guard.remove_dir(name).is_some()
    };
    if !removed {
        return Err(Error::PathNotFound(full.to_owned()));
    }
    drive.set_dirty(true).await;

    let host = drive.host_path_of(full).await;
    if as_file {
        fs::remove_file(&host).await?;
    } else {
        fs::remove_dir_all(&host).await?;
    }
    Ok(())
}
