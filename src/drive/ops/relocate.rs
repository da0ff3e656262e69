//! Moving directories and files between parents.
//!
//! Each pair locks the source parent first, then the destination parent;
//! when both resolve to the same node the lock is acquired once. The moved
//! node keeps its access settings.

use std::sync::Arc;

use tokio::fs;

use crate::drive::node::{check_name, Directory, DirectoryInner};
use crate::drive::Drive;
use crate::error::{Error, Result};

use super::{clean_all, parent_and_name};

/// Moves one directory per source path to the parallel destination path.
pub async fn move_dirs(
    drive: &Drive,
    sources: &[String],
    destinations: &[String],
    editor: &str,
) -> Result<()> {
    move_nodes(drive, sources, destinations, editor, false).await
}

/// Moves one file per source path to the parallel destination path.
pub async fn move_files(
    drive: &Drive,
    sources: &[String],
    destinations: &[String],
    editor: &str,
) -> Result<()> {
    move_nodes(drive, sources, destinations, editor, true).await
}

async fn move_nodes(
    drive: &Drive,
    sources: &[String],
    destinations: &[String],
    editor: &str,
    as_files: bool,
) -> Result<()> {
    if sources.len() != destinations.len() {
        return Err(Error::InvalidLength);
    }
    let sources = clean_all(sources)?;
    let destinations = clean_all(destinations)?;

    for (source, destination) in sources.iter().zip(destinations.iter()) {
        move_one(drive, source, destination, editor, as_files).await?;
    }
    Ok(())
}

async fn move_one(
    drive: &Drive,
    source: &str,
    destination: &str,
    editor: &str,
    as_file: bool,
) -> Result<()> {
    let (src_parent_path, src_name) = parent_and_name(source)?;
    let (dst_parent_path, dst_name) = parent_and_name(destination)?;
    check_name(&dst_name)?;

    // a directory cannot be moved into its own subtree
    if !as_file
        && (destination == source || dst_parent_path.starts_with(&format!("{source}/")) || dst_parent_path == source)
    {
        return Err(Error::InvalidDirectoryTree);
    }

    let src_parent = drive.dir_by_path(&src_parent_path).await?;
    if src_parent_path == dst_parent_path {
        let mut guard = src_parent.write().await;
        relink(&src_parent, &mut guard, None, source, &src_name, &dst_name, editor, as_file)
            .await?;
    } else {
        let dst_parent = drive.dir_by_path(&dst_parent_path).await?;
        // source parent first, then destination parent
        let mut src_guard = src_parent.write().await;
        let mut dst_guard = dst_parent.write().await;
        relink(
            &dst_parent,
            &mut src_guard,
            Some(&mut dst_guard),
            source,
            &src_name,
            &dst_name,
            editor,
            as_file,
        )
        .await?;
    }
    drive.set_dirty(true).await;

    let host_src = drive.host_path_of(source).await;
    let host_dst = drive.host_path_of(destination).await;
    fs::rename(&host_src, &host_dst).await?;
    Ok(())
}

/// Detaches the node from the source guard and re-attaches it under the
/// destination guard (the source guard itself when the parents match).
#[allow(clippy::too_many_arguments)]
async fn relink(
    dst_parent: &Arc<Directory>,
    src_guard: &mut DirectoryInner,
    dst_guard: Option<&mut DirectoryInner>,
    source: &str,
    src_name: &str,
    dst_name: &str,
    editor: &str,
    as_file: bool,
) -> Result<()> {
    {
        let free = match &dst_guard {
            Some(guard) => !guard.has_child(dst_name),
            None => !src_guard.has_child(dst_name),
        };
        if !free {
            return Err(Error::AlreadyExists(dst_name.to_owned()));
        }
    }

    if as_file {
        let node = src_guard
            .remove_file(src_name)
            .ok_or_else(|| Error::PathNotFound(source.to_owned()))?;
        {
            let mut inner = node.write().await;
            inner.set_name(dst_name.to_owned());
            inner.touch(editor);
        }
        match dst_guard {
            Some(guard) => guard.insert_file(dst_name.to_owned(), node),
            None => src_guard.insert_file(dst_name.to_owned(), node),
        }
    } else {
        let node = src_guard
            .remove_dir(src_name)
            .ok_or_else(|| Error::PathNotFound(source.to_owned()))?;
        {
            let mut inner = node.write().await;
            inner.set_name(dst_name.to_owned());
            inner.set_parent(dst_parent);
            inner.touch(editor);
        }
        match dst_guard {
            Some(guard) => guard.insert_dir(dst_name.to_owned(), node),
            None => src_guard.insert_dir(dst_name.to_owned(), node),
        }
    }
    Ok(())
}
