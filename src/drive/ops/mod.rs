//! Filesystem operations over the drive tree.
//!
//! Every operation takes a principal name for last-editor annotation,
//! cleans all paths on entry, and checks parallel-array lengths up front.
//! Bulk operations accept a `grouped` flag: when set, paths are bucketed by
//! their immediate parent and each parent's write lock is acquired exactly
//! once for the whole bucket; when unset the same work runs per path.
//!
//! A bulk operation is a linear fold with a single error state: the first
//! failure short-circuits, releases held locks, and returns. Partial
//! effects on earlier paths remain visible and are not rolled back; the
//! drive dirty flag is raised as soon as the first mutation lands so the
//! persistence cron captures them.

mod create;
mod delete;
mod hash;
mod list;
mod read;
mod relocate;
mod rename;
mod stat;
mod tree;
mod write;

pub use create::{create_dirs, create_files};
pub use delete::{delete_dirs, delete_files};
pub use hash::{rehash, verify_hashes};
pub use list::{list_dir, EntryInfo};
pub use read::read_files;
pub use relocate::{move_dirs, move_files};
pub use rename::{rename_dirs, rename_files};
pub use stat::{stat_paths, PathStat};
pub use tree::create_dirs_tree;
pub use write::write_files;

use crate::error::{Error, Result};
use crate::path::{clean_path, split_parent};

/// Cleans every path in the batch up front.
pub(crate) fn clean_all(paths: &[String]) -> Result<Vec<String>> {
    paths.iter().map(|p| clean_path(p)).collect()
}

/// Splits a cleaned path into parent path and local name, rejecting the
/// root.
pub(crate) fn parent_and_name(cleaned: &str) -> Result<(String, String)> {
    if cleaned.is_empty() {
        return Err(Error::EmptyPath);
    }
    Ok(split_parent(cleaned))
}

/// Paths of one batch bucketed by their immediate parent directory.
///
/// Buckets preserve first-appearance parent order; entries keep their
/// original batch index so parallel argument arrays stay aligned.
pub(crate) struct ParentBucket {
    pub parent_path: String,
    pub entries: Vec<(usize, String)>,
}

pub(crate) fn bucket_by_parent(cleaned: &[String]) -> Result<Vec<ParentBucket>> {
    let mut buckets: Vec<ParentBucket> = Vec::new();
    for (index, path) in cleaned.iter().enumerate() {
        let (parent_path, name) = parent_and_name(path)?;
        match buckets.iter_mut().find(|b| b.parent_path == parent_path) {
            Some(bucket) => bucket.entries.push((index, name)),
            None => buckets.push(ParentBucket {
                parent_path,
                entries: vec![(index, name)],
            }),
        }
    }
    Ok(buckets)
}
