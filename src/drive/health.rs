//! Drive health reconciliation.
//!
//! The in-memory tree is authoritative; this pass walks it and logs a
//! warning for every node whose host counterpart is missing or of the
//! wrong type. It never corrects anything.

use std::sync::Arc;

use tokio::fs;
use tracing::warn;

use crate::drive::node::Directory;
use crate::drive::Drive;
use crate::error::Result;
use crate::path;

/// Walks the tree and logs host divergences. Returns the discrepancy
/// count.
pub async fn reconcile(drive: &Drive) -> Result<usize> {
    let drive_name = drive.name().await;
    let mut discrepancies = 0usize;
    let mut stack: Vec<(Arc<Directory>, String)> =
        vec![(Arc::clone(drive.root()), String::new())];

    while let Some((dir, rel)) = stack.pop() {
        let host = drive.host_path_of(&rel).await;
        match fs::metadata(&host).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                warn!(drive = %drive_name, path = %rel, "host entry is not a directory");
                discrepancies += 1;
                continue;
            }
            Err(_) => {
                warn!(drive = %drive_name, path = %rel, "directory missing on host");
                discrepancies += 1;
                continue;
            }
        }

        let (subdirs, file_names) = {
            let guard = dir.read().await;
            let subdirs: Vec<(String, Arc<Directory>)> = guard
                .dirs()
                .map(|(name, child)| (name.clone(), Arc::clone(child)))
                .collect();
            let file_names: Vec<String> =
                guard.files().map(|(name, _)| name.clone()).collect();
            (subdirs, file_names)
        };

        for name in file_names {
            let file_rel = path::join(&rel, &name);
            let file_host = drive.host_path_of(&file_rel).await;
            match fs::metadata(&file_host).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    warn!(drive = %drive_name, path = %file_rel, "host entry is not a file");
                    discrepancies += 1;
                }
                Err(_) => {
                    warn!(drive = %drive_name, path = %file_rel, "file missing on host");
                    discrepancies += 1;
                }
            }
        }
        for (name, child) in subdirs {
            stack.push((child, path::join(&rel, &name)));
        }
    }
    Ok(discrepancies)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::access::AccessSettings;
    use crate::drive::ops::{create_dirs, create_files};

    fn drive_at(dir: &TempDir) -> Drive {
        let settings = AccessSettings::new(1, 1).unwrap();
        Drive::new("main", dir.path(), Directory::new_root(settings, "lily"))
    }

    #[tokio::test]
    async fn test_healthy_tree_reports_nothing() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_dirs(&drive, &["a".to_string()], None, true, "lily", false).await.unwrap();
        create_files(&drive, &["a/f.txt".to_string()], None, true, "lily", false)
            .await
            .unwrap();
        assert_eq!(reconcile(&drive).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_host_entries_counted() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_dirs(&drive, &["a".to_string()], None, true, "lily", false).await.unwrap();
        create_files(&drive, &["f.txt".to_string()], None, true, "lily", false)
            .await
            .unwrap();

        std::fs::remove_dir(host.path().join("a")).unwrap();
        std::fs::remove_file(host.path().join("f.txt")).unwrap();
        assert_eq!(reconcile(&drive).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_counted() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_files(&drive, &["x".to_string()], None, true, "lily", false)
            .await
            .unwrap();
        std::fs::remove_file(host.path().join("x")).unwrap();
        std::fs::create_dir(host.path().join("x")).unwrap();
        assert_eq!(reconcile(&drive).await.unwrap(), 1);
    }
}
