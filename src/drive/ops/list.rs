//! Directory listing.

use crate::drive::Drive;
use crate::error::Result;

/// One child entry of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_file: bool,
    pub last_editor: String,
}

/// Lists the children of the directory at `path`, sorted
/// case-insensitively with a case-sensitive tiebreak.
pub async fn list_dir(drive: &Drive, path: &str) -> Result<Vec<EntryInfo>> {
    let dir = drive.dir_by_path(path).await?;
    let guard = dir.read().await;

    let mut entries = Vec::with_capacity(guard.dir_count() + guard.file_count());
    for (name, child) in guard.dirs() {
        entries.push(EntryInfo {
            name: name.clone(),
            is_file: false,
            last_editor: child.last_editor().await,
        });
    }
    for (name, child) in guard.files() {
        entries.push(EntryInfo {
            name: name.clone(),
            is_file: true,
            last_editor: child.last_editor().await,
        });
    }
    drop(guard);

    entries.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::access::AccessSettings;
    use crate::drive::node::Directory;
    use crate::drive::ops::{create_dirs, create_files};
    use crate::error::Error;

    fn drive_at(dir: &TempDir) -> Drive {
        let settings = AccessSettings::new(1, 1).unwrap();
        Drive::new("main", dir.path(), Directory::new_root(settings, "lily"))
    }

    #[tokio::test]
    async fn test_list_sorted_case_insensitive() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_dirs(
            &drive,
            &["b".to_string(), "A".to_string()],
            None,
            true,
            "lily",
            false,
        )
        .await
        .unwrap();
        create_files(&drive, &["aa.txt".to_string()], None, true, "lily", false)
            .await
            .unwrap();

        let entries = list_dir(&drive, "").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "aa.txt", "b"]);
        assert!(entries[1].is_file);
        assert_eq!(entries[0].last_editor, "lily");
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let result = list_dir(&drive, "ghost").await;
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }
}
