//! Path status queries.

use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path::{clean_path, split_parent};

/// Status of one queried path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStat {
    pub path: String,
    pub exists: bool,
    pub name: String,
    pub is_file: bool,
    pub last_editor: String,
}

/// Stats each input path. The empty path denotes the root and always
/// exists as a directory.
pub async fn stat_paths(drive: &Drive, paths: &[String]) -> Result<Vec<PathStat>> {
    let mut stats = Vec::with_capacity(paths.len());
    for path in paths {
        stats.push(stat_one(drive, path).await?);
    }
    Ok(stats)
}

async fn stat_one(drive: &Drive, path: &str) -> Result<PathStat> {
    let cleaned = clean_path(path)?;
    if cleaned.is_empty() {
        let root = drive.root();
        return Ok(PathStat {
            path: path.to_owned(),
            exists: true,
            name: String::new(),
            is_file: false,
            last_editor: root.last_editor().await,
        });
    }

    let (_, name) = split_parent(&cleaned);
    match drive.dir_by_path(&cleaned).await {
        Ok(dir) => {
            return Ok(PathStat {
                path: path.to_owned(),
                exists: true,
                name,
                is_file: false,
                last_editor: dir.last_editor().await,
            })
        }
        Err(Error::PathNotFound(_)) => {}
        Err(err) => return Err(err),
    }
    match drive.file_by_path(&cleaned).await {
        Ok(file) => Ok(PathStat {
            path: path.to_owned(),
            exists: true,
            name,
            is_file: true,
            last_editor: file.last_editor().await,
        }),
        Err(Error::PathNotFound(_)) => Ok(PathStat {
            path: path.to_owned(),
            exists: false,
            name,
            is_file: false,
            last_editor: String::new(),
        }),
        Err(err) => Err(err),
    }
}
