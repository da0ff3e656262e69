//! Drive file (de)serialization.
//!
//! A drive file holds the drive name, the host path and a recursive
//! serialization of the root directory: scalars, access settings, child
//! counts, then children in name order. File entries carry an additional
//! 32-byte hash slot and the encrypted bit. Timestamps round to seconds.

use std::future::Future;
use std::io::{Cursor, Read, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::access::AccessSettings;
use crate::drive::node::{Directory, File, HASH_LEN};
use crate::drive::Drive;
use crate::error::Result;
use crate::wire::primitive::{
    parse_array, parse_bool, parse_string, parse_u16, parse_u32, parse_u64, write_bool,
    write_string, write_u16, write_u32, write_u64,
};

/// Marshalled form of a directory sub-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub name: String,
    pub last_editor: String,
    pub last_edit_secs: u64,
    pub settings: AccessSettings,
    pub dirs: Vec<DirRecord>,
    pub files: Vec<FileRecord>,
}

/// Marshalled form of a file node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub last_editor: String,
    pub last_edit_secs: u64,
    pub settings: AccessSettings,
    pub hash: [u8; HASH_LEN],
    pub encrypted: bool,
}

fn secs_since_epoch(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Captures a consistent snapshot of the tree under `dir`.
pub fn snapshot_directory<'a>(
    dir: &'a Arc<Directory>,
) -> Pin<Box<dyn Future<Output = Result<DirRecord>> + Send + 'a>> {
    Box::pin(async move {
        let guard = dir.read().await;
        let name = guard.name().to_owned();
        let last_editor = guard.last_editor().to_owned();
        let last_edit_secs = secs_since_epoch(guard.last_edit());
        let settings = guard.settings().clone();

        let mut files = Vec::with_capacity(guard.file_count());
        for (_, file) in guard.files() {
            let inner = file.read().await;
            files.push(FileRecord {
                name: inner.name().to_owned(),
                last_editor: inner.last_editor().to_owned(),
                last_edit_secs: secs_since_epoch(inner.last_edit()),
                settings: inner.settings().clone(),
                hash: *inner.hash(),
                encrypted: inner.encrypted(),
            });
        }
        let subdirs: Vec<Arc<Directory>> =
            guard.dirs().map(|(_, d)| Arc::clone(d)).collect();
        drop(guard);

        let mut dirs = Vec::with_capacity(subdirs.len());
        for subdir in &subdirs {
            dirs.push(snapshot_directory(subdir).await?);
        }
        Ok(DirRecord { name, last_editor, last_edit_secs, settings, dirs, files })
    })
}

/// Serializes the access settings block.
pub fn write_settings(dest: &mut impl Write, settings: &AccessSettings) -> Result<()> {
    write_u32(dest, settings.access_clearance() as u32)?;
    write_u32(dest, settings.modify_clearance() as u32)?;
    for list in [
        settings.access_whitelist().collect::<Vec<_>>(),
        settings.access_blacklist().collect::<Vec<_>>(),
        settings.modify_whitelist().collect::<Vec<_>>(),
        settings.modify_blacklist().collect::<Vec<_>>(),
    ] {
        write_u16(dest, list.len() as u16)?;
        for user in list {
            write_string(dest, user)?;
        }
    }
    Ok(())
}

/// Parses the access settings block.
pub fn parse_settings(src: &mut impl Read) -> Result<AccessSettings> {
    let access = parse_u32(src)? as u8;
    let modify = parse_u32(src)? as u8;
    let mut settings = AccessSettings::new(access, modify)?;
    let mut lists: [Vec<String>; 4] = Default::default();
    for list in &mut lists {
        let count = parse_u16(src)? as usize;
        for _ in 0..count {
            list.push(parse_string(src)?);
        }
    }
    let [access_wl, access_bl, modify_wl, modify_bl] = lists;
    settings.add_users_access_whitelist(&access_wl);
    settings.add_users_access_blacklist(&access_bl);
    settings.add_users_modify_whitelist(&modify_wl);
    settings.add_users_modify_blacklist(&modify_bl);
    Ok(settings)
}

/// Serializes a directory record tree.
pub fn write_dir_record(dest: &mut impl Write, record: &DirRecord) -> Result<()> {
    write_string(dest, &record.name)?;
    write_string(dest, &record.last_editor)?;
    write_u64(dest, record.last_edit_secs)?;
    write_settings(dest, &record.settings)?;
    write_u16(dest, record.dirs.len() as u16)?;
    write_u16(dest, record.files.len() as u16)?;
    for dir in &record.dirs {
        write_dir_record(dest, dir)?;
    }
    for file in &record.files {
        write_string(dest, &file.name)?;
        write_string(dest, &file.last_editor)?;
        write_u64(dest, file.last_edit_secs)?;
        write_settings(dest, &file.settings)?;
        dest.write_all(&file.hash)?;
        write_bool(dest, file.encrypted)?;
    }
    Ok(())
}

/// Parses a directory record tree.
pub fn parse_dir_record(src: &mut impl Read) -> Result<DirRecord> {
    let name = parse_string(src)?;
    let last_editor = parse_string(src)?;
    let last_edit_secs = parse_u64(src)?;
    let settings = parse_settings(src)?;
    let dir_count = parse_u16(src)? as usize;
    let file_count = parse_u16(src)? as usize;

    let mut dirs = Vec::with_capacity(dir_count);
    for _ in 0..dir_count {
        dirs.push(parse_dir_record(src)?);
    }
    let mut files = Vec::with_capacity(file_count);
    for _ in 0..file_count {
        files.push(FileRecord {
            name: parse_string(src)?,
            last_editor: parse_string(src)?,
            last_edit_secs: parse_u64(src)?,
            settings: parse_settings(src)?,
            hash: parse_array::<HASH_LEN>(src)?,
            encrypted: parse_bool(src)?,
        });
    }
    Ok(DirRecord { name, last_editor, last_edit_secs, settings, dirs, files })
}

/// Materializes a record tree as the root directory of a drive.
pub async fn build_root(record: DirRecord) -> Result<Arc<Directory>> {
    let root = Directory::new_root(record.settings.clone(), &record.last_editor);
    {
        let mut guard = root.write().await;
        guard.set_last_edit(UNIX_EPOCH + Duration::from_secs(record.last_edit_secs));
    }
    attach_children(&root, record).await?;
    Ok(root)
}

fn attach_children(
    parent: &Arc<Directory>,
    record: DirRecord,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
    Box::pin(async move {
        for file_record in record.files {
            let file =
                File::new(&file_record.name, file_record.settings.clone(), &file_record.last_editor)?;
            {
                let mut inner = file.write().await;
                inner.set_hash(file_record.hash);
                inner.set_encrypted(file_record.encrypted);
                inner.set_last_edit(UNIX_EPOCH + Duration::from_secs(file_record.last_edit_secs));
            }
            parent.write().await.insert_file(file_record.name.clone(), file);
        }
        for dir_record in record.dirs {
            let dir = Directory::new(
                &dir_record.name,
                dir_record.settings.clone(),
                parent,
                &dir_record.last_editor,
            )?;
            {
                let mut inner = dir.write().await;
                inner.set_last_edit(UNIX_EPOCH + Duration::from_secs(dir_record.last_edit_secs));
            }
            parent.write().await.insert_dir(dir_record.name.clone(), Arc::clone(&dir));
            attach_children(&dir, dir_record).await?;
        }
        Ok(())
    })
}

/// Serializes a whole drive (name, host path, tree) into a buffer.
pub async fn marshal_drive(drive: &Drive) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_string(&mut buf, &drive.name().await)?;
    write_string(&mut buf, &drive.host_path().await.to_string_lossy())?;
    let record = snapshot_directory(drive.root()).await?;
    write_dir_record(&mut buf, &record)?;
    Ok(buf)
}

/// Rebuilds a drive from its file contents.
pub async fn unmarshal_drive(bytes: &[u8]) -> Result<Drive> {
    let mut src = Cursor::new(bytes);
    let name = parse_string(&mut src)?;
    let host_path = parse_string(&mut src)?;
    let record = parse_dir_record(&mut src)?;
    let root = build_root(record).await?;
    Ok(Drive::new(name, host_path, root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn settings() -> AccessSettings {
        AccessSettings::new(1, 2).unwrap()
    }

    #[test]
    fn test_settings_round_trip() {
        let mut s = AccessSettings::new(2, 4).unwrap();
        s.add_users_access_whitelist(&["lily".to_string(), "ada".to_string()]);
        s.add_users_modify_blacklist(&["mallory".to_string()]);
        let mut buf = Vec::new();
        write_settings(&mut buf, &s).unwrap();
        let parsed = parse_settings(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn test_settings_invalid_pair_rejected() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 4).unwrap();
        write_u32(&mut buf, 2).unwrap();
        let result = parse_settings(&mut Cursor::new(buf));
        assert!(matches!(result, Err(Error::InvalidClearancePair)));
    }

    #[tokio::test]
    async fn test_tree_round_trip() {
        let record = DirRecord {
            name: String::new(),
            last_editor: "lily".to_string(),
            last_edit_secs: 1_700_000_000,
            settings: settings(),
            dirs: vec![DirRecord {
                name: "docs".to_string(),
                last_editor: "ada".to_string(),
                last_edit_secs: 1_700_000_100,
                settings: AccessSettings::new(2, 3).unwrap(),
                dirs: vec![],
                files: vec![FileRecord {
                    name: "readme.md".to_string(),
                    last_editor: "ada".to_string(),
                    last_edit_secs: 1_700_000_200,
                    settings: settings(),
                    hash: [7u8; HASH_LEN],
                    encrypted: true,
                }],
            }],
            files: vec![FileRecord {
                name: "top.bin".to_string(),
                last_editor: "lily".to_string(),
                last_edit_secs: 1_700_000_300,
                settings: settings(),
                hash: [0u8; HASH_LEN],
                encrypted: false,
            }],
        };

        let mut buf = Vec::new();
        write_dir_record(&mut buf, &record).unwrap();
        let parsed = parse_dir_record(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, record);

        // materialize, snapshot again, compare
        let root = build_root(parsed).await.unwrap();
        let snapshot = snapshot_directory(&root).await.unwrap();
        assert_eq!(snapshot, record);
    }

    #[tokio::test]
    async fn test_drive_round_trip() {
        let drive = Drive::new(
            "main",
            "/srv/lily/main",
            Directory::new_root(settings(), "lily"),
        );
        let bytes = marshal_drive(&drive).await.unwrap();
        let restored = unmarshal_drive(&bytes).await.unwrap();
        assert_eq!(restored.name().await, "main");
        assert_eq!(
            restored.host_path().await,
            std::path::PathBuf::from("/srv/lily/main")
        );
    }
}
