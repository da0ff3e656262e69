//! Content hashing: recompute and verify stored SHA-256 hashes.

use std::collections::BTreeMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::drive::node::HASH_LEN;
use crate::drive::Drive;
use crate::error::Result;
use crate::path::clean_path;

const HASH_READ_BUF: usize = 64 * 1024;

/// Recomputes each file's host content hash and stores it on the node.
/// Takes the file write lock for the duration of the I/O.
pub async fn rehash(drive: &Drive, paths: &[String], editor: &str) -> Result<()> {
    for path in paths {
        let file = drive.file_by_path(path).await?;
        let mut guard = file.write().await;
        let host = drive.host_path_of(&clean_path(path)?).await;
        let hash = hash_host_file(&host).await?;
        guard.set_hash(hash);
        guard.touch(editor);
        drive.set_dirty(true).await;
    }
    Ok(())
}

/// Computes each file's host content hash and compares it against the
/// stored one. Takes the file read lock for the duration of the I/O.
pub async fn verify_hashes(drive: &Drive, paths: &[String]) -> Result<BTreeMap<String, bool>> {
    let mut results = BTreeMap::new();
    for path in paths {
        let file = drive.file_by_path(path).await?;
        let guard = file.read().await;
        let host = drive.host_path_of(&clean_path(path)?).await;
        let hash = hash_host_file(&host).await?;
        results.insert(path.clone(), &hash == guard.hash());
    }
    Ok(results)
}

async fn hash_host_file(host: &Path) -> Result<[u8; HASH_LEN]> {
    let mut file = fs::File::open(host).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_READ_BUF];
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().into())
}
