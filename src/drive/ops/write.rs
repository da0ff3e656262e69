//! Streaming file writes.

use std::io::SeekFrom;

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path::clean_path;
use crate::wire::chunk::ChunkHandler;

/// Receives chunk streams from the client and writes them into the files.
///
/// The client's chunk-info header must correspond 1:1, in order, with the
/// file list. Each file's write lock is held while its chunks land;
/// `clears[i]` truncates the host file before writing.
pub async fn write_files(
    drive: &Drive,
    paths: &[String],
    starts: &[i64],
    clears: &[bool],
    editor: &str,
    chunks: &mut ChunkHandler<'_>,
) -> Result<()> {
    if paths.len() != starts.len() || paths.len() != clears.len() {
        return Err(Error::InvalidLength);
    }

    let infos = chunks.read_header().await?;
    if infos.len() != paths.len() {
        return Err(Error::InvalidChunks);
    }
    for (info, path) in infos.iter().zip(paths) {
        if &info.name != path {
            return Err(Error::InvalidChunks);
        }
    }

    for (index, path) in paths.iter().enumerate() {
        let file = drive.file_by_path(path).await?;
        let mut guard = file.write().await;

        let host = drive.host_path_of(&clean_path(path)?).await;
        let size = fs::metadata(&host).await?.len();
        let start = starts[index];
        if start < 0 || (start as u64) > size {
            return Err(Error::InvalidStartEnd);
        }

        let mut host_file = OpenOptions::new().write(true).open(&host).await?;
        if clears[index] {
            host_file.set_len(0).await?;
        }
        host_file.seek(SeekFrom::Start(start as u64)).await?;
        for _ in 0..infos[index].num_chunks {
            let data = chunks.read_chunk(path).await?;
            host_file.write_all(&data).await?;
        }
        host_file.flush().await?;

        guard.touch(editor);
        drive.set_dirty(true).await;
    }
    Ok(())
}
