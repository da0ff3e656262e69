//! Streaming file reads.
//!
//! Ranges are validated and announced for every file before any bytes
//! flow: the operation first takes every file's read lock, stats the host
//! sizes and emits the chunk-info header in input order, then streams each
//! file's chunks, releasing its lock once its last chunk is out.

use std::io::SeekFrom;
use std::path::PathBuf;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path::clean_path;
use crate::wire::chunk::{ChunkHandler, ChunkInfo};

struct ReadPlan {
    name: String,
    host: PathBuf,
    start: u64,
    end: u64,
    num_chunks: u16,
}

/// Streams byte ranges of the given files through the chunk writer.
///
/// `end = -1` means end-of-file. Chunks are at most `chunk_size` bytes.
/// When a chunk buffer cannot be allocated, every still-outstanding chunk
/// slot is padded with a zero-length chunk before the operation fails, so
/// the announced counts stay honest.
pub async fn read_files(
    drive: &Drive,
    paths: &[String],
    starts: &[i64],
    ends: &[i64],
    chunk_size: u64,
    chunks: &mut ChunkHandler<'_>,
) -> Result<()> {
    if paths.len() != starts.len() || paths.len() != ends.len() {
        return Err(Error::InvalidStartEnd);
    }
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize);
    }

    let mut plans = Vec::with_capacity(paths.len());
    let mut guards = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let file = drive.file_by_path(path).await?;
        guards.push(Some(file.read_owned().await));

        let host = drive.host_path_of(&clean_path(path)?).await;
        let size = fs::metadata(&host).await?.len();
        let start = starts[index];
        if start < 0 || (start as u64) >= size {
            return Err(Error::InvalidStartEnd);
        }
        let start = start as u64;
        let end = match ends[index] {
            -1 => size,
            end if end > 0 && (end as u64) <= size && start <= end as u64 => end as u64,
            _ => return Err(Error::InvalidStartEnd),
        };
        let num_chunks = u16::try_from((end - start).div_ceil(chunk_size))
            .map_err(|_| Error::InvalidChunkSize)?;
        plans.push(ReadPlan { name: path.clone(), host, start, end, num_chunks });
    }

    let header: Vec<ChunkInfo> = plans
        .iter()
        .map(|plan| ChunkInfo::new(plan.name.clone(), plan.num_chunks))
        .collect();
    chunks.write_header(&header).await?;

    for index in 0..plans.len() {
        let plan = &plans[index];
        let mut host_file = fs::File::open(&plan.host).await?;
        host_file.seek(SeekFrom::Start(plan.start)).await?;

        let mut position = plan.start;
        let mut emitted: u16 = 0;
        while position < plan.end {
            let len = (plan.end - position).min(chunk_size) as usize;
            let mut buffer = Vec::new();
            if buffer.try_reserve_exact(len).is_err() {
                pad_outstanding(chunks, plan, emitted, &plans[index + 1..]).await?;
                return Err(Error::InsufficientMemory);
            }
            buffer.resize(len, 0);
            host_file.read_exact(&mut buffer).await?;
            chunks.write_chunk(&plan.name, &buffer).await?;
            position += len as u64;
            emitted += 1;
        }
        // this file's chunks are out; release its lock
        guards[index] = None;
    }
    Ok(())
}

/// Pads every announced-but-unsent chunk slot with a zero-length chunk.
async fn pad_outstanding(
    chunks: &mut ChunkHandler<'_>,
    current: &ReadPlan,
    emitted: u16,
    remaining: &[ReadPlan],
) -> Result<()> {
    for _ in emitted..current.num_chunks {
        chunks.write_chunk(&current.name, &[]).await?;
    }
    for plan in remaining {
        for _ in 0..plan.num_chunks {
            chunks.write_chunk(&plan.name, &[]).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::access::AccessSettings;
    use crate::drive::node::Directory;
    use crate::drive::ops::create_files;
    use crate::wire::stream::MemoryStream;

    fn drive_at(dir: &TempDir) -> Drive {
        let settings = AccessSettings::new(1, 1).unwrap();
        Drive::new("main", dir.path(), Directory::new_root(settings, "lily"))
    }

    async fn collect(
        drive: &Drive,
        paths: &[String],
        starts: &[i64],
        ends: &[i64],
        chunk_size: u64,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = MemoryStream::default();
        {
            let mut handler = ChunkHandler::new(&mut out);
            read_files(drive, paths, starts, ends, chunk_size, &mut handler).await?;
        }
        let mut input = MemoryStream::new(out.into_output());
        let mut reader = ChunkHandler::new(&mut input);
        let header = reader.read_header().await?;
        let mut collected = Vec::new();
        for info in &header {
            for _ in 0..info.num_chunks {
                let data = reader.read_chunk(&info.name).await?;
                collected.push((info.name.clone(), data));
            }
        }
        Ok(collected)
    }

    #[tokio::test]
    async fn test_read_whole_file_in_two_chunks() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_files(&drive, &["foo".to_string()], None, true, "lily", false)
            .await
            .unwrap();
        std::fs::write(host.path().join("foo"), b"hello world").unwrap();

        let chunks = collect(&drive, &["foo".to_string()], &[0], &[-1], 6).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].1, b"hello ");
        assert_eq!(chunks[1].1, b"world");
    }

    #[tokio::test]
    async fn test_read_partial_range() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_files(&drive, &["foo".to_string()], None, true, "lily", false)
            .await
            .unwrap();
        std::fs::write(host.path().join("foo"), b"0123456789").unwrap();

        let chunks = collect(&drive, &["foo".to_string()], &[2], &[6], 16).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1, b"2345");
    }

    #[tokio::test]
    async fn test_read_invalid_ranges() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        create_files(&drive, &["foo".to_string()], None, true, "lily", false)
            .await
            .unwrap();
        std::fs::write(host.path().join("foo"), b"abc").unwrap();

        for (start, end) in [(-1, -1), (3, -1), (0, 4), (2, 1)] {
            let result =
                collect(&drive, &["foo".to_string()], &[start], &[end], 4).await;
            assert!(
                matches!(result, Err(Error::InvalidStartEnd)),
                "start={start} end={end}"
            );
        }
    }

    #[tokio::test]
    async fn test_read_length_mismatch() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let result = collect(&drive, &["foo".to_string()], &[0, 0], &[-1], 4).await;
        assert!(matches!(result, Err(Error::InvalidStartEnd)));
    }

    #[tokio::test]
    async fn test_read_zero_chunk_size() {
        let host = TempDir::new().unwrap();
        let drive = drive_at(&host);
        let result = collect(&drive, &["foo".to_string()], &[0], &[-1], 0).await;
        assert!(matches!(result, Err(Error::InvalidChunkSize)));
    }
}
