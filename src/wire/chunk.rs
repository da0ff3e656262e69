//! The chunk stream sub-protocol.
//!
//! A *chunk stream* is a named finite sequence of byte chunks; one message
//! carries zero or more of them in a single envelope. The envelope opens
//! with a header declaring every stream's name and chunk count, terminated
//! by an `END` footer; the chunks then follow in declared order, each
//! framed as name + 8-byte length + bytes + `END`.
//!
//! [`ChunkHandler`] wraps the live stream for one request/response cycle
//! and records whether the command consumed or emitted the envelope, so
//! the connection layer can drain or emit an empty one to preserve
//! framing.

use crate::error::{Error, Result};
use crate::wire::stream::DataStream;
use crate::wire::FOOTER;

/// Hard ceiling on a single chunk's announced length.
pub const MAX_CHUNK_LEN: u64 = 1 << 30;

/// One stream declaration in the envelope header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub name: String,
    pub num_chunks: u16,
}

impl ChunkInfo {
    pub fn new(name: impl Into<String>, num_chunks: u16) -> Self {
        Self { name: name.into(), num_chunks }
    }
}

/// Chunk envelope reader/writer bound to one connection.
pub struct ChunkHandler<'a> {
    stream: &'a mut dyn DataStream,
    wrote_header: bool,
    read_header: bool,
}

impl<'a> ChunkHandler<'a> {
    pub fn new(stream: &'a mut dyn DataStream) -> Self {
        Self { stream, wrote_header: false, read_header: false }
    }

    /// Whether the envelope header has been emitted on this connection.
    pub fn did_write(&self) -> bool {
        self.wrote_header
    }

    /// Whether the envelope header has been consumed on this connection.
    pub fn did_read(&self) -> bool {
        self.read_header
    }

    /// Emits the envelope header declaring `streams`.
    pub async fn write_header(&mut self, streams: &[ChunkInfo]) -> Result<()> {
        let count = u16::try_from(streams.len()).map_err(|_| Error::InvalidSliceLength)?;
        let mut buf = Vec::with_capacity(8 + streams.len() * 16);
        buf.extend_from_slice(&count.to_le_bytes());
        for info in streams {
            let name_len =
                u16::try_from(info.name.len()).map_err(|_| Error::InvalidSliceLength)?;
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(info.name.as_bytes());
            buf.extend_from_slice(&info.num_chunks.to_le_bytes());
        }
        buf.extend_from_slice(FOOTER);
        self.stream.write_all(&buf).await?;
        self.wrote_header = true;
        Ok(())
    }

    /// Emits an empty envelope (zero streams).
    pub async fn write_empty(&mut self) -> Result<()> {
        self.write_header(&[]).await
    }

    /// Emits one chunk of `name`'s stream.
    pub async fn write_chunk(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let name_len = u16::try_from(name.len()).map_err(|_| Error::InvalidSliceLength)?;
        let mut head = Vec::with_capacity(name.len() + 10);
        head.extend_from_slice(&name_len.to_le_bytes());
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(&(data.len() as u64).to_le_bytes());
        self.stream.write_all(&head).await?;
        self.stream.write_all(data).await?;
        self.stream.write_all(FOOTER).await?;
        Ok(())
    }

    /// Consumes the envelope header, returning the declared streams.
    pub async fn read_header(&mut self) -> Result<Vec<ChunkInfo>> {
        let count = self.read_u16().await? as usize;
        let mut streams = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = self.read_name().await?;
            let num_chunks = self.read_u16().await?;
            streams.push(ChunkInfo { name, num_chunks });
        }
        self.read_footer().await?;
        self.read_header = true;
        Ok(streams)
    }

    /// Consumes one chunk, checking its name tag against the stream being
    /// received.
    pub async fn read_chunk(&mut self, expected_name: &str) -> Result<Vec<u8>> {
        let name = self.read_name().await?;
        if name != expected_name {
            return Err(Error::InvalidChunks);
        }
        let len = self.read_u64().await?;
        if len > MAX_CHUNK_LEN {
            return Err(Error::InvalidSliceLength);
        }
        let mut data = Vec::new();
        if data.try_reserve_exact(len as usize).is_err() {
            return Err(Error::InsufficientMemory);
        }
        data.resize(len as usize, 0);
        self.stream.read_exact(&mut data).await?;
        self.read_footer().await?;
        Ok(data)
    }

    /// Reads and discards every chunk announced by `streams`.
    pub async fn drain(&mut self, streams: &[ChunkInfo]) -> Result<()> {
        for info in streams {
            for _ in 0..info.num_chunks {
                self.read_chunk(&info.name).await?;
            }
        }
        Ok(())
    }

    /// Consumes the whole envelope (header plus chunks) and discards it.
    pub async fn drain_all(&mut self) -> Result<()> {
        let streams = self.read_header().await?;
        self.drain(&streams).await
    }

    async fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.stream.read_exact(&mut buf).await?;
        Ok(u16::from_le_bytes(buf))
    }

    async fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.stream.read_exact(&mut buf).await?;
        Ok(u64::from_le_bytes(buf))
    }

    async fn read_name(&mut self) -> Result<String> {
        let len = self.read_u16().await? as usize;
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(String::from_utf8(buf)?)
    }

    async fn read_footer(&mut self) -> Result<()> {
        let mut buf = [0u8; 3];
        self.stream.read_exact(&mut buf).await?;
        if &buf != FOOTER {
            return Err(Error::InvalidFooter);
        }
        Ok(())
    }
}
