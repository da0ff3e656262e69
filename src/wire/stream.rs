//! Byte stream abstraction used by the connection and chunk layers.
//!
//! Commands stream chunk data over whatever carries the connection: the
//! live TLS stream in production, a fixed in-memory buffer in tests. Both
//! are modeled as a [`DataStream`]; the TLS flavor applies a deadline to
//! every operation and surfaces [`Error::TimedOut`] when it elapses.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// A bidirectional byte stream with exact-read semantics.
#[async_trait]
pub trait DataStream: Send + Sync {
    /// Fills `buf` completely or fails.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Writes all of `buf` or fails.
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Flushes buffered bytes to the underlying transport.
    async fn flush(&mut self) -> Result<()>;
}

/// A [`DataStream`] over an async transport with a per-operation deadline.
pub struct TimedStream<S> {
    inner: S,
    deadline: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send + Sync> TimedStream<S> {
    /// Wraps `inner`, applying `deadline` to every read and write.
    pub fn new(inner: S, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    /// Replaces the per-operation deadline.
    pub fn set_deadline(&mut self, deadline: Duration) {
        self.deadline = deadline;
    }

    /// Returns the wrapped transport.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send + Sync> DataStream for TimedStream<S> {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(self.deadline, self.inner.read_exact(buf)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(Error::TimedOut),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match timeout(self.deadline, self.inner.write_all(buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::TimedOut),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match timeout(self.deadline, self.inner.flush()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::TimedOut),
        }
    }
}

/// A fixed in-memory [`DataStream`].
///
/// Reads consume the buffer the stream was constructed over; writes append
/// to a separate output buffer that can be inspected afterwards.
#[derive(Default)]
pub struct MemoryStream {
    input: io::Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl MemoryStream {
    /// Creates a stream whose reads consume `input`.
    pub fn new(input: Vec<u8>) -> Self {
        Self { input: io::Cursor::new(input), output: Vec::new() }
    }

    /// Bytes written into the stream so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Consumes the stream, returning the written bytes.
    pub fn into_output(self) -> Vec<u8> {
        self.output
    }
}

#[async_trait]
impl DataStream for MemoryStream {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        Ok(std::io::Read::read_exact(&mut self.input, buf)?)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.output.extend_from_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
