//! The Lily wire protocol: framing constants, primitive codec, chunk
//! streams and the request/response envelopes.
//!
//! All integers on the wire are little-endian; all strings are UTF-8 with a
//! 2-byte length prefix. A request is a fixed 7-byte opening header, an
//! auth block, a command block, then a chunk envelope at the raw stream
//! level. A response leads with the magic and version, streams its chunk
//! envelope, and finishes with a status block.

pub mod chunk;
pub mod primitive;
pub mod request;
pub mod response;
pub mod stream;

/// Frame magic opening every request and response.
pub const MAGIC: &[u8; 4] = b"LILY";

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = b'0';

/// Footer terminating blocks and chunks.
pub const FOOTER: &[u8; 3] = b"END";
