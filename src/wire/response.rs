//! Response envelope construction and parsing.
//!
//! A response leads with the `LILY` magic and the protocol version byte,
//! then the chunk envelope (so a streaming command can emit chunks before
//! the final status is known), then the status block: a 2-byte block
//! length, the 4-byte code, the status string, the BSON data map and the
//! `END` footer.

use std::io::{Cursor, Read, Write};

use bson::Document;
use num_traits::FromPrimitive;

use crate::error::{Error, Result, ResponseCode};
use crate::wire::primitive::{
    parse_array, parse_bytes, parse_footer, parse_string, parse_u16, parse_u32, parse_u8,
    write_footer, write_string, write_u16, write_u32,
};
use crate::wire::{MAGIC, PROTOCOL_VERSION};

/// The terminal status of a response.
#[derive(Debug, Clone)]
pub struct Status {
    pub code: u32,
    pub message: String,
    pub data: Document,
}

impl Status {
    /// A success status with an empty message.
    pub fn ok(data: Document) -> Self {
        Self { code: ResponseCode::Success as u32, message: String::new(), data }
    }

    /// A failure status derived from an error.
    ///
    /// The human-readable description travels in the status string and is
    /// mirrored under the `error` key of the data map.
    pub fn from_error(err: &Error) -> Self {
        let message = err.to_string();
        let mut data = Document::new();
        data.insert("error", message.clone());
        Self { code: err.code() as u32, message, data }
    }

    /// Decodes the stable response code, if the integer is known.
    pub fn response_code(&self) -> Option<ResponseCode> {
        ResponseCode::from_u32(self.code)
    }
}

/// Writes the response preamble (magic + version byte).
pub fn write_preamble(dest: &mut impl Write) -> Result<()> {
    dest.write_all(MAGIC)?;
    dest.write_all(&[PROTOCOL_VERSION])?;
    Ok(())
}

/// Parses and validates the response preamble.
pub fn parse_preamble(src: &mut impl Read) -> Result<u8> {
    let magic = parse_array::<4>(src)?;
    if &magic != MAGIC {
        return Err(Error::InvalidProtocol);
    }
    parse_u8(src)
}

/// Writes the status block (length prefix + code + message + data + END).
pub fn write_status(dest: &mut impl Write, status: &Status) -> Result<()> {
    let mut block = Vec::new();
    write_u32(&mut block, status.code)?;
    write_string(&mut block, &status.message)?;
    let mut raw_data = Vec::new();
    status
        .data
        .to_writer(&mut raw_data)
        .map_err(|e| Error::InvalidArgumentMap(e.to_string()))?;
    let data_len = u16::try_from(raw_data.len()).map_err(|_| Error::InvalidSliceLength)?;
    write_u16(&mut block, data_len)?;
    block.extend_from_slice(&raw_data);
    write_footer(&mut block)?;

    let block_len = u16::try_from(block.len()).map_err(|_| Error::InvalidSliceLength)?;
    write_u16(dest, block_len)?;
    dest.write_all(&block)?;
    Ok(())
}

/// Parses the status block.
pub fn parse_status(src: &mut impl Read) -> Result<Status> {
    let block_len = parse_u16(src)? as usize;
    let mut block = vec![0u8; block_len];
    src.read_exact(&mut block)?;
    let mut cursor = Cursor::new(block);
    let code = parse_u32(&mut cursor)?;
    let message = parse_string(&mut cursor)?;
    let raw_data = parse_bytes(&mut cursor)?;
    let data = Document::from_reader(&mut Cursor::new(raw_data))
        .map_err(|e| Error::InvalidArgumentMap(e.to_string()))?;
    parse_footer(&mut cursor)?;
    Ok(Status { code, message, data })
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn test_preamble() {
        let mut buf = Vec::new();
        write_preamble(&mut buf).unwrap();
        assert_eq!(&buf, b"LILY0");
        assert_eq!(parse_preamble(&mut Cursor::new(buf)).unwrap(), b'0');
    }

    #[test]
    fn test_status_round_trip_ok() {
        let status = Status::ok(doc! { "id": 42 });
        let mut buf = Vec::new();
        write_status(&mut buf, &status).unwrap();
        let parsed = parse_status(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed.code, 0);
        assert_eq!(parsed.message, "");
        assert_eq!(parsed.data, doc! { "id": 42 });
        assert_eq!(parsed.response_code(), Some(ResponseCode::Success));
    }

    #[test]
    fn test_status_round_trip_error() {
        let status = Status::from_error(&Error::DriveNotFound("music".to_string()));
        let mut buf = Vec::new();
        write_status(&mut buf, &status).unwrap();
        let parsed = parse_status(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed.code, 13);
        assert!(parsed.message.contains("music"));
        assert!(parsed.data.get_str("error").is_ok());
    }

    #[test]
    fn test_status_block_length_covers_footer() {
        let status = Status::ok(doc! {});
        let mut buf = Vec::new();
        write_status(&mut buf, &status).unwrap();
        let block_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        assert_eq!(block_len, buf.len() - 2);
        assert_eq!(&buf[buf.len() - 3..], b"END");
    }
}
