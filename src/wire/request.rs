//! Request envelope parsing and construction.
//!
//! A request opens with a fixed 7-byte header (`LILY` magic, 2-byte body
//! length, 1-byte protocol version), followed by a body of exactly that
//! length holding the auth block and the command block, followed by the
//! chunk envelope at the raw stream level.

use std::io::{Cursor, Read, Write};

use bson::Document;

use crate::error::{Error, Result};
use crate::wire::primitive::{
    parse_array, parse_bytes, parse_footer, parse_string, parse_u16, parse_u8, write_footer,
    write_string, write_u16, write_u8,
};
use crate::wire::{MAGIC, PROTOCOL_VERSION};

/// Auth tag byte for user credentials.
pub const AUTH_USER: u8 = b'U';

/// Auth tag byte for a session token.
pub const AUTH_SESSION: u8 = b'S';

/// Auth tag byte for an unauthenticated request.
pub const AUTH_NULL: u8 = b'N';

/// Parsed fixed-size opening header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub body_length: u16,
    pub version: u8,
}

/// The authentication block of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequest {
    /// No credentials; only commands documenting null auth accept this.
    Null,
    /// Username and password.
    User { username: String, password: String },
    /// Username and a 16-byte session token.
    Session { username: String, id: [u8; 16] },
}

/// The command block of a request.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Document,
}

/// Parses the 7-byte opening header.
pub fn parse_header(src: &mut impl Read) -> Result<RequestHeader> {
    let magic = parse_array::<4>(src)?;
    if &magic != MAGIC {
        return Err(Error::InvalidProtocol);
    }
    let body_length = parse_u16(src)?;
    let version = parse_u8(src)?;
    Ok(RequestHeader { body_length, version })
}

/// Parses the auth block from the request body.
pub fn parse_auth(src: &mut impl Read) -> Result<AuthRequest> {
    let tag = parse_u8(src)?;
    let auth = match tag {
        AUTH_USER => {
            let username = parse_string(src)?;
            let password = parse_string(src)?;
            AuthRequest::User { username, password }
        }
        AUTH_SESSION => {
            let username = parse_string(src)?;
            let id = parse_array::<16>(src)?;
            AuthRequest::Session { username, id }
        }
        AUTH_NULL => AuthRequest::Null,
        other => return Err(Error::InvalidAuthType(other as char)),
    };
    parse_footer(src)?;
    Ok(auth)
}

/// Parses the command block from the request body.
pub fn parse_command(src: &mut impl Read) -> Result<CommandRequest> {
    let name = parse_string(src)?;
    let raw_args = parse_bytes(src)?;
    let args = Document::from_reader(&mut Cursor::new(raw_args))
        .map_err(|e| Error::InvalidArgumentMap(e.to_string()))?;
    parse_footer(src)?;
    Ok(CommandRequest { name, args })
}

/// Writes the opening header for a body of `body_length` bytes.
pub fn write_header(dest: &mut impl Write, body_length: u16) -> Result<()> {
    dest.write_all(MAGIC)?;
    write_u16(dest, body_length)?;
    write_u8(dest, PROTOCOL_VERSION)
}

/// Writes an auth block.
pub fn write_auth(dest: &mut impl Write, auth: &AuthRequest) -> Result<()> {
    match auth {
        AuthRequest::Null => write_u8(dest, AUTH_NULL)?,
        AuthRequest::User { username, password } => {
            write_u8(dest, AUTH_USER)?;
            write_string(dest, username)?;
            write_string(dest, password)?;
        }
        AuthRequest::Session { username, id } => {
            write_u8(dest, AUTH_SESSION)?;
            write_string(dest, username)?;
            dest.write_all(id)?;
        }
    }
    write_footer(dest)
}

/// Writes a command block.
pub fn write_command(dest: &mut impl Write, name: &str, args: &Document) -> Result<()> {
    write_string(dest, name)?;
    let mut raw_args = Vec::new();
    args.to_writer(&mut raw_args)
        .map_err(|e| Error::InvalidArgumentMap(e.to_string()))?;
    let len = u16::try_from(raw_args.len()).map_err(|_| Error::InvalidSliceLength)?;
    write_u16(dest, len)?;
    dest.write_all(&raw_args)?;
    write_footer(dest)
}

/// Builds a complete request (header + body) ready to be sent.
pub fn build_request(auth: &AuthRequest, name: &str, args: &Document) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    write_auth(&mut body, auth)?;
    write_command(&mut body, name, args)?;
    let body_length = u16::try_from(body.len()).map_err(|_| Error::InvalidSliceLength)?;
    let mut frame = Vec::with_capacity(7 + body.len());
    write_header(&mut frame, body_length)?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut buf = Vec::new();
        write_header(&mut buf, 9).unwrap();
        assert_eq!(&buf[..4], b"LILY");
        assert_eq!(&buf[4..6], &[0x09, 0x00]);
        assert_eq!(buf[6], b'0');
        let header = parse_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header, RequestHeader { body_length: 9, version: b'0' });
    }

    #[test]
    fn test_header_bad_magic() {
        let result = parse_header(&mut Cursor::new(b"LOLY\x00\x00\x30".to_vec()));
        assert!(matches!(result, Err(Error::InvalidProtocol)));
    }

    #[test]
    fn test_null_auth_bytes() {
        let mut buf = Vec::new();
        write_auth(&mut buf, &AuthRequest::Null).unwrap();
        assert_eq!(&buf, b"NEND");
        let parsed = parse_auth(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, AuthRequest::Null);
    }

    #[test]
    fn test_user_auth_round_trip() {
        let auth = AuthRequest::User {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let mut buf = Vec::new();
        write_auth(&mut buf, &auth).unwrap();
        let parsed = parse_auth(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, auth);
    }

    #[test]
    fn test_session_auth_round_trip() {
        let auth = AuthRequest::Session { username: "admin".to_string(), id: [7u8; 16] };
        let mut buf = Vec::new();
        write_auth(&mut buf, &auth).unwrap();
        let parsed = parse_auth(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, auth);
    }

    #[test]
    fn test_unknown_auth_tag() {
        let result = parse_auth(&mut Cursor::new(b"XEND".to_vec()));
        assert!(matches!(result, Err(Error::InvalidAuthType('X'))));
    }

    #[test]
    fn test_command_round_trip() {
        let args = doc! { "paths": ["a", "b"], "grouped": true };
        let mut buf = Vec::new();
        write_command(&mut buf, "createdirs", &args).unwrap();
        let parsed = parse_command(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed.name, "createdirs");
        assert_eq!(parsed.args, args);
    }

    #[test]
    fn test_ping_request_literal_bytes() {
        // "LILY" | len | '0' | 'N' | "END" | "ping" | empty bson | "END"
        let frame = build_request(&AuthRequest::Null, "ping", &doc! {}).unwrap();
        let expected: Vec<u8> = [
            b"LILY".as_slice(),
            &[0x14, 0x00],
            b"0",
            b"N",
            b"END",
            &[0x04, 0x00],
            b"ping",
            &[0x05, 0x00],
            &[0x05, 0x00, 0x00, 0x00, 0x00],
            b"END",
        ]
        .concat();
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_command_bad_footer() {
        let mut buf = Vec::new();
        write_string(&mut buf, "ping").unwrap();
        write_u16(&mut buf, 5).unwrap();
        buf.extend_from_slice(&[0x05, 0x00, 0x00, 0x00, 0x00]);
        buf.extend_from_slice(b"NOP");
        let result = parse_command(&mut Cursor::new(buf));
        assert!(matches!(result, Err(Error::InvalidFooter)));
    }
}
