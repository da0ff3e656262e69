//! Primitive wire data type parsing and serialization.
//!
//! These functions operate on synchronous [`Read`]/[`Write`] sources; the
//! connection layer reads a whole request body into memory before parsing,
//! and stages response bytes in memory before flushing. Integers are
//! little-endian; strings carry a 2-byte length prefix; booleans are one
//! byte, `0x00` or `0xFF`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::wire::FOOTER;

/// Parses a `u8` from the source.
pub fn parse_u8(src: &mut impl Read) -> Result<u8> {
    Ok(src.read_u8()?)
}

/// Parses a `u16` from the source, little-endian.
pub fn parse_u16(src: &mut impl Read) -> Result<u16> {
    Ok(src.read_u16::<LittleEndian>()?)
}

/// Parses a `u32` from the source, little-endian.
pub fn parse_u32(src: &mut impl Read) -> Result<u32> {
    Ok(src.read_u32::<LittleEndian>()?)
}

/// Parses a `u64` from the source, little-endian.
pub fn parse_u64(src: &mut impl Read) -> Result<u64> {
    Ok(src.read_u64::<LittleEndian>()?)
}

/// Parses an `i64` from the source, little-endian.
pub fn parse_i64(src: &mut impl Read) -> Result<i64> {
    Ok(src.read_i64::<LittleEndian>()?)
}

/// Parses a marshalled boolean (`0x00` = false, `0xFF` = true).
pub fn parse_bool(src: &mut impl Read) -> Result<bool> {
    match parse_u8(src)? {
        0x00 => Ok(false),
        0xFF => Ok(true),
        other => Err(Error::InvalidBool(other)),
    }
}

/// Parses a fixed-size byte array.
pub fn parse_array<const N: usize>(src: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    src.read_exact(&mut buf)?;
    Ok(buf)
}

/// Parses a 2-byte-length-prefixed byte vector.
pub fn parse_bytes(src: &mut impl Read) -> Result<Vec<u8>> {
    let len = parse_u16(src)? as usize;
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf)?;
    Ok(buf)
}

/// Parses a 2-byte-length-prefixed UTF-8 string.
pub fn parse_string(src: &mut impl Read) -> Result<String> {
    Ok(String::from_utf8(parse_bytes(src)?)?)
}

/// Parses a string, rejecting lengths above `max_len`.
pub fn parse_string_max_len(src: &mut impl Read, max_len: usize) -> Result<String> {
    let len = parse_u16(src)? as usize;
    if len > max_len {
        return Err(Error::InvalidSliceLength);
    }
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// Parses a duration marshalled as 8 bytes of nanoseconds.
pub fn parse_duration(src: &mut impl Read) -> Result<Duration> {
    Ok(Duration::from_nanos(parse_u64(src)?))
}

/// Parses a string map: 2-byte pair count, then key/value strings.
pub fn parse_string_map(src: &mut impl Read) -> Result<BTreeMap<String, String>> {
    let count = parse_u16(src)? as usize;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = parse_string(src)?;
        let value = parse_string(src)?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Parses a certificate path pair list: 2-byte count, then cert/key path
/// strings.
pub fn parse_cert_pairs(src: &mut impl Read) -> Result<Vec<(String, String)>> {
    let count = parse_u16(src)? as usize;
    let mut pairs = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let cert = parse_string(src)?;
        let key = parse_string(src)?;
        pairs.push((cert, key));
    }
    Ok(pairs)
}

/// Consumes a 3-byte `END` footer.
pub fn parse_footer(src: &mut impl Read) -> Result<()> {
    let footer = parse_array::<3>(src)?;
    if &footer != FOOTER {
        return Err(Error::InvalidFooter);
    }
    Ok(())
}

/// Writes a `u8`.
pub fn write_u8(dest: &mut impl Write, n: u8) -> Result<()> {
    Ok(dest.write_u8(n)?)
}

/// Writes a `u16`, little-endian.
pub fn write_u16(dest: &mut impl Write, n: u16) -> Result<()> {
    Ok(dest.write_u16::<LittleEndian>(n)?)
}

/// Writes a `u32`, little-endian.
pub fn write_u32(dest: &mut impl Write, n: u32) -> Result<()> {
    Ok(dest.write_u32::<LittleEndian>(n)?)
}

/// Writes a `u64`, little-endian.
pub fn write_u64(dest: &mut impl Write, n: u64) -> Result<()> {
    Ok(dest.write_u64::<LittleEndian>(n)?)
}

/// Writes an `i64`, little-endian.
pub fn write_i64(dest: &mut impl Write, n: i64) -> Result<()> {
    Ok(dest.write_i64::<LittleEndian>(n)?)
}

/// Writes a marshalled boolean (`0x00` / `0xFF`).
pub fn write_bool(dest: &mut impl Write, b: bool) -> Result<()> {
    write_u8(dest, if b { 0xFF } else { 0x00 })
}

/// Writes a 2-byte-length-prefixed byte slice.
pub fn write_bytes(dest: &mut impl Write, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::InvalidSliceLength)?;
    write_u16(dest, len)?;
    Ok(dest.write_all(bytes)?)
}

/// Writes a 2-byte-length-prefixed UTF-8 string.
pub fn write_string(dest: &mut impl Write, s: &str) -> Result<()> {
    write_bytes(dest, s.as_bytes())
}

/// Writes a duration as 8 bytes of nanoseconds.
pub fn write_duration(dest: &mut impl Write, d: Duration) -> Result<()> {
    let nanos = u64::try_from(d.as_nanos()).map_err(|_| Error::InvalidSliceLength)?;
    write_u64(dest, nanos)
}

/// Writes a string map: 2-byte pair count, then key/value strings.
pub fn write_string_map(dest: &mut impl Write, map: &BTreeMap<String, String>) -> Result<()> {
    let count = u16::try_from(map.len()).map_err(|_| Error::InvalidSliceLength)?;
    write_u16(dest, count)?;
    for (key, value) in map {
        write_string(dest, key)?;
        write_string(dest, value)?;
    }
    Ok(())
}

/// Writes a certificate path pair list.
pub fn write_cert_pairs(dest: &mut impl Write, pairs: &[(String, String)]) -> Result<()> {
    let count = u16::try_from(pairs.len()).map_err(|_| Error::InvalidSliceLength)?;
    write_u16(dest, count)?;
    for (cert, key) in pairs {
        write_string(dest, cert)?;
        write_string(dest, key)?;
    }
    Ok(())
}

/// Writes the 3-byte `END` footer.
pub fn write_footer(dest: &mut impl Write) -> Result<()> {
    Ok(dest.write_all(FOOTER)?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_u16_round_trip() {
        let init = [0u16, 7, 65535];
        let mut buf = Vec::new();
        for n in init {
            write_u16(&mut buf, n).unwrap();
        }
        let mut src = Cursor::new(buf);
        for expected in init {
            let val = parse_u16(&mut src).expect("Cannot parse value!");
            assert_eq!(val, expected);
        }
    }

    #[test]
    fn test_u64_round_trip() {
        let init = [2u64, 0, 125, 78569, u64::MAX];
        let mut buf = Vec::new();
        for n in init {
            write_u64(&mut buf, n).unwrap();
        }
        let mut src = Cursor::new(buf);
        for expected in init {
            let val = parse_u64(&mut src).expect("Cannot parse value!");
            assert_eq!(val, expected);
        }
    }

    #[test]
    fn test_bool_bytes() {
        let mut src = Cursor::new(vec![0x00, 0xFF, 0x01]);
        assert!(!parse_bool(&mut src).unwrap());
        assert!(parse_bool(&mut src).unwrap());
        assert!(matches!(parse_bool(&mut src), Err(Error::InvalidBool(0x01))));
    }

    #[test]
    fn test_string_little_endian_prefix() {
        let mut buf = Vec::new();
        write_string(&mut buf, "ping").unwrap();
        assert_eq!(&buf, &[0x04, 0x00, b'p', b'i', b'n', b'g']);
        let parsed = parse_string(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, "ping");
    }

    #[test]
    fn test_string_invalid_utf8() {
        let src = vec![0x03, 0x00, 0xFF, 0xFF, 0xFF];
        let result = parse_string(&mut Cursor::new(src));
        assert!(matches!(result, Err(Error::InvalidString(_))));
    }

    #[test]
    fn test_string_max_len() {
        let mut buf = Vec::new();
        write_string(&mut buf, "this string is too long").unwrap();
        let result = parse_string_max_len(&mut Cursor::new(buf), 10);
        assert!(matches!(result, Err(Error::InvalidSliceLength)));
    }

    #[test]
    fn test_string_truncated() {
        let src = vec![0x0A, 0x00, b'a'];
        let result = parse_string(&mut Cursor::new(src));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_duration_round_trip() {
        let mut buf = Vec::new();
        write_duration(&mut buf, Duration::from_millis(1500)).unwrap();
        let parsed = parse_duration(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, Duration::from_millis(1500));
    }

    #[test]
    fn test_string_map_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("main".to_string(), "/srv/main.drive".to_string());
        map.insert("scratch".to_string(), "/srv/scratch.drive".to_string());
        let mut buf = Vec::new();
        write_string_map(&mut buf, &map).unwrap();
        let parsed = parse_string_map(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn test_cert_pairs_round_trip() {
        let pairs = vec![("cert.pem".to_string(), "key.pem".to_string())];
        let mut buf = Vec::new();
        write_cert_pairs(&mut buf, &pairs).unwrap();
        let parsed = parse_cert_pairs(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, pairs);
    }

    #[test]
    fn test_footer() {
        let mut buf = Vec::new();
        write_footer(&mut buf).unwrap();
        assert_eq!(&buf, b"END");
        assert!(parse_footer(&mut Cursor::new(buf)).is_ok());
        let result = parse_footer(&mut Cursor::new(b"NOP".to_vec()));
        assert!(matches!(result, Err(Error::InvalidFooter)));
    }
}
