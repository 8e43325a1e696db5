//! Fixed header and primitive big-endian encoding shared by every binary file
//! the builder reads or writes (feature store, coefficient file, tree).

use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};

/// "MARY" in ASCII.
pub const MAGIC: i32 = 0x4D41_5259;
pub const VERSION: i32 = 40;

/// Content-type tag stored after magic and version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ContentType {
    Tree = 100,
    UnitFeatures = 102,
    Coefficients = 110,
}

impl ContentType {
    fn from_i32(tag: i32) -> Option<Self> {
        match tag {
            100 => Some(ContentType::Tree),
            102 => Some(ContentType::UnitFeatures),
            110 => Some(ContentType::Coefficients),
            _ => None,
        }
    }
}

pub fn write_header<W: Write>(w: &mut W, content: ContentType) -> Result<()> {
    write_i32(w, MAGIC)?;
    write_i32(w, VERSION)?;
    write_i32(w, content as i32)?;
    Ok(())
}

/// Reads and checks the header, failing unless it announces `expected`.
pub fn read_header<R: Read>(r: &mut R, expected: ContentType, context: &str) -> Result<()> {
    let magic = read_i32(r, context)?;
    if magic != MAGIC {
        return Err(Error::format(context, format!("bad magic 0x{magic:08X}")));
    }
    let version = read_i32(r, context)?;
    if version != VERSION {
        return Err(Error::format(
            context,
            format!("unsupported version {version}, expected {VERSION}"),
        ));
    }
    let tag = read_i32(r, context)?;
    match ContentType::from_i32(tag) {
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(Error::format(
            context,
            format!("content type {found:?} where {expected:?} was expected"),
        )),
        None => Err(Error::format(context, format!("unknown content type {tag}"))),
    }
}

// --- Primitive readers ---
// An unexpected end of input is a truncated record, not an I/O failure.

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8], context: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::format(context, "truncated record")
        } else {
            Error::Io(e)
        }
    })
}

pub fn read_u8<R: Read>(r: &mut R, context: &str) -> Result<u8> {
    let mut b = [0u8; 1];
    read_exact(r, &mut b, context)?;
    Ok(b[0])
}

pub fn read_i16<R: Read>(r: &mut R, context: &str) -> Result<i16> {
    let mut b = [0u8; 2];
    read_exact(r, &mut b, context)?;
    Ok(i16::from_be_bytes(b))
}

pub fn read_i32<R: Read>(r: &mut R, context: &str) -> Result<i32> {
    let mut b = [0u8; 4];
    read_exact(r, &mut b, context)?;
    Ok(i32::from_be_bytes(b))
}

pub fn read_f32<R: Read>(r: &mut R, context: &str) -> Result<f32> {
    let mut b = [0u8; 4];
    read_exact(r, &mut b, context)?;
    Ok(f32::from_be_bytes(b))
}

/// Reads a non-negative count stored as `i32`.
pub fn read_count<R: Read>(r: &mut R, context: &str, what: &str) -> Result<usize> {
    let n = read_i32(r, context)?;
    usize::try_from(n).map_err(|_| Error::format(context, format!("negative {what} count {n}")))
}

/// Reads a string stored as a `u16` byte length followed by UTF-8 bytes.
pub fn read_str<R: Read>(r: &mut R, context: &str) -> Result<String> {
    let mut len = [0u8; 2];
    read_exact(r, &mut len, context)?;
    let mut bytes = vec![0u8; u16::from_be_bytes(len) as usize];
    read_exact(r, &mut bytes, context)?;
    String::from_utf8(bytes).map_err(|_| Error::format(context, "string is not valid UTF-8"))
}

/// Fails unless the reader is exhausted.
pub fn expect_eof<R: Read>(r: &mut R, context: &str) -> Result<()> {
    let mut b = [0u8; 1];
    match r.read(&mut b)? {
        0 => Ok(()),
        _ => Err(Error::format(context, "trailing bytes after last record")),
    }
}

// --- Primitive writers ---

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn write_i16<W: Write>(w: &mut W, v: i16) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(w: &mut W, v: f32) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Writes a count as `i32`, rejecting values that do not fit.
pub fn write_count<W: Write>(w: &mut W, n: usize, what: &str) -> Result<()> {
    let n = i32::try_from(n)
        .map_err(|_| Error::format(what, format!("count {n} does not fit in 32 bits")))?;
    write_i32(w, n)
}

pub fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::format("string", format!("{} bytes exceed the 65535 limit", s.len())))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout_is_big_endian() {
        let mut buf = Vec::new();
        write_header(&mut buf, ContentType::Tree).unwrap();
        assert_eq!(&buf[..4], b"MARY");
        assert_eq!(&buf[4..8], &[0, 0, 0, 40]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 100]);
    }

    #[test]
    fn wrong_content_type_is_format_error() {
        let mut buf = Vec::new();
        write_header(&mut buf, ContentType::Coefficients).unwrap();
        let err = read_header(&mut Cursor::new(buf), ContentType::Tree, "t").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn bad_magic_is_format_error() {
        let buf = vec![0u8; 12];
        let err = read_header(&mut Cursor::new(buf), ContentType::Tree, "t").unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn truncated_input_is_format_error() {
        let buf = vec![0x4D, 0x41];
        let err = read_i32(&mut Cursor::new(buf), "t").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn strings_use_u16_length_prefix() {
        let mut buf = Vec::new();
        write_str(&mut buf, "phone").unwrap();
        assert_eq!(&buf[..2], &[0, 5]);
        let s = read_str(&mut Cursor::new(buf), "t").unwrap();
        assert_eq!(s, "phone");
    }
}
