//! # Text Scanning Utilities
//!
//! Helpers for finding tokens in the receive buffer and for reading the
//! comma separated fields of AT response lines, such as decimal integers and
//! double-quoted strings.

use crate::error::{Error, Result};

/// Returns the offset of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Returns the offset of the last occurrence of `needle` in `haystack`.
pub fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Advances the cursor just past the next occurrence of `token`.
pub fn skip_past(cursor: &mut usize, buf: &[u8], token: &[u8]) -> Result<()> {
    let rest = buf.get(*cursor..).ok_or(Error::InvalidParam)?;
    let at = find(rest, token).ok_or(Error::InvalidParam)?;
    *cursor += at + token.len();
    Ok(())
}

/// Skips one byte if it equals `byte`, failing otherwise.
pub fn expect_byte(cursor: &mut usize, buf: &[u8], byte: u8) -> Result<()> {
    match buf.get(*cursor) {
        Some(b) if *b == byte => {
            *cursor += 1;
            Ok(())
        }
        _ => Err(Error::InvalidParam),
    }
}

/// Reads an unsigned decimal integer, advancing the cursor.
pub fn read_uint(cursor: &mut usize, buf: &[u8]) -> Result<u32> {
    let start = *cursor;
    let mut value: u32 = 0;
    while let Some(b) = buf.get(*cursor).copied().filter(u8::is_ascii_digit) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u32::from(b - b'0')))
            .ok_or(Error::InvalidParam)?;
        *cursor += 1;
    }
    if *cursor == start {
        return Err(Error::InvalidParam);
    }
    Ok(value)
}

/// Reads a signed decimal integer, advancing the cursor.
pub fn read_int(cursor: &mut usize, buf: &[u8]) -> Result<i32> {
    let negative = buf.get(*cursor) == Some(&b'-');
    if negative {
        *cursor += 1;
    }
    let magnitude = i32::try_from(read_uint(cursor, buf)?).map_err(|_| Error::InvalidParam)?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Reads a double-quoted string and returns its contents without the quotes.
///
/// Backslash escapes are skipped over but not decoded, so the returned slice
/// is exactly what the co-processor sent between the quotes.
pub fn read_quoted<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a [u8]> {
    expect_byte(cursor, buf, b'"')?;
    let start = *cursor;
    while let Some(&b) = buf.get(*cursor) {
        match b {
            b'\\' => *cursor += 2,
            b'"' => {
                let value = &buf[start..*cursor];
                *cursor += 1;
                return Ok(value);
            }
            _ => *cursor += 1,
        }
    }
    Err(Error::InvalidParam)
}

/// Returns the bytes up to (not including) the next `\r` or `\n`.
pub fn line_at(buf: &[u8], start: usize) -> &[u8] {
    let rest = buf.get(start..).unwrap_or(&[]);
    let end = rest
        .iter()
        .position(|b| *b == b'\r' || *b == b'\n')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Yields the remainder of every line that starts with `prefix`.
pub fn prefixed_lines<'a>(buf: &'a [u8], prefix: &'a [u8]) -> impl Iterator<Item = &'a [u8]> {
    buf.split(|b| *b == b'\n').filter_map(move |line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        line.strip_prefix(prefix)
    })
}

/// Interprets bytes as UTF-8, keeping the longest valid prefix.
pub fn utf8_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}
