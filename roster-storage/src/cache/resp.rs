//! RESP2 (Redis serialization protocol) codec.
//!
//! Commands are encoded as arrays of bulk strings. Replies are parsed
//! incrementally from a byte buffer: [`RespValue::parse`] reports
//! `Ok(None)` while the buffer holds only a prefix of a value, so the caller
//! can keep reading from the socket.

use thiserror::Error;

/// Largest bulk string accepted, matching the server's own limit.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting accepted in a reply.
const MAX_DEPTH: usize = 32;

/// A decoded RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    BulkString(Option<Vec<u8>>),
    /// `None` is the null array (`*-1`).
    Array(Option<Vec<RespValue>>),
}

/// Malformed RESP input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RespError {
    #[error("Invalid type marker: {0:#04x}")]
    InvalidMarker(u8),

    #[error("Invalid length: {0}")]
    InvalidLength(String),

    #[error("Invalid integer: {0}")]
    InvalidInteger(String),

    #[error("Bulk string is not terminated by CRLF")]
    MissingTerminator,

    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Array nesting deeper than {MAX_DEPTH}")]
    TooDeep,
}

/// Encode a command (`GET key`, `SETEX key ttl value`, ...) as a RESP array
/// of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let payload: usize = args.iter().map(|arg| arg.len() + 16).sum();
    let mut out = Vec::with_capacity(payload + 16);
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

impl RespValue {
    /// Parse one value from the front of `buf`.
    ///
    /// Returns the value and the number of bytes it occupied, `Ok(None)` if
    /// `buf` is an incomplete prefix, or an error if the bytes can never
    /// form a valid value.
    pub fn parse(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        parse_at(buf, 0, 0)
    }
}

fn parse_at(buf: &[u8], pos: usize, depth: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(&marker) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    match marker {
        b'+' => Ok(Some((RespValue::SimpleString(utf8(line)?), next))),
        b'-' => Ok(Some((RespValue::Error(utf8(line)?), next))),
        b':' => Ok(Some((RespValue::Integer(parse_int(line)?), next))),
        b'$' => {
            let len = parse_len(line)?;
            let Some(len) = len else {
                return Ok(Some((RespValue::BulkString(None), next)));
            };
            let end = next + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::MissingTerminator);
            }
            Ok(Some((RespValue::BulkString(Some(buf[next..end].to_vec())), end + 2)))
        }
        b'*' => {
            let len = parse_len(line)?;
            let Some(len) = len else {
                return Ok(Some((RespValue::Array(None), next)));
            };
            if depth >= MAX_DEPTH {
                return Err(RespError::TooDeep);
            }
            let mut items = Vec::with_capacity(len.min(1024));
            let mut cursor = next;
            for _ in 0..len {
                match parse_at(buf, cursor, depth + 1)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(Some(items)), cursor)))
        }
        other => Err(RespError::InvalidMarker(other)),
    }
}

/// Find the CRLF-terminated line starting at `start`.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    rest.windows(2)
        .position(|w| w == b"\r\n")
        .map(|pos| (&rest[..pos], start + pos + 2))
}

fn utf8(line: &[u8]) -> Result<String, RespError> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|_| RespError::InvalidUtf8)
}

fn parse_int(line: &[u8]) -> Result<i64, RespError> {
    let text = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
    text.parse::<i64>()
        .map_err(|_| RespError::InvalidInteger(text.to_string()))
}

/// Parse a bulk/array length; `-1` is the null marker.
fn parse_len(line: &[u8]) -> Result<Option<usize>, RespError> {
    let len = parse_int(line).map_err(|e| match e {
        RespError::InvalidInteger(text) => RespError::InvalidLength(text),
        other => other,
    })?;
    match len {
        -1 => Ok(None),
        n if (0..=MAX_BULK_LEN).contains(&n) => Ok(Some(n as usize)),
        n => Err(RespError::InvalidLength(n.to_string())),
    }
}
