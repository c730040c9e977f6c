//! The RESP wire codec (component C1): a streaming parser/serializer for
//! simple strings, bulk strings (including the null-bulk-string sentinel)
//! and arrays of primitives, with byte-exact round-tripping.
//!
//! `Message` is a view-vs-owned type rather than two parallel types: the
//! parser always produces `Cow::Borrowed` views into the caller's buffer
//! (zero-copy), while server-built replies construct `Cow::Owned` variants.
//! Serialization reads a `Message` by reference and never mutates it.

use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq)]
pub enum Message<'a> {
    SimpleString(Cow<'a, str>),
    BulkString(Cow<'a, [u8]>),
    NullBulkString,
    Array(Vec<Message<'a>>),
}

impl Message<'static> {
    pub fn simple_string(s: impl Into<String>) -> Self {
        Message::SimpleString(Cow::Owned(s.into()))
    }

    pub fn bulk_string(bytes: impl Into<Vec<u8>>) -> Self {
        Message::BulkString(Cow::Owned(bytes.into()))
    }

    pub fn null_bulk_string() -> Self {
        Message::NullBulkString
    }

    pub fn array(items: Vec<Message<'static>>) -> Self {
        Message::Array(items)
    }
}

impl<'a> Message<'a> {
    pub fn as_bulk_bytes(&self) -> Option<&[u8]> {
        match self {
            Message::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_simple_str(&self) -> Option<&str> {
        match self {
            Message::SimpleString(s) => Some(s),
            _ => None,
        }
    }

    /// Copies the message's content (if any) out into an owned buffer,
    /// releasing any borrow of the caller's read buffer.
    pub fn into_owned(self) -> Message<'static> {
        match self {
            Message::SimpleString(s) => Message::SimpleString(Cow::Owned(s.into_owned())),
            Message::BulkString(b) => Message::BulkString(Cow::Owned(b.into_owned())),
            Message::NullBulkString => Message::NullBulkString,
            Message::Array(items) => {
                Message::Array(items.into_iter().map(Message::into_owned).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognized RESP tag byte")]
    UnknownTag,
    #[error("message is missing its terminating CRLF")]
    MissingDelimiter,
    #[error("length header is not a valid non-negative decimal (or -1 for bulk strings)")]
    BadLengthHeader,
    #[error("nested arrays are not supported")]
    NestedArrayNotSupported,
    #[error("need more bytes to parse a complete message")]
    Truncated,
}

pub type Result<T> = std::result::Result<T, ParseError>;

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == [b'\r', b'\n'])
}

/// Parses a count/length header that must be a bare non-negative decimal
/// (used for array counts, and for bulk-string lengths after the `-1`
/// sentinel has been ruled out).
fn parse_unsigned_header(s: &str) -> Result<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadLengthHeader);
    }
    s.parse::<usize>().map_err(|_| ParseError::BadLengthHeader)
}

/// Parses a bulk-string length header: either a bare non-negative decimal,
/// or the literal `-1` sentinel for the null bulk string.
fn parse_bulk_length_header(s: &str) -> Result<i64> {
    if s == "-1" {
        return Ok(-1);
    }
    parse_unsigned_header(s).map(|n| n as i64)
}

fn parse_simple_string(buf: &[u8]) -> Result<(Message<'_>, usize)> {
    debug_assert_eq!(buf.first(), Some(&b'+'));
    let rel = find_crlf(&buf[1..]).ok_or(ParseError::Truncated)?;
    let end = rel + 1;
    let text: Cow<str> = match std::str::from_utf8(&buf[1..end]) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(String::from_utf8_lossy(&buf[1..end]).into_owned()),
    };
    Ok((Message::SimpleString(text), end + 2))
}

fn parse_bulk_string(buf: &[u8]) -> Result<(Message<'_>, usize)> {
    debug_assert_eq!(buf.first(), Some(&b'$'));
    let rel = find_crlf(&buf[1..]).ok_or(ParseError::Truncated)?;
    let header_end = rel + 1;
    let header = std::str::from_utf8(&buf[1..header_end]).map_err(|_| ParseError::BadLengthHeader)?;
    let length = parse_bulk_length_header(header)?;
    let data_start = header_end + 2;

    if length == -1 {
        return Ok((Message::NullBulkString, data_start));
    }

    let length = length as usize;
    let data_end = data_start
        .checked_add(length)
        .ok_or(ParseError::BadLengthHeader)?;
    if buf.len() < data_end {
        return Err(ParseError::Truncated);
    }
    if buf.len() < data_end + 2 {
        return Err(ParseError::Truncated);
    }
    if &buf[data_end..data_end + 2] != b"\r\n" {
        return Err(ParseError::MissingDelimiter);
    }
    Ok((
        Message::BulkString(Cow::Borrowed(&buf[data_start..data_end])),
        data_end + 2,
    ))
}

fn parse_array(buf: &[u8]) -> Result<(Message<'_>, usize)> {
    debug_assert_eq!(buf.first(), Some(&b'*'));
    let rel = find_crlf(&buf[1..]).ok_or(ParseError::Truncated)?;
    let header_end = rel + 1;
    let header = std::str::from_utf8(&buf[1..header_end]).map_err(|_| ParseError::BadLengthHeader)?;
    let count = parse_unsigned_header(header)?;

    let mut offset = header_end + 2;
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let (item, consumed) = parse(&buf[offset..])?;
        if let Message::Array(_) = item {
            return Err(ParseError::NestedArrayNotSupported);
        }
        items.push(item);
        offset += consumed;
    }
    Ok((Message::Array(items), offset))
}

/// Parses one message from the front of `buf`, returning the message and
/// the number of bytes it consumed. Never returns a partial message: any
/// input that is well-formed but incomplete yields `Truncated`.
pub fn parse(buf: &[u8]) -> Result<(Message<'_>, usize)> {
    match buf.first() {
        None => Err(ParseError::Truncated),
        Some(b'+') => parse_simple_string(buf),
        Some(b'$') => parse_bulk_string(buf),
        Some(b'*') => parse_array(buf),
        Some(_) => Err(ParseError::UnknownTag),
    }
}

fn write_message(msg: &Message, out: &mut Vec<u8>) {
    match msg {
        Message::SimpleString(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Message::BulkString(bytes) => {
            out.push(b'$');
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        Message::NullBulkString => out.extend_from_slice(b"$-1\r\n"),
        Message::Array(items) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                write_message(item, out);
            }
        }
    }
}

/// Serializes a message into its canonical byte sequence.
pub fn serialize(msg: &Message) -> Vec<u8> {
    let mut out = Vec::new();
    write_message(msg, &mut out);
    out
}
