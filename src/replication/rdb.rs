//! The constant empty-database RDB blob sent after `FULLRESYNC`, and its
//! PSYNC-over-RESP framing (a bulk string *without* a trailing CRLF). The
//! base64 constant below must decode to exactly 88 bytes.

use base64::prelude::*;

const EMPTY_RDB_BASE64: &str = "UkVESVMwMDEx+glyZWRpcy12ZXIFNy4yLjD6CnJlZGlzLWJpdHPAQPoFY3RpbWXCbQi8ZfoIdXNlZC1tZW3CsMQQAPoIYW9mLWJhc2XAAP/wbjv+wP9aog==";

/// Decodes the constant empty-database RDB payload (88 bytes).
pub fn empty_rdb() -> Vec<u8> {
    BASE64_STANDARD
        .decode(EMPTY_RDB_BASE64)
        .expect("EMPTY_RDB_BASE64 is a fixed, valid constant")
}

/// Frames an RDB payload the way PSYNC does: `$<len>\r\n<bytes>` with no
/// trailing CRLF, distinguishing it from an ordinary RESP bulk string.
pub fn frame_rdb(rdb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rdb.len() + 16);
    out.push(b'$');
    out.extend_from_slice(rdb.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(rdb);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RdbFrameError {
    #[error("need more bytes to parse a complete RDB frame")]
    Truncated,
    #[error("RDB frame length header is malformed")]
    BadLengthHeader,
}

/// Parses an RDB frame (`$<len>\r\n<bytes>`, no trailing CRLF) from the
/// front of `buf`, as received by a replica after `FULLRESYNC`.
pub fn parse_rdb_frame(buf: &[u8]) -> Result<(Vec<u8>, usize), RdbFrameError> {
    if buf.first() != Some(&b'$') {
        return Err(RdbFrameError::BadLengthHeader);
    }
    let header_end = buf
        .windows(2)
        .position(|w| w == [b'\r', b'\n'])
        .ok_or(RdbFrameError::Truncated)?;
    let header = std::str::from_utf8(&buf[1..header_end]).map_err(|_| RdbFrameError::BadLengthHeader)?;
    let length: usize = header.parse().map_err(|_| RdbFrameError::BadLengthHeader)?;
    let data_start = header_end + 2;
    let data_end = data_start
        .checked_add(length)
        .ok_or(RdbFrameError::BadLengthHeader)?;
    if buf.len() < data_end {
        return Err(RdbFrameError::Truncated);
    }
    Ok((buf[data_start..data_end].to_vec(), data_end))
}
