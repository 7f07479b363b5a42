// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::str;

use bytes::Buf;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// Upper bound on the number of elements preallocated for an array. The declared length comes
/// from the client, so it is not trusted for allocation.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

/// Deepest array nesting accepted. Parsing recurses once per level, so the depth has to be bounded
/// to keep a hostile client from exhausting the task's stack.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0:#04x}")]
    InvalidDataType(u8),
    #[error("invalid line ending, expected CRLF")]
    InvalidLineEnding,
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),
    #[error("invalid length: {0}")]
    InvalidLength(i64),
    #[error("invalid UTF-8 in simple string")]
    InvalidUtf8,
    #[error("arrays nested deeper than {} levels", MAX_NESTING_DEPTH)]
    NestingTooDeep,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Parses a single frame starting at the cursor position. On success the cursor is left right
    /// after the frame. `Error::Incomplete` means the buffer ends before the frame does; every
    /// other error means the bytes can never form a valid frame.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_at(src, 0)
    }

    fn parse_at(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => Ok(Frame::Simple(get_string(src)?)),
            DataType::SimpleError => Ok(Frame::Error(get_string(src)?)),
            DataType::Integer => Ok(Frame::Integer(get_integer(src)?)),
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = get_integer(src)?;

                if length == -1 {
                    return Ok(Frame::Null);
                }

                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;
                let data = Bytes::copy_from_slice(get_exact(src, length)?);
                skip_crlf(src)?;

                Ok(Frame::Bulk(data))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(Error::NestingTooDeep);
                }

                let length = get_integer(src)?;

                if length <= 0 {
                    return Ok(Frame::Array(Vec::new()));
                }

                let capacity = usize::try_from(length)
                    .unwrap_or(MAX_PREALLOCATED_ELEMENTS)
                    .min(MAX_PREALLOCATED_ELEMENTS);
                let mut frames = Vec::with_capacity(capacity);
                for _ in 0..length {
                    let frame = Self::parse_at(src, depth + 1)?;
                    frames.push(frame);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = BytesMut::new();
        self.write_to(&mut bytes);
        bytes.to_vec()
    }

    /// Appends the wire representation of the frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.reserve(1 + s.len() + CRLF.len());
                dst.put_u8(u8::from(DataType::SimpleString));
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Error(s) => {
                dst.reserve(1 + s.len() + CRLF.len());
                dst.put_u8(u8::from(DataType::SimpleError));
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Integer(i) => {
                let digits = i.to_string();
                dst.reserve(1 + digits.len() + CRLF.len());
                dst.put_u8(u8::from(DataType::Integer));
                dst.put_slice(digits.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Bulk(bytes) => {
                let length_str = bytes.len().to_string();
                dst.reserve(1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len());
                dst.put_u8(u8::from(DataType::BulkString));
                dst.put_slice(length_str.as_bytes());
                dst.put_slice(CRLF);
                dst.put_slice(bytes);
                dst.put_slice(CRLF);
            }
            // RESP2 null bulk string.
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                dst.reserve(1 + length_str.len() + CRLF.len());
                dst.put_u8(u8::from(DataType::Array));
                dst.put_slice(length_str.as_bytes());
                dst.put_slice(CRLF);
                for frame in arr {
                    frame.write_to(dst);
                }
            }
        }
    }

    /// Human readable name of the frame type, used in error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk string",
            Frame::Null => "null",
            Frame::Array(_) => "array",
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

// Single line rendering for logs. Never emits CR or LF so it is safe to embed in an error reply.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s.escape_debug()),
            Frame::Error(s) => write!(f, "-{}", s.escape_debug()),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${:?}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "[")?;
                for (i, frame) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", frame)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Returns the bytes of the current line, without its terminator, and moves the cursor past the
/// terminator. The first LF found must be preceded by a CR.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;

    let newline = buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    if newline == start || buf[newline - 1] != b'\r' {
        return Err(Error::InvalidLineEnding);
    }

    src.set_position((newline + 1) as u64);

    Ok(&buf[start..newline - 1])
}

fn get_string(src: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let line = get_line(src)?;
    str::from_utf8(line)
        .map(|s| s.to_string())
        .map_err(|_| Error::InvalidUtf8)
}

fn get_integer(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    // Only a leading minus sign is part of the grammar.
    if line.first() == Some(&b'+') {
        return Err(Error::InvalidInteger(String::from_utf8_lossy(line).into_owned()));
    }

    str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Takes exactly `length` raw bytes, whatever they contain.
fn get_exact<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;
    let end = start
        .checked_add(length)
        .ok_or(Error::InvalidLength(i64::MAX))?;

    if buf.len() < end {
        return Err(Error::Incomplete);
    }

    src.set_position(end as u64);

    Ok(&buf[start..end])
}

fn skip_crlf(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    let rest = src.chunk();

    if rest.len() < CRLF.len() {
        // A lone trailing CR may still be completed by the next read.
        return match rest.first() {
            Some(&b) if b != b'\r' => Err(Error::InvalidLineEnding),
            _ => Err(Error::Incomplete),
        };
    }

    if &rest[..CRLF.len()] != CRLF {
        return Err(Error::InvalidLineEnding);
    }

    src.advance(CRLF.len());
    Ok(())
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
