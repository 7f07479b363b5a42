use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};

/// Default upper bound for the bytes buffered while waiting for a frame to complete.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Errors that end a connection. RESP has no resynchronisation marker, so once one of these
/// happens the remaining bytes of the stream cannot be trusted.
#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("protocol error; {0}")]
    Frame(#[from] frame::Error),
    #[error("frame size of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("connection closed in the middle of a frame, {0} bytes left unparsed")]
    Truncated(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// RESP framing for `FramedRead`/`FramedWrite`.
///
/// An incomplete frame is parsed again from its first byte every time more data arrives, so a
/// large frame trickling in costs time quadratic in its size. `max_frame_size` is the only bound on
/// that work.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            // Not enough data to parse a frame. Keep buffering unless the client is sending more
            // than we are willing to hold for a single frame.
            Err(frame::Error::Incomplete) if src.len() > self.max_frame_size => {
                return Err(CodecError::FrameTooLarge {
                    size: src.len(),
                    limit: self.max_frame_size,
                })
            }
            Err(frame::Error::Incomplete) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        // The cursor only ever moves to offsets inside `src`.
        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(CodecError::Truncated(buf.len())),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.write_to(dst);
        Ok(())
    }
}
