use futures::{SinkExt, StreamExt};
use tokio::io::{self, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::codec::{CodecError, FrameCodec};
use crate::frame::Frame;

/// A client session over any byte stream. Reads and writes go through separate halves, each with
/// its own buffer: bytes are read from the stream into the read buffer and removed from it as soon
/// as a frame is parsed.
pub struct Connection<S> {
    pub id: Uuid,
    reader: FramedRead<ReadHalf<S>, FrameCodec>,
    writer: FramedWrite<WriteHalf<S>, FrameCodec>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Connection<S> {
        Self::with_codec(stream, FrameCodec::default())
    }

    pub fn with_codec(stream: S, codec: FrameCodec) -> Connection<S> {
        let (read_half, write_half) = io::split(stream);

        Connection {
            id: Uuid::new_v4(),
            reader: FramedRead::new(read_half, codec),
            writer: FramedWrite::new(write_half, codec),
        }
    }

    /// Waits for the next frame. Returns `Ok(None)` when the peer closes the stream on a frame
    /// boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        self.reader.next().await.transpose()
    }

    /// Encodes the frame and flushes it to the stream.
    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), CodecError> {
        self.writer.send(frame).await
    }
}
