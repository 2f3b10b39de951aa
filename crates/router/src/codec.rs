//! Comm channel frame codec, router side.

use bytes::Bytes;
use contracts::protocol::{
    encode_delivery_header, ANY_SOURCE, MAX_PAYLOAD_LEN, TAG_RECEIVE, TAG_SEND,
};
use contracts::{InstanceId, Message, RunError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mailbox::Source;

/// One decoded outbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Send { to: InstanceId, payload: Bytes },
    Receive { source: Source },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("destination {to} out of range (instances: {instances})")]
    DestinationOutOfRange { to: u32, instances: usize },

    #[error("source {requested} out of range (instances: {instances})")]
    SourceOutOfRange { requested: i32, instances: usize },

    #[error("payload of {len} bytes exceeds the 8 MiB limit")]
    PayloadTooLarge { len: usize },

    #[error("channel closed in the middle of a frame")]
    Truncated,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Attribute the error to `instance`
    pub fn into_run_error(self, instance: InstanceId) -> RunError {
        match self {
            CodecError::Io(source) => {
                RunError::system(format!("reading comm channel of instance {instance}"), source)
            }
            other => RunError::protocol(instance, other.to_string()),
        }
    }
}

/// Decodes the frames one instance writes to its outbound channel
pub struct FrameDecoder<R> {
    reader: BufReader<R>,
    instances: usize,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    pub fn new(reader: R, instances: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            instances,
        }
    }

    /// Next frame, or `None` on a clean end-of-stream between frames
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let mut tag = [0u8; 1];
        if self.reader.read(&mut tag).await? == 0 {
            return Ok(None);
        }

        match tag[0] {
            TAG_SEND => {
                let mut header = [0u8; 8];
                self.read_exact(&mut header).await?;
                let to = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
                let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

                if to as usize >= self.instances {
                    return Err(CodecError::DestinationOutOfRange {
                        to,
                        instances: self.instances,
                    });
                }
                if len > MAX_PAYLOAD_LEN {
                    return Err(CodecError::PayloadTooLarge { len });
                }

                let mut payload = vec![0u8; len];
                self.read_exact(&mut payload).await?;
                Ok(Some(Frame::Send {
                    to,
                    payload: Bytes::from(payload),
                }))
            }
            TAG_RECEIVE => {
                let mut raw = [0u8; 4];
                self.read_exact(&mut raw).await?;
                let source = i32::from_be_bytes(raw);

                let source = match source {
                    ANY_SOURCE => Source::Any,
                    s if s >= 0 && (s as usize) < self.instances => Source::From(s as InstanceId),
                    s => {
                        return Err(CodecError::SourceOutOfRange {
                            requested: s,
                            instances: self.instances,
                        })
                    }
                };
                Ok(Some(Frame::Receive { source }))
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(CodecError::Truncated),
            Err(e) => Err(CodecError::Io(e)),
        }
    }
}

/// Write one delivery frame (`from`, `len`, payload) and flush it
pub async fn write_delivery<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&encode_delivery_header(message.from, message.len()))
        .await?;
    writer.write_all(&message.payload).await?;
    writer.flush().await
}
