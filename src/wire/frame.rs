//! Length-prefixed frame encoding and decoding over async byte streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Size of the length field in front of every payload.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload accepted in either direction (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Outcome of reading one frame from the stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    Payload(Vec<u8>),
    /// A zero-length frame: nothing to deliver, read the next one.
    Skip,
    /// The peer closed the stream exactly on a frame boundary.
    EndOfStream,
}

/// Prefix `payload` with its little-endian length.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            length: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let length = payload.len() as u32;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// The zero-length frame used as a keepalive.
pub const fn heartbeat() -> [u8; LENGTH_PREFIX_SIZE] {
    0u32.to_le_bytes()
}

/// Read one frame, looping over short reads until it is complete.
pub async fn read_frame<R>(reader: &mut R) -> Result<Decoded, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(Decoded::EndOfStream);
            }
            return Err(FrameError::Truncated {
                expected: LENGTH_PREFIX_SIZE,
                received: filled,
            });
        }
        filled += n;
    }

    let length = u32::from_le_bytes(header) as usize;
    if length == 0 {
        return Ok(Decoded::Skip);
    }
    if length > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            length,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut payload = vec![0u8; length];
    let mut received = 0;
    while received < length {
        let n = reader.read(&mut payload[received..]).await?;
        if n == 0 {
            return Err(FrameError::Truncated {
                expected: LENGTH_PREFIX_SIZE + length,
                received: LENGTH_PREFIX_SIZE + received,
            });
        }
        received += n;
    }

    Ok(Decoded::Payload(payload))
}

/// Encode `payload` and write it as a single frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_heartbeat<W>(writer: &mut W) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&heartbeat()).await?;
    writer.flush().await?;
    Ok(())
}
