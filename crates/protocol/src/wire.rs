//! Length-prefixed frame transport over any byte stream.
//!
//! ```text
//! [4 bytes BE: body_len][body_len bytes: encoded frame body]
//! ```
//!
//! Each frame goes out as one complete write followed by a flush.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec;
use crate::error::FrameError;
use crate::frame::MessageFrame;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Writes one length-prefixed body and flushes the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), FrameError> {
    let len = u32::try_from(body.len()).map_err(|_| FrameError::FrameTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed body.
///
/// Returns `None` when the stream ends cleanly on a frame boundary.
/// A declared length above `max_frame_size` is rejected before the body
/// is read.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Vec<u8>>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Protocol(
                "unexpected EOF in length prefix".into(),
            ));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Protocol("unexpected EOF in frame body".into())
        } else {
            FrameError::Io(e)
        }
    })?;
    Ok(Some(body))
}

/// Encodes a frame and writes it to the stream.
pub async fn send<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &MessageFrame,
    max_frame_size: usize,
) -> Result<(), FrameError> {
    let body = codec::encode(frame, max_frame_size)?;
    write_frame(writer, &body).await
}

/// Reads and decodes the next frame. Returns `None` on clean EOF.
pub async fn receive<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<MessageFrame>, FrameError> {
    Ok(read_frame(reader, max_frame_size)
        .await?
        .map(|body| codec::decode(&body)))
}
