//! Native messaging framing: a 4-byte little-endian length, then UTF-8 JSON.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Browsers accept at most 1 MiB per message sent by the host.
pub const MAX_OUTBOUND_FRAME_BYTES: usize = 1024 * 1024;
/// Messages sent to the host may be up to 64 MiB.
pub const MAX_INBOUND_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("native host I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("native messaging frame exceeds {max_bytes} bytes (got {frame_bytes})")]
    FrameTooLarge { frame_bytes: usize, max_bytes: usize },

    #[error("invalid native messaging JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads one frame. `None` means the browser closed the channel between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, HostError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0_u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let frame_len = u32::from_le_bytes(header) as usize;
    if frame_len > MAX_INBOUND_FRAME_BYTES {
        return Err(HostError::FrameTooLarge {
            frame_bytes: frame_len,
            max_bytes: MAX_INBOUND_FRAME_BYTES,
        });
    }

    let mut payload = vec![0_u8; frame_len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
{
    let too_large = || HostError::FrameTooLarge {
        frame_bytes: payload.len(),
        max_bytes: MAX_OUTBOUND_FRAME_BYTES,
    };
    if payload.len() > MAX_OUTBOUND_FRAME_BYTES {
        return Err(too_large());
    }
    let len = u32::try_from(payload.len()).map_err(|_| too_large())?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    write_frame(writer, &payload).await
}
