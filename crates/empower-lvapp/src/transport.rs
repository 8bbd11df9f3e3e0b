//! Async framing over a byte stream.
//!
//! LVAPP rides on TCP, so frames are reassembled from the header's length
//! field: read the fixed header, then the rest of the declared length.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::trace;

use crate::codec::{decode, peek_length, Frame, HEADER_LEN};
use crate::error::{CodecError, SessionError};

/// Read the raw bytes of one frame. `Ok(None)` on a clean end of stream at a
/// frame boundary.
pub async fn read_raw_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                got: filled,
            }
            .into());
        }
        filled += n;
    }

    let length = peek_length(&buf)?.unwrap_or(HEADER_LEN);
    buf.resize(length, 0);
    if length > HEADER_LEN {
        reader.read_exact(&mut buf[HEADER_LEN..]).await?;
    }
    trace!(length, "frame read");
    Ok(Some(buf))
}

/// Read and decode one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, SessionError>
where
    R: AsyncRead + Unpin,
{
    match read_raw_frame(reader).await? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Drain `outbound` into `writer` until the channel closes or a write
/// fails.
pub async fn write_frames<W>(writer: &mut W, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outbound.recv().await {
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}
