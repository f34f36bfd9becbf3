//! Wire framing shared by the client and server halves: a 4-byte
//! little-endian length prefix followed by a `bincode`-encoded
//! [`BridgeRequest`]/[`BridgeResponse`] (spec.md §6: "the transport is free
//! to choose its own framing as long as request/response pairing is
//! preserved").

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Requests/responses larger than this are almost certainly a corrupted
/// length prefix, not a legitimate call — refuse to allocate for them.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let body = bincode::serialize(message)?;
    let len = u32::try_from(body.len()).map_err(|_| TransportError::FrameTooLarge(body.len()))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Returns `Ok(None)` on a clean EOF at a frame boundary (the peer closed
/// the connection between messages, not mid-frame).
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, TransportError>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len as usize));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let message = bincode::deserialize(&body)?;
    Ok(Some(message))
}
