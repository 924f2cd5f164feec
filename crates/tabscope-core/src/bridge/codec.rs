//! Native messaging framing: a 32-bit little-endian length, then UTF-8 JSON.

use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Browsers reject messages to the extension above 1 MiB
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;
/// Upper bound on what the host will buffer from the browser
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a message into one frame, length prefix included
///
/// # Errors
///
/// Returns `TooLarge` if the payload exceeds [`MAX_OUTBOUND_FRAME`]
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_OUTBOUND_FRAME {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            limit: MAX_OUTBOUND_FRAME,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        size: payload.len(),
        limit: MAX_OUTBOUND_FRAME,
    })?;

    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// # Errors
///
/// Returns an error if encoding or the write fails
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `None` on a clean end of stream
///
/// A payload that is not valid JSON for `T` is still consumed whole, so the
/// stream stays aligned and the caller may keep reading.
///
/// # Errors
///
/// Returns an error on i/o failure, an oversized frame or an undecodable payload
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0_u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = usize::try_from(u32::from_le_bytes(len_buf)).unwrap_or(usize::MAX);
    if size > MAX_INBOUND_FRAME {
        return Err(FrameError::TooLarge {
            size,
            limit: MAX_INBOUND_FRAME,
        });
    }

    let mut payload = vec![0_u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&json!({"a": 1})).unwrap();
        assert_eq!(&frame[..4], &7_u32.to_le_bytes());
        assert_eq!(&frame[4..], br#"{"a":1}"#);
    }

    #[test]
    fn test_oversized_outbound_frame_is_rejected() {
        let big = "x".repeat(MAX_OUTBOUND_FRAME);
        assert!(matches!(
            encode_frame(&big),
            Err(FrameError::TooLarge { limit: MAX_OUTBOUND_FRAME, .. })
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({"type": "wake"})).await.unwrap();
        write_frame(&mut buf, &json!([1, 2, 3])).await.unwrap();

        let mut reader = buf.as_slice();
        let first: Value = read_frame(&mut reader).await.unwrap().unwrap();
        let second: Value = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(first["type"], "wake");
        assert_eq!(second, json!([1, 2, 3]));
        assert!(read_frame::<_, Value>(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_payload_keeps_stream_aligned() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3_u32.to_le_bytes());
        buf.extend_from_slice(b"{{{");
        write_frame(&mut buf, &json!("ok")).await.unwrap();

        let mut reader = buf.as_slice();
        assert!(matches!(
            read_frame::<_, Value>(&mut reader).await,
            Err(FrameError::Json(_))
        ));
        let next: Value = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(next, "ok");
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10_u32.to_le_bytes());
        buf.extend_from_slice(b"{}");
        let mut reader = buf.as_slice();
        assert!(matches!(
            read_frame::<_, Value>(&mut reader).await,
            Err(FrameError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_inbound_length_is_rejected() {
        let buf = u32::MAX.to_le_bytes();
        let mut reader = &buf[..];
        assert!(matches!(
            read_frame::<_, Value>(&mut reader).await,
            Err(FrameError::TooLarge { .. })
        ));
    }
}
