//! Length-prefixed frame encoding/decoding
//!
//! Wire format: [4-byte big-endian length][payload]
//! Used by the raw TCP listener; WebSocket connections get framing from
//! the WebSocket protocol itself.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

fn closed_on_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

/// Read one length-prefixed frame
///
/// A zero-length frame yields an empty payload. A frame above `max_size`
/// is an error since the stream cannot be resynchronized past it.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_size: u32) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(closed_on_eof)?;

    let len = u32::from_be_bytes(len_buf);
    if len > max_size {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            len, max_size
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(closed_on_eof)?;

    Ok(payload)
}

/// Write one length-prefixed frame
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Protocol(format!("Frame too large: {} bytes", payload.len())))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MAX: u32 = 1024;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"type":"offer"}"#).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let payload = read_frame(&mut cursor, MAX).await.unwrap();
        assert_eq!(payload, br#"{"type":"offer"}"#);
    }

    #[tokio::test]
    async fn test_empty_frame_is_empty_payload() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 0]);
        let payload = read_frame(&mut cursor, MAX).await.unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let len = (MAX + 1).to_be_bytes();
        let mut cursor = Cursor::new(len.to_vec());
        let result = read_frame(&mut cursor, MAX).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(
            read_frame(&mut cursor, MAX).await,
            Err(Error::ConnectionClosed)
        ));

        // Truncated payload
        let mut cursor = Cursor::new(vec![0, 0, 0, 8, b'{']);
        assert!(matches!(
            read_frame(&mut cursor, MAX).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
