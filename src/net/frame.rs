//! Message framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: payload length][N bytes: UTF-8 markup of one invoke]
//! ```

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Prefix `payload` with its length
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::structural(format!("frame of {} bytes exceeds the length field", payload.len())))?;

    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Read one frame's payload
///
/// Returns `None` when the peer closed the stream between frames.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; HEADER_LEN];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    check_len(len, max_len)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Disconnected(format!("stream closed inside a {} byte frame", len))
        } else {
            e.into()
        }
    })?;
    Ok(Some(payload))
}

/// Write one framed payload and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = encode_frame(payload)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

fn check_len(len: usize, max_len: usize) -> Result<()> {
    if len > max_len {
        return Err(Error::structural(format!(
            "frame too large: {} bytes (max {})",
            len, max_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prefix() {
        let framed = encode_frame(b"<invoke/>").unwrap();
        assert_eq!(&framed[..4], &9u32.to_le_bytes());
        assert_eq!(&framed[4..], b"<invoke/>");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client.write_all(&encode_frame(&[b'x'; 64]).unwrap()).await.unwrap();

        assert!(matches!(read_frame(&mut server, 63).await, Err(Error::Structural(_))));
    }

    #[tokio::test]
    async fn test_async_read_write() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, b"<invoke listener=\"a\"/>").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();
        drop(client);

        assert_eq!(
            read_frame(&mut server, 1024).await.unwrap().unwrap(),
            b"<invoke listener=\"a\"/>"
        );
        assert_eq!(read_frame(&mut server, 1024).await.unwrap().unwrap(), b"");
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_disconnect() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let framed = encode_frame(b"truncated").unwrap();
        client.write_all(&framed[..8]).await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server, 1024).await,
            Err(Error::Disconnected(_))
        ));
    }
}
