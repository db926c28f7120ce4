//! Length-prefixed text framing for stream transports.
//!
//! Every message on a byte stream is a 4-byte **little-endian** `u32` length
//! prefix followed by that many bytes of UTF-8 text (one JSON message).
//!
//! # Wire format
//!
//! ```text
//! +----------------+------------------+
//! | Length (4B LE) | UTF-8 Payload    |
//! +----------------+------------------+
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use envplay_core::error::TransportError;

use crate::protocol::MAX_MESSAGE_SIZE;

/// Read one framed text message from a stream.
///
/// Returns `Ok(None)` if the stream reaches EOF before a length prefix is
/// read (clean disconnect). Returns an error if the payload exceeds
/// [`MAX_MESSAGE_SIZE`], is truncated, or is not UTF-8.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    String::from_utf8(payload)
        .map(Some)
        .map_err(|_| TransportError::InvalidUtf8)
}

/// Write one framed text message to a stream and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    text: &str,
) -> Result<(), TransportError> {
    let payload = text.as_bytes();
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    // MAX_MESSAGE_SIZE (16 MiB) fits in u32.
    let len = u32::try_from(payload.len())
        .map_err(|_| TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        })?
        .to_le_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;

    #[tokio::test]
    async fn frame_roundtrip() {
        let text = Request::Reset.encode().unwrap();
        let mut buf = Vec::new();
        write_frame(&mut buf, &text).await.unwrap();

        let mut reader = &buf[..];
        let back = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(back, text);
    }

    #[tokio::test]
    async fn length_prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, r#"{"type":"reset"}"#).await.unwrap();

        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn payload_too_large_is_rejected() {
        let fake_len = (u32::try_from(MAX_MESSAGE_SIZE).unwrap() + 1).to_le_bytes();
        let mut reader = &fake_len[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn truncated_payload_is_io_error() {
        let mut data = 10u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"abc");
        let mut reader = &data[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0xff, 0xfe]);
        let mut reader = &data[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUtf8));
    }

    #[tokio::test]
    async fn multiple_frames_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "one").await.unwrap();
        write_frame(&mut buf, "").await.unwrap();
        write_frame(&mut buf, "three").await.unwrap();

        let mut reader = &buf[..];
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some("one"));
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some(""));
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some("three"));
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }
}
