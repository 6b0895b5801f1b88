//! Length-prefixed JSON framing
//!
//! Every frame is `[u32 big-endian length][UTF-8 JSON payload]`. Readers
//! take the fixed prefix first, then exactly `length` payload bytes; the
//! transport's own segmentation is never trusted.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use types::event::FeedEvent;

/// Largest payload a reader accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame of {0} bytes exceeds the 16 MiB limit")]
    FrameTooLarge(usize),

    #[error("stream ended inside a frame")]
    Truncated,

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Control frames sent by the distributor itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Control {
    Welcome { message: String, timestamp: i64 },
}

/// Anything a subscriber can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Control(Control),
    Event(FeedEvent),
}

/// Prefix a payload with its length.
pub fn frame(payload: &[u8]) -> Result<Bytes, WireError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Serialize a value to JSON and frame it.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, WireError> {
    let payload = serde_json::to_vec(value)?;
    frame(&payload)
}

/// Read one raw frame payload.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(WireError::Truncated)
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else {
            WireError::Io(e)
        }
    })?;
    Ok(Some(Bytes::from(payload)))
}

/// Read and decode one message.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ServerMessage>, WireError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::event::OrderEvent;
    use types::order::{EventKind, Side};

    #[test]
    fn test_prefix_is_big_endian() {
        let framed = frame(b"abc").unwrap();
        assert_eq!(&framed[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_welcome_shape() {
        let welcome = Control::Welcome {
            message: "MBO Stream Server".to_string(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&welcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "WELCOME",
                "message": "MBO Stream Server",
                "timestamp": 1_700_000_000_000i64
            })
        );
    }

    #[tokio::test]
    async fn test_reads_frames_across_split_writes() {
        let event: FeedEvent =
            OrderEvent::new(1, EventKind::New, "A", "AAPL", Side::Bid, Decimal::new(10025, 2), 5)
                .into();
        let mut bytes = encode(&event).unwrap().to_vec();
        bytes.extend_from_slice(&encode(&event).unwrap());

        // One byte per read forces the reader to reassemble frames
        let (mut tx, mut rx) = tokio::io::duplex(1);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(&bytes).await.unwrap();
        });

        for _ in 0..2 {
            match read_message(&mut rx).await.unwrap() {
                Some(ServerMessage::Event(e)) => assert_eq!(e, event),
                other => panic!("unexpected {:?}", other),
            }
        }
        writer.await.unwrap();
        assert!(read_message(&mut rx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_oversized_prefix() {
        let prefix = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let mut reader: &[u8] = &prefix;
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(WireError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let mut data = 10u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"abc");
        let mut reader: &[u8] = &data;
        assert!(matches!(read_frame(&mut reader).await, Err(WireError::Truncated)));
    }

    #[test]
    fn test_welcome_decodes_as_control() {
        let raw = r#"{"type":"WELCOME","message":"hi","timestamp":5}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Control(Control::Welcome {
                message: "hi".to_string(),
                timestamp: 5
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_order_frame_is_an_error() {
        let payload = br#"{"type":"CANCEL","order_id":"A","symbol":"AAPL","side":"bid","price":100.0,"size":0}"#;
        let framed = frame(payload).unwrap();
        let mut reader: &[u8] = &framed;
        assert!(matches!(read_message(&mut reader).await, Err(WireError::Json(_))));
    }
}
