//! Length-prefixed bincode frames over async streams.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{LENGTH_PREFIX_SIZE, MAX_PAYLOAD_SIZE, TransportError, TransportResult};

/// Encode `msg` as a complete frame: 4-byte big-endian length, then payload.
pub fn encode<T: Serialize + ?Sized>(msg: &T) -> TransportResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| TransportError::serialization_failed(e.to_string()))?;

    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TransportError::message_too_large(
            payload.len(),
            MAX_PAYLOAD_SIZE,
        ));
    }

    let length = u32::try_from(payload.len())
        .map_err(|_| TransportError::message_too_large(payload.len(), MAX_PAYLOAD_SIZE))?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a payload read by [`read_payload`].
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> TransportResult<T> {
    bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map(|(msg, _)| msg)
        .map_err(|e| TransportError::deserialization_failed(e.to_string(), payload.len()))
}

/// Read one frame's payload.
///
/// Returns `Ok(None)` on a clean EOF between frames. EOF inside a frame is
/// [`TransportError::UnexpectedEof`].
pub async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> TransportResult<Option<Vec<u8>>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader
            .read(&mut prefix[filled..])
            .await
            .map_err(|e| TransportError::read_failed(&e))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::unexpected_eof(filled, LENGTH_PREFIX_SIZE));
        }
        filled += n;
    }

    let length = u32::from_be_bytes(prefix);
    if length == 0 {
        return Err(TransportError::invalid_length(0, "zero-length payload"));
    }
    let payload_length = usize::try_from(length).unwrap_or(usize::MAX);
    if payload_length > MAX_PAYLOAD_SIZE {
        return Err(TransportError::invalid_length(
            length,
            format!("exceeds maximum of {MAX_PAYLOAD_SIZE} bytes"),
        ));
    }

    let mut payload = vec![0u8; payload_length];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::unexpected_eof(
                LENGTH_PREFIX_SIZE,
                LENGTH_PREFIX_SIZE + payload_length,
            )
        } else {
            TransportError::read_failed(&e)
        }
    })?;

    Ok(Some(payload))
}

/// Read and decode one frame. `Ok(None)` on a clean EOF.
pub async fn read_frame<R, T>(reader: &mut R) -> TransportResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_payload(reader).await? {
        Some(payload) => decode(&payload).map(Some),
        None => Ok(None),
    }
}

/// Encode, write and flush one frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let frame = encode(msg)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| TransportError::write_failed(&e))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::write_failed(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u64,
        note: String,
    }

    #[tokio::test]
    async fn test_frame_layout() -> TransportResult<()> {
        let frame = encode(&Ping {
            seq: 7,
            note: "hi".to_string(),
        })?;
        let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
        assert_eq!(declared as usize, frame.len() - LENGTH_PREFIX_SIZE);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_then_read_over_duplex() -> TransportResult<()> {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let first = Ping {
            seq: 1,
            note: "one".to_string(),
        };
        let second = Ping {
            seq: 2,
            note: "two".to_string(),
        };
        write_frame(&mut client, &first).await?;
        write_frame(&mut client, &second).await?;
        drop(client);

        assert_eq!(read_frame::<_, Ping>(&mut server).await?, Some(first));
        assert_eq!(read_frame::<_, Ping>(&mut server).await?, Some(second));
        assert_eq!(read_frame::<_, Ping>(&mut server).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_length_rejected() {
        let bytes: &[u8] = &[0, 0, 0, 0];
        let mut reader = bytes;
        let result = read_payload(&mut reader).await;
        assert!(matches!(
            result,
            Err(TransportError::InvalidLength { length: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected() {
        let prefix = u32::try_from(MAX_PAYLOAD_SIZE + 1).unwrap_or(u32::MAX).to_be_bytes();
        let mut reader: &[u8] = &prefix;
        let result = read_payload(&mut reader).await;
        assert!(matches!(result, Err(TransportError::InvalidLength { .. })));
    }

    #[tokio::test]
    async fn test_truncated_frames() {
        let mut partial_prefix: &[u8] = &[0, 0];
        assert_eq!(
            read_payload(&mut partial_prefix).await,
            Err(TransportError::unexpected_eof(2, LENGTH_PREFIX_SIZE))
        );

        let mut partial_payload: &[u8] = &[0, 0, 0, 8, 1, 2];
        assert_eq!(
            read_payload(&mut partial_payload).await,
            Err(TransportError::unexpected_eof(
                LENGTH_PREFIX_SIZE,
                LENGTH_PREFIX_SIZE + 8
            ))
        );
    }

    #[test]
    fn test_oversized_message_rejected_on_encode() {
        let result = encode(&"x".repeat(MAX_PAYLOAD_SIZE + 1));
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_garbage_payload_fails_to_decode() {
        let result: TransportResult<Ping> = decode(&[0xff, 0xff, 0xff]);
        assert!(matches!(
            result,
            Err(TransportError::DeserializationFailed {
                payload_bytes: 3,
                ..
            })
        ));
    }
}
