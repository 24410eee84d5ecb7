//! Length-prefixed frame transport.
//!
//! The wire is a stream of frames. Every frame starts with an 8-byte prefix:
//!
//! ```text
//! [head length:4 be][body length:4 be][header tail][body]
//! ```
//!
//! The head length counts the prefix itself plus the variable header tail;
//! the body length counts the opaque payload. A reader therefore consumes
//! the prefix and then exactly `head + body - 8` further bytes.

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RpcError;

/// Size of the combined length prefix (head length + body length).
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Upper bound on a single frame. A peer announcing more than this is
/// treated as malformed rather than allocated for.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

fn read_error(err: io::Error) -> RpcError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        RpcError::Truncated
    } else {
        RpcError::Transport(err.to_string())
    }
}

/// Read one full frame from the stream.
///
/// The returned buffer contains the entire frame, length prefix included,
/// so it can be handed straight to `Request::decode` / `Response::decode`.
///
/// Reads until the expected byte count is satisfied; a stream that closes
/// mid-frame yields [`RpcError::Truncated`], any other I/O fault yields
/// [`RpcError::Transport`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut prefix).await.map_err(read_error)?;

    let head_length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let body_length = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;

    if head_length < LENGTH_PREFIX_LEN {
        return Err(RpcError::Protocol(format!(
            "head length {head_length} is shorter than the length prefix"
        )));
    }
    let total = head_length + body_length;
    if total > MAX_FRAME_LEN {
        return Err(RpcError::Protocol(format!(
            "frame of {total} bytes exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }

    let mut frame = vec![0u8; total];
    frame[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
    reader
        .read_exact(&mut frame[LENGTH_PREFIX_LEN..])
        .await
        .map_err(read_error)?;

    Ok(Bytes::from(frame))
}

/// Write one full frame to the stream.
///
/// The buffer must already carry its length prefix. A short write surfaces
/// as [`RpcError::Transport`].
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(frame)
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(head_tail: &[u8], body: &[u8]) -> Vec<u8> {
        let head = LENGTH_PREFIX_LEN + head_tail.len();
        let mut frame = Vec::with_capacity(head + body.len());
        frame.extend_from_slice(&(head as u32).to_be_bytes());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(head_tail);
        frame.extend_from_slice(body);
        frame
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = frame_with(b"header", b"body bytes");

        write_frame(&mut client, &frame).await.unwrap();
        let read = read_frame(&mut server).await.unwrap();

        assert_eq!(&read[..], &frame[..]);
    }

    #[tokio::test]
    async fn test_read_reassembles_split_writes() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = frame_with(b"header", b"a body that arrives in pieces");

        let (first, rest) = frame.split_at(3);
        let first = first.to_vec();
        let rest = rest.to_vec();
        let writer = tokio::spawn(async move {
            client.write_all(&first).await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(&rest).await.unwrap();
        });

        let read = read_frame(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(&read[..], &frame[..]);
    }

    #[tokio::test]
    async fn test_closed_mid_frame_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = frame_with(b"header", b"body");

        client.write_all(&frame[..frame.len() - 2]).await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Truncated));
    }

    #[tokio::test]
    async fn test_closed_before_prefix_is_truncated() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Truncated));
    }

    #[tokio::test]
    async fn test_undersized_head_length_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut frame = frame_with(b"header", b"body");
        frame[..4].copy_from_slice(&3u32.to_be_bytes());

        client.write_all(&frame).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut prefix = Vec::new();
        prefix.extend_from_slice(&32u32.to_be_bytes());
        prefix.extend_from_slice(&(MAX_FRAME_LEN as u32).to_be_bytes());

        client.write_all(&prefix).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }
}
