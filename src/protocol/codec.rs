//! Length-prefixed MessagePack framing.
//!
//! Every message on the wire is a 4-byte big-endian payload length followed by
//! the `rmp-serde` encoding of the value. One `encode` produces exactly one frame
//! and one `read_frame` consumes exactly one frame, however the bytes were split
//! by the transport.

use crate::core::{MarineError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on a single payload. Anything larger is treated as a protocol error.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Initial receive capacity, the same class as the historical fixed buffer.
pub const RECEIVE_BUFFER_CAPACITY: usize = 8192;

/// Encode a value into one complete frame (header + payload).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(value)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(MarineError::protocol(format!(
            "message too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode one payload (without its header).
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(payload)?)
}

fn payload_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(MarineError::protocol(format!(
            "message too large: {} bytes (max {})",
            len, MAX_FRAME_LEN
        )));
    }
    Ok(len)
}

fn buffered_payload_len(buf: &[u8]) -> Result<Option<usize>> {
    match buf {
        [a, b, c, d, ..] => payload_len([*a, *b, *c, *d]).map(Some),
        _ => Ok(None),
    }
}

/// True once `buf` starts with a whole frame, or with a header that no frame
/// can satisfy (taking it then reports the protocol error).
pub fn has_frame(buf: &[u8]) -> bool {
    match buffered_payload_len(buf) {
        Ok(Some(len)) => buf.len() >= FRAME_HEADER_LEN + len,
        Ok(None) => false,
        Err(_) => true,
    }
}

/// Splits the first frame's payload off the front of `buf`. `Ok(None)` while
/// the frame is still incomplete.
pub fn take_frame(buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>> {
    let Some(len) = buffered_payload_len(buf)? else {
        return Ok(None);
    };
    let end = FRAME_HEADER_LEN + len;
    if buf.len() < end {
        return Ok(None);
    }
    let payload = buf[FRAME_HEADER_LEN..end].to_vec();
    buf.drain(..end);
    Ok(Some(payload))
}

/// Read one frame payload. Returns `Ok(None)` when the peer closed the stream
/// cleanly before a new frame started.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = payload_len(header)?;
    let mut payload = Vec::with_capacity(len.min(RECEIVE_BUFFER_CAPACITY));
    payload.resize(len, 0);
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one already-encoded frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode and send a value as one frame.
pub async fn send<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode(value)?;
    write_frame(writer, &frame).await
}

/// Receive and decode one value. A closed stream is reported as a connection error.
pub async fn receive<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(payload) => decode(&payload),
        None => Err(MarineError::Connection("peer closed the connection".into())),
    }
}
