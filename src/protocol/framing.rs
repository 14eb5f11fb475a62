//! Length-prefixed framing over an async byte stream
//!
//! Frame = `u32` little-endian payload length + payload. A zero-length
//! payload or one above the configured maximum leaves the stream in an
//! unknown state and is reported as a fatal error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::ProtocolError;
use super::messages::NetMessage;

/// Bytes used by the length prefix
pub const LEN_SIZE: usize = 4;

/// Default upper bound for a single payload
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read one payload. Returns `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Vec<u8>>, ProtocolError>
where
	R: AsyncRead + Unpin,
{
	let mut len_buf = [0u8; LEN_SIZE];
	match reader.read_exact(&mut len_buf).await {
		Ok(_) => {}
		Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e.into()),
	}

	let len = u32::from_le_bytes(len_buf) as usize;
	if len == 0 {
		return Err(ProtocolError::EmptyFrame);
	}
	if len > max_frame_size {
		return Err(ProtocolError::FrameTooLarge { size: len, max: max_frame_size });
	}

	let mut payload = vec![0u8; len];
	reader.read_exact(&mut payload).await?;
	Ok(Some(payload))
}

/// Write one payload with its length prefix and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_frame_size: usize) -> Result<(), ProtocolError>
where
	W: AsyncWrite + Unpin,
{
	if payload.is_empty() {
		return Err(ProtocolError::EmptyFrame);
	}
	if payload.len() > max_frame_size {
		return Err(ProtocolError::FrameTooLarge { size: payload.len(), max: max_frame_size });
	}
	let len = payload.len() as u32;
	writer.write_all(&len.to_le_bytes()).await?;
	writer.write_all(payload).await?;
	writer.flush().await?;
	Ok(())
}

/// Read and decode one message. Returns `Ok(None)` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<NetMessage>, ProtocolError>
where
	R: AsyncRead + Unpin,
{
	match read_frame(reader, max_frame_size).await? {
		Some(payload) => Ok(Some(NetMessage::decode(&payload)?)),
		None => Ok(None),
	}
}

/// Encode and write one message
pub async fn write_message<W>(writer: &mut W, msg: &NetMessage, max_frame_size: usize) -> Result<(), ProtocolError>
where
	W: AsyncWrite + Unpin,
{
	let payload = msg.encode()?;
	write_frame(writer, &payload, max_frame_size).await
}


// vim: ts=4
