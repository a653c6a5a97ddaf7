//! Length-prefixed CBOR frames for stream transports

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default maximum frame size (256MB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Read a length-prefixed CBOR frame from an async stream
pub async fn read_frame<T, M>(io: &mut T, max_bytes: usize) -> io::Result<M>
where
    T: AsyncRead + Unpin + Send,
    M: for<'de> Deserialize<'de>,
{
    // Read u32 length prefix (big-endian)
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame size {} exceeds limit {}", len, max_bytes),
        ));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;

    ciborium::from_reader(&buf[..]).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write a length-prefixed CBOR frame to an async stream
pub async fn write_frame<T, M>(io: &mut T, message: &M, max_bytes: usize) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
    M: Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if buf.len() > max_bytes || buf.len() > u32::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame size {} exceeds limit {}", buf.len(), max_bytes),
        ));
    }

    let len = buf.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&buf).await?;
    io.flush().await?;

    Ok(())
}
