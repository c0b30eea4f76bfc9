//! Wire format primitives.
//!
//! Every value on the wire is one of three things:
//! ```text
//! ┌──────────────┬───────────────────────────┬───────────────────┐
//! │ uint32       │ variable data             │ success bytes     │
//! │ 4 bytes BE   │ uint32 BE length + bytes  │ FF FF FF FF       │
//! └──────────────┴───────────────────────────┴───────────────────┘
//! ```
//!
//! [`MessageReader`] and [`MessageWriter`] are the only types that touch
//! the pipes. The `put_*` helpers encode the same primitives into a
//! buffer so a full message can be written with a single `write_all`.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{PluginError, Result};

/// Size in bytes of every integer on the wire.
pub const U32_SIZE: usize = 4;

/// Marker terminating every message.
pub const SUCCESS_BYTES: [u8; 4] = [0xFF; 4];

/// Default maximum length of a single variable data block (1 GB).
pub const DEFAULT_MAX_DATA_SIZE: u32 = 1_073_741_824;

/// Reads protocol primitives from the host's pipe.
pub struct MessageReader<R> {
    inner: R,
    max_data_size: u32,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Create a reader with the default data size limit.
    pub fn new(inner: R) -> Self {
        Self::with_max_data_size(inner, DEFAULT_MAX_DATA_SIZE)
    }

    /// Create a reader with a custom data size limit.
    pub fn with_max_data_size(inner: R, max_data_size: u32) -> Self {
        Self {
            inner,
            max_data_size,
        }
    }

    /// Read a big endian `u32`.
    pub async fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; U32_SIZE];
        self.read_exact(&mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a length-prefixed block. A zero length yields empty bytes.
    pub async fn read_variable_data(&mut self) -> Result<Bytes> {
        let size = self.read_u32().await?;
        if size > self.max_data_size {
            return Err(PluginError::DataTooLarge {
                size,
                max: self.max_data_size,
            });
        }
        if size == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::zeroed(size as usize);
        self.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// Read the four success bytes.
    ///
    /// Anything other than `FF FF FF FF` means reader and writer disagree
    /// about where messages begin.
    pub async fn read_success_bytes(&mut self) -> Result<()> {
        let mut buf = [0u8; U32_SIZE];
        self.read_exact(&mut buf).await?;
        if buf != SUCCESS_BYTES {
            return Err(PluginError::SentinelMismatch(buf));
        }
        Ok(())
    }

    /// Consume the reader, returning the underlying pipe.
    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        // Short reads surface as UnexpectedEof and are fatal.
        self.inner.read_exact(buf).await?;
        Ok(())
    }
}

/// Writes protocol primitives to the host's pipe.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Create a new writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write a big endian `u32` and flush.
    pub async fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_frame(&value.to_be_bytes()).await
    }

    /// Write a length-prefixed block and flush.
    pub async fn write_variable_data(&mut self, data: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(U32_SIZE + data.len());
        put_variable_data(&mut buf, data)?;
        self.write_frame(&buf).await
    }

    /// Write the four success bytes and flush.
    pub async fn write_success_bytes(&mut self) -> Result<()> {
        self.write_frame(&SUCCESS_BYTES).await
    }

    /// Write pre-encoded bytes in full and flush.
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        // write_all turns a zero-length write into WriteZero.
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Consume the writer, returning the underlying pipe.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Append a big endian `u32` to `buf`.
#[inline]
pub fn put_u32(buf: &mut BytesMut, value: u32) {
    buf.put_u32(value);
}

/// Append a length-prefixed block to `buf`.
///
/// Fails if `data` is longer than a `u32` can describe.
pub fn put_variable_data(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        PluginError::Protocol(format!(
            "Variable data of {} bytes does not fit in a u32 length",
            data.len()
        ))
    })?;
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}

/// Append the success bytes to `buf`.
#[inline]
pub fn put_success_bytes(buf: &mut BytesMut) {
    buf.put_slice(&SUCCESS_BYTES);
}
