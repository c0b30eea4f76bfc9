//! Schema version handshake.
//!
//! ```text
//! host   ──► 0          (schema version request)
//! plugin ◄── 0, 4       (ok, schema version)
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{PluginError, Result};
use crate::protocol::{MessageReader, MessageWriter};

/// The only request the host may open with.
pub const SCHEMA_VERSION_REQUEST: u32 = 0;

/// Protocol schema version spoken by this crate.
pub const SCHEMA_VERSION: u32 = 4;

/// Acknowledgement sent before the schema version.
const ACK: u32 = 0;

/// Answer the host's schema version request.
///
/// Any request other than `0` is fatal.
pub async fn establish_schema_version<R, W>(
    reader: &mut MessageReader<R>,
    writer: &mut MessageWriter<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = reader.read_u32().await?;
    if request != SCHEMA_VERSION_REQUEST {
        return Err(PluginError::Protocol(format!(
            "Expected a schema version request of `0`, got `{request}`"
        )));
    }

    writer.write_u32(ACK).await?;
    writer.write_u32(SCHEMA_VERSION).await?;
    tracing::debug!(version = SCHEMA_VERSION, "schema version established");
    Ok(())
}
