//! Error types for formatwire-plugin.

use thiserror::Error;

use crate::protocol::MessageKind;

/// Main error type for all plugin operations.
///
/// Errors fall in two groups. Fatal errors mean the byte stream can no
/// longer be trusted and the process has to go away. Everything else is
/// scoped to a single request and is reported back to the host as an
/// `ErrorResponse`. See [`PluginError::is_fatal`].
#[derive(Debug, Error)]
pub enum PluginError {
    /// I/O error on one of the stdio pipes (includes short reads/writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The four bytes terminating a message were not all `0xFF`.
    #[error("Catastrophic error. Expected success bytes, but found: {0:?}")]
    SentinelMismatch([u8; 4]),

    /// The envelope carried a kind tag outside the message catalog.
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u32),

    /// A known message arrived that this side never accepts inbound.
    #[error("Unexpected {0:?} message")]
    UnexpectedMessage(MessageKind),

    /// Protocol violation (bad handshake, bad discriminant, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A length-prefixed block announced more bytes than allowed.
    #[error("Variable data of {size} bytes exceeds maximum {max}")]
    DataTooLarge { size: u32, max: u32 },

    /// The host closed a pipe.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No configuration is registered under the given id.
    #[error("Config '{0}' not found")]
    ConfigNotFound(u32),

    /// A request carried data that could not be interpreted.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The formatting handler reported a failure.
    #[error("{0}")]
    Handler(String),
}

impl PluginError {
    /// Whether this error leaves the protocol stream in an unknown state.
    ///
    /// Fatal errors are never converted into responses; they end the
    /// dispatch loop and, through the runtime, the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PluginError::Io(_)
                | PluginError::SentinelMismatch(_)
                | PluginError::UnknownMessageKind(_)
                | PluginError::UnexpectedMessage(_)
                | PluginError::Protocol(_)
                | PluginError::DataTooLarge { .. }
                | PluginError::ConnectionClosed
        )
    }
}

/// Result type alias using PluginError.
pub type Result<T> = std::result::Result<T, PluginError>;
