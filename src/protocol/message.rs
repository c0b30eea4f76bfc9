//! Message catalog.
//!
//! Every message is an envelope followed by a kind-specific body and the
//! success bytes:
//! ```text
//! ┌────────────┬──────────┬──────────────────┬─────────────┐
//! │ Message ID │ Kind     │ Body (per kind)  │ FF FF FF FF │
//! │ uint32 BE  │ uint32 BE│                  │             │
//! └────────────┴──────────┴──────────────────┴─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use formatwire_plugin::protocol::{Message, MessageBody, MessageKind};
//!
//! let message = Message::new(3, MessageBody::Success { original_message_id: 1 });
//! let bytes = message.encode().unwrap();
//! assert_eq!(message.kind(), MessageKind::Success);
//! assert_eq!(bytes.len(), 4 + 4 + 4 + 4);
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use super::wire_format::{
    put_success_bytes, put_u32, put_variable_data, MessageReader, MessageWriter,
};
use crate::error::{PluginError, Result};

/// Kind tag carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    Success = 0,
    DataResponse = 1,
    ErrorResponse = 2,
    Shutdown = 3,
    Active = 4,
    GetPluginInfo = 5,
    GetLicenseText = 6,
    RegisterConfig = 7,
    ReleaseConfig = 8,
    GetConfigDiagnostics = 9,
    GetResolvedConfig = 10,
    FormatText = 11,
    FormatTextResponse = 12,
    CancelFormat = 13,
    HostFormat = 14,
}

impl MessageKind {
    /// All kinds in tag order.
    pub const ALL: [MessageKind; 15] = [
        MessageKind::Success,
        MessageKind::DataResponse,
        MessageKind::ErrorResponse,
        MessageKind::Shutdown,
        MessageKind::Active,
        MessageKind::GetPluginInfo,
        MessageKind::GetLicenseText,
        MessageKind::RegisterConfig,
        MessageKind::ReleaseConfig,
        MessageKind::GetConfigDiagnostics,
        MessageKind::GetResolvedConfig,
        MessageKind::FormatText,
        MessageKind::FormatTextResponse,
        MessageKind::CancelFormat,
        MessageKind::HostFormat,
    ];

    /// Wire tag for this kind.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = PluginError;

    fn try_from(tag: u32) -> Result<Self> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(PluginError::UnknownMessageKind(tag))
    }
}

/// Body shared by `FormatText` and `HostFormat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTextBody {
    /// UTF-8 file path.
    pub file_path: Bytes,
    /// Start of the range to format, in bytes into `file_text`.
    pub start_byte_index: u32,
    /// End of the range to format, in bytes into `file_text`.
    pub end_byte_index: u32,
    /// Id of a previously registered configuration.
    pub config_id: u32,
    /// JSON object overlaid on the plugin config. May be empty.
    pub override_config: Bytes,
    /// UTF-8 file contents.
    pub file_text: Bytes,
}

impl FormatTextBody {
    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        put_variable_data(buf, &self.file_path)?;
        put_u32(buf, self.start_byte_index);
        put_u32(buf, self.end_byte_index);
        put_u32(buf, self.config_id);
        put_variable_data(buf, &self.override_config)?;
        put_variable_data(buf, &self.file_text)
    }

    async fn read_from<R: AsyncRead + Unpin>(reader: &mut MessageReader<R>) -> Result<Self> {
        Ok(Self {
            file_path: reader.read_variable_data().await?,
            start_byte_index: reader.read_u32().await?,
            end_byte_index: reader.read_u32().await?,
            config_id: reader.read_u32().await?,
            override_config: reader.read_variable_data().await?,
            file_text: reader.read_variable_data().await?,
        })
    }
}

/// Kind-specific message contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Success {
        original_message_id: u32,
    },
    DataResponse {
        original_message_id: u32,
        data: Bytes,
    },
    ErrorResponse {
        original_message_id: u32,
        data: Bytes,
    },
    Shutdown,
    /// Liveness probe.
    Active,
    GetPluginInfo,
    GetLicenseText,
    RegisterConfig {
        config_id: u32,
        global_config: Bytes,
        plugin_config: Bytes,
    },
    ReleaseConfig {
        config_id: u32,
    },
    GetConfigDiagnostics {
        config_id: u32,
    },
    GetResolvedConfig {
        config_id: u32,
    },
    FormatText(FormatTextBody),
    /// `content` is `None` when the file was left unchanged.
    FormatTextResponse {
        original_message_id: u32,
        content: Option<Bytes>,
    },
    CancelFormat {
        original_message_id: u32,
    },
    HostFormat(FormatTextBody),
}

impl MessageBody {
    /// Kind tag for this body.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Success { .. } => MessageKind::Success,
            MessageBody::DataResponse { .. } => MessageKind::DataResponse,
            MessageBody::ErrorResponse { .. } => MessageKind::ErrorResponse,
            MessageBody::Shutdown => MessageKind::Shutdown,
            MessageBody::Active => MessageKind::Active,
            MessageBody::GetPluginInfo => MessageKind::GetPluginInfo,
            MessageBody::GetLicenseText => MessageKind::GetLicenseText,
            MessageBody::RegisterConfig { .. } => MessageKind::RegisterConfig,
            MessageBody::ReleaseConfig { .. } => MessageKind::ReleaseConfig,
            MessageBody::GetConfigDiagnostics { .. } => MessageKind::GetConfigDiagnostics,
            MessageBody::GetResolvedConfig { .. } => MessageKind::GetResolvedConfig,
            MessageBody::FormatText(_) => MessageKind::FormatText,
            MessageBody::FormatTextResponse { .. } => MessageKind::FormatTextResponse,
            MessageBody::CancelFormat { .. } => MessageKind::CancelFormat,
            MessageBody::HostFormat(_) => MessageKind::HostFormat,
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            MessageBody::Shutdown
            | MessageBody::Active
            | MessageBody::GetPluginInfo
            | MessageBody::GetLicenseText => {}
            MessageBody::Success {
                original_message_id,
            }
            | MessageBody::CancelFormat {
                original_message_id,
            } => put_u32(buf, *original_message_id),
            MessageBody::DataResponse {
                original_message_id,
                data,
            }
            | MessageBody::ErrorResponse {
                original_message_id,
                data,
            } => {
                put_u32(buf, *original_message_id);
                put_variable_data(buf, data)?;
            }
            MessageBody::RegisterConfig {
                config_id,
                global_config,
                plugin_config,
            } => {
                put_u32(buf, *config_id);
                put_variable_data(buf, global_config)?;
                put_variable_data(buf, plugin_config)?;
            }
            MessageBody::ReleaseConfig { config_id }
            | MessageBody::GetConfigDiagnostics { config_id }
            | MessageBody::GetResolvedConfig { config_id } => put_u32(buf, *config_id),
            MessageBody::FormatText(body) | MessageBody::HostFormat(body) => {
                body.encode_into(buf)?;
            }
            MessageBody::FormatTextResponse {
                original_message_id,
                content,
            } => {
                put_u32(buf, *original_message_id);
                match content {
                    None => put_u32(buf, 0),
                    Some(content) => {
                        put_u32(buf, 1);
                        put_variable_data(buf, content)?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn read_from<R: AsyncRead + Unpin>(
        kind: MessageKind,
        reader: &mut MessageReader<R>,
    ) -> Result<Self> {
        let body = match kind {
            MessageKind::Success => MessageBody::Success {
                original_message_id: reader.read_u32().await?,
            },
            MessageKind::DataResponse => MessageBody::DataResponse {
                original_message_id: reader.read_u32().await?,
                data: reader.read_variable_data().await?,
            },
            MessageKind::ErrorResponse => MessageBody::ErrorResponse {
                original_message_id: reader.read_u32().await?,
                data: reader.read_variable_data().await?,
            },
            MessageKind::Shutdown => MessageBody::Shutdown,
            MessageKind::Active => MessageBody::Active,
            MessageKind::GetPluginInfo => MessageBody::GetPluginInfo,
            MessageKind::GetLicenseText => MessageBody::GetLicenseText,
            MessageKind::RegisterConfig => MessageBody::RegisterConfig {
                config_id: reader.read_u32().await?,
                global_config: reader.read_variable_data().await?,
                plugin_config: reader.read_variable_data().await?,
            },
            MessageKind::ReleaseConfig => MessageBody::ReleaseConfig {
                config_id: reader.read_u32().await?,
            },
            MessageKind::GetConfigDiagnostics => MessageBody::GetConfigDiagnostics {
                config_id: reader.read_u32().await?,
            },
            MessageKind::GetResolvedConfig => MessageBody::GetResolvedConfig {
                config_id: reader.read_u32().await?,
            },
            MessageKind::FormatText => {
                MessageBody::FormatText(FormatTextBody::read_from(reader).await?)
            }
            MessageKind::FormatTextResponse => {
                let original_message_id = reader.read_u32().await?;
                let content = match reader.read_u32().await? {
                    0 => None,
                    1 => Some(reader.read_variable_data().await?),
                    other => {
                        return Err(PluginError::Protocol(format!(
                            "Unknown format text response discriminant: {other}"
                        )))
                    }
                };
                MessageBody::FormatTextResponse {
                    original_message_id,
                    content,
                }
            }
            MessageKind::CancelFormat => MessageBody::CancelFormat {
                original_message_id: reader.read_u32().await?,
            },
            MessageKind::HostFormat => {
                MessageBody::HostFormat(FormatTextBody::read_from(reader).await?)
            }
        };
        Ok(body)
    }
}

/// A complete message: envelope plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Id assigned by the sender of this message.
    pub id: u32,
    /// Kind-specific contents.
    pub body: MessageBody,
}

impl Message {
    /// Create a new message.
    pub fn new(id: u32, body: MessageBody) -> Self {
        Self { id, body }
    }

    /// Kind tag of this message.
    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Encode envelope, body and success bytes into one buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        put_u32(&mut buf, self.id);
        put_u32(&mut buf, self.kind().as_u32());
        self.body.encode_into(&mut buf)?;
        put_success_bytes(&mut buf);
        Ok(buf.freeze())
    }

    /// Write the full message to `writer`.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut MessageWriter<W>) -> Result<()> {
        let bytes = self.encode()?;
        writer.write_frame(&bytes).await
    }

    /// Read one full message from `reader`.
    ///
    /// End of stream before the first envelope byte is reported as
    /// [`PluginError::ConnectionClosed`].
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut MessageReader<R>) -> Result<Self> {
        let id = match reader.read_u32().await {
            Ok(id) => id,
            Err(PluginError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(PluginError::ConnectionClosed)
            }
            Err(e) => return Err(e),
        };
        let kind = MessageKind::try_from(reader.read_u32().await?)?;
        let body = MessageBody::read_from(kind, reader).await?;
        reader.read_success_bytes().await?;
        Ok(Self { id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    async fn decode(bytes: &[u8]) -> Result<Message> {
        let mut reader = MessageReader::new(Cursor::new(bytes.to_vec()));
        Message::read(&mut reader).await
    }

    fn format_body() -> FormatTextBody {
        FormatTextBody {
            file_path: Bytes::from_static(b"/src/main.ts"),
            start_byte_index: 0,
            end_byte_index: 5,
            config_id: 2,
            override_config: Bytes::from_static(b"{\"lineWidth\":80}"),
            file_text: Bytes::from_static(b"const"),
        }
    }

    #[test]
    fn test_kind_tags() {
        for (tag, kind) in MessageKind::ALL.iter().enumerate() {
            assert_eq!(kind.as_u32(), tag as u32);
            assert_eq!(MessageKind::try_from(tag as u32).unwrap(), *kind);
        }
        assert_eq!(MessageKind::FormatText.as_u32(), 11);
        assert_eq!(MessageKind::HostFormat.as_u32(), 14);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = MessageKind::try_from(15).unwrap_err();
        assert!(matches!(err, PluginError::UnknownMessageKind(15)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_success_layout() {
        let bytes = Message::new(1, MessageBody::Success { original_message_id: 9 })
            .encode()
            .unwrap();
        assert_eq!(
            &bytes[..],
            &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 9, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_format_text_field_order() {
        let bytes = Message::new(7, MessageBody::FormatText(format_body()))
            .encode()
            .unwrap();

        let mut expected = vec![0, 0, 0, 7, 0, 0, 0, 11];
        expected.extend_from_slice(&12u32.to_be_bytes());
        expected.extend_from_slice(b"/src/main.ts");
        expected.extend_from_slice(&0u32.to_be_bytes());
        expected.extend_from_slice(&5u32.to_be_bytes());
        expected.extend_from_slice(&2u32.to_be_bytes());
        expected.extend_from_slice(&16u32.to_be_bytes());
        expected.extend_from_slice(b"{\"lineWidth\":80}");
        expected.extend_from_slice(&5u32.to_be_bytes());
        expected.extend_from_slice(b"const");
        expected.extend_from_slice(&[0xFF; 4]);
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_format_text_response_discriminant() {
        let unchanged = Message::new(
            2,
            MessageBody::FormatTextResponse {
                original_message_id: 4,
                content: None,
            },
        )
        .encode()
        .unwrap();
        assert_eq!(&unchanged[8..16], &[0, 0, 0, 4, 0, 0, 0, 0]);
        assert_eq!(unchanged.len(), 20);

        let changed = Message::new(
            2,
            MessageBody::FormatTextResponse {
                original_message_id: 4,
                content: Some(Bytes::from_static(b"x")),
            },
        )
        .encode()
        .unwrap();
        assert_eq!(&changed[8..21], &[0, 0, 0, 4, 0, 0, 0, 1, 0, 0, 0, 1, b'x']);
    }

    #[tokio::test]
    async fn test_decode_bad_format_response_discriminant() {
        let bytes = [0, 0, 0, 1, 0, 0, 0, 12, 0, 0, 0, 4, 0, 0, 0, 2, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decode(&bytes).await.unwrap_err();
        assert!(matches!(err, PluginError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_decode_unknown_kind_is_fatal() {
        let bytes = [0, 0, 0, 1, 0, 0, 0, 99, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decode(&bytes).await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownMessageKind(99)));
    }

    #[tokio::test]
    async fn test_decode_empty_stream_is_connection_closed() {
        let err = decode(&[]).await.unwrap_err();
        assert!(matches!(err, PluginError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_corrupted_sentinel_after_valid_message() {
        let valid = Message::new(5, MessageBody::RegisterConfig {
            config_id: 1,
            global_config: Bytes::from_static(b"{}"),
            plugin_config: Bytes::from_static(b"{}"),
        })
        .encode()
        .unwrap();

        for offset in 1..=4 {
            let mut corrupted = valid.to_vec();
            let index = corrupted.len() - offset;
            corrupted[index] = 0x00;
            let err = decode(&corrupted).await.unwrap_err();
            assert!(matches!(err, PluginError::SentinelMismatch(_)), "offset {offset}");
        }
    }

    #[tokio::test]
    async fn test_host_format_shares_format_text_layout() {
        let format = Message::new(3, MessageBody::FormatText(format_body())).encode().unwrap();
        let host = Message::new(3, MessageBody::HostFormat(format_body())).encode().unwrap();
        assert_eq!(&format[8..], &host[8..]);
        assert_eq!(decode(&host).await.unwrap().kind(), MessageKind::HostFormat);
    }

    #[tokio::test]
    async fn test_decode_back_to_back_messages() {
        let mut bytes = Message::new(1, MessageBody::Active).encode().unwrap().to_vec();
        bytes.extend_from_slice(&Message::new(2, MessageBody::Shutdown).encode().unwrap());

        let mut reader = MessageReader::new(Cursor::new(bytes));
        assert_eq!(Message::read(&mut reader).await.unwrap().body, MessageBody::Active);
        let second = Message::read(&mut reader).await.unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.body, MessageBody::Shutdown);
    }

    fn blob() -> impl Strategy<Value = Bytes> {
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Bytes::from)
    }

    fn int() -> impl Strategy<Value = u32> {
        prop_oneof![Just(0u32), Just(u32::MAX), any::<u32>()]
    }

    fn format_body_strategy() -> impl Strategy<Value = FormatTextBody> {
        (blob(), int(), int(), int(), blob(), blob()).prop_map(
            |(file_path, start_byte_index, end_byte_index, config_id, override_config, file_text)| {
                FormatTextBody {
                    file_path,
                    start_byte_index,
                    end_byte_index,
                    config_id,
                    override_config,
                    file_text,
                }
            },
        )
    }

    fn body_strategy() -> impl Strategy<Value = MessageBody> {
        prop_oneof![
            int().prop_map(|original_message_id| MessageBody::Success { original_message_id }),
            (int(), blob()).prop_map(|(original_message_id, data)| MessageBody::DataResponse {
                original_message_id,
                data
            }),
            (int(), blob()).prop_map(|(original_message_id, data)| MessageBody::ErrorResponse {
                original_message_id,
                data
            }),
            Just(MessageBody::Shutdown),
            Just(MessageBody::Active),
            Just(MessageBody::GetPluginInfo),
            Just(MessageBody::GetLicenseText),
            (int(), blob(), blob()).prop_map(|(config_id, global_config, plugin_config)| {
                MessageBody::RegisterConfig {
                    config_id,
                    global_config,
                    plugin_config,
                }
            }),
            int().prop_map(|config_id| MessageBody::ReleaseConfig { config_id }),
            int().prop_map(|config_id| MessageBody::GetConfigDiagnostics { config_id }),
            int().prop_map(|config_id| MessageBody::GetResolvedConfig { config_id }),
            format_body_strategy().prop_map(MessageBody::FormatText),
            (int(), proptest::option::of(blob())).prop_map(|(original_message_id, content)| {
                MessageBody::FormatTextResponse {
                    original_message_id,
                    content,
                }
            }),
            int().prop_map(|original_message_id| MessageBody::CancelFormat { original_message_id }),
            format_body_strategy().prop_map(MessageBody::HostFormat),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn roundtrip_every_kind(id in int(), body in body_strategy()) {
            let message = Message::new(id, body);
            let bytes = message.encode().unwrap_or_else(|e| panic!("encode failed: {e}"));

            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap_or_else(|e| panic!("runtime: {e}"));
            let decoded = runtime
                .block_on(decode(&bytes))
                .unwrap_or_else(|e| panic!("decode failed: {e}"));
            prop_assert_eq!(decoded, message);
        }
    }
}
