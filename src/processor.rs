//! Message processor: handshake, then the dispatch loop.
//!
//! The [`ProcessorBuilder`] configures limits and builds a
//! [`MessageProcessor`]. [`MessageProcessor::run`] manages the lifecycle:
//! 1. Answer the schema version handshake
//! 2. Spawn the writer task on the output pipe
//! 3. Read messages one at a time and dispatch them
//! 4. Return after acknowledging `Shutdown` and draining the writer
//!
//! `FormatText` runs as its own task so the loop keeps reading; every
//! other message is handled before the next one is read.
//!
//! # Example
//!
//! ```ignore
//! use formatwire_plugin::MessageProcessor;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> formatwire_plugin::Result<()> {
//!     MessageProcessor::builder(MyPlugin)
//!         .build()
//!         .run(tokio::io::stdin(), tokio::io::stdout())
//!         .await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinHandle};

use crate::config::{parse_json_object, parse_override_config, ConfigCache};
use crate::control::{establish_schema_version, DEFAULT_PARENT_CHECK_INTERVAL};
use crate::error::{PluginError, Result};
use crate::handler::{FormatRequest, InFlightGuard, InFlightRegistry, PluginHandler};
use crate::protocol::{
    FormatTextBody, Message, MessageBody, MessageReader, MessageWriter, DEFAULT_MAX_DATA_SIZE,
};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Error text for a `HostFormat` request.
pub const HOST_FORMAT_UNSUPPORTED: &str = "Cannot host format with a plugin.";

/// Error text sent when a format operation ends after being cancelled.
pub const FORMAT_CANCELLED: &str = "Formatting was cancelled.";

/// Builder for configuring and creating a [`MessageProcessor`].
pub struct ProcessorBuilder<H> {
    handler: H,
    max_data_size: u32,
    parent_check_interval: Duration,
}

impl<H: PluginHandler> ProcessorBuilder<H> {
    /// Create a builder for `handler` with default limits.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            max_data_size: DEFAULT_MAX_DATA_SIZE,
            parent_check_interval: DEFAULT_PARENT_CHECK_INTERVAL,
        }
    }

    /// Set the largest accepted length-prefixed block.
    ///
    /// A larger announced length is a fatal protocol error.
    /// Default: 1 GB
    pub fn max_data_size(mut self, size: u32) -> Self {
        self.max_data_size = size;
        self
    }

    /// Set how often the runtime checks that the host is alive.
    ///
    /// Default: 30 seconds
    pub fn parent_check_interval(mut self, interval: Duration) -> Self {
        self.parent_check_interval = interval;
        self
    }

    /// Build the processor.
    pub fn build(self) -> MessageProcessor<H> {
        let handler = Arc::new(self.handler);
        let resolver = handler.clone();
        MessageProcessor {
            configs: ConfigCache::new(move |plugin_config, global_config| {
                resolver.resolve_config(plugin_config, global_config)
            }),
            handler,
            in_flight: InFlightRegistry::new(),
            max_data_size: self.max_data_size,
            parent_check_interval: self.parent_check_interval,
            last_inbound_id: None,
        }
    }
}

/// What the loop does after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Payload of a successful synchronous reply.
enum Reply {
    Success,
    Data(Bytes),
}

/// Plugin-side protocol state: config cache, in-flight operations and
/// the inbound id watermark.
pub struct MessageProcessor<H: PluginHandler> {
    handler: Arc<H>,
    configs: ConfigCache<H::Config>,
    in_flight: InFlightRegistry,
    max_data_size: u32,
    parent_check_interval: Duration,
    last_inbound_id: Option<u32>,
}

impl<H: PluginHandler> MessageProcessor<H> {
    /// Create a processor with default limits.
    pub fn new(handler: H) -> Self {
        ProcessorBuilder::new(handler).build()
    }

    /// Create a new processor builder.
    pub fn builder(handler: H) -> ProcessorBuilder<H> {
        ProcessorBuilder::new(handler)
    }

    /// Registry of running format operations.
    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Configured interval for parent liveness checks.
    pub fn parent_check_interval(&self) -> Duration {
        self.parent_check_interval
    }

    /// Speak the protocol on `reader`/`writer` until `Shutdown`.
    ///
    /// Returns `Ok(())` once the `Shutdown` acknowledgement is on the pipe.
    /// Any error returned is fatal: the stream can no longer be trusted.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = MessageReader::with_max_data_size(reader, self.max_data_size);
        let mut writer = MessageWriter::new(writer);
        establish_schema_version(&mut reader, &mut writer).await?;

        let (outbound, mut writer_task) = spawn_writer_task(writer.into_inner());

        loop {
            let message = tokio::select! {
                biased;
                finished = &mut writer_task => return Err(writer_stopped(finished)),
                message = Message::read(&mut reader) => message?,
            };

            if self.dispatch(message, &outbound)? == Flow::Shutdown {
                outbound.wait_until_idle().await?;
                tracing::debug!("shutdown acknowledged");
                return Ok(());
            }
        }
    }

    /// Handle one inbound message.
    fn dispatch(&mut self, message: Message, outbound: &WriterHandle) -> Result<Flow> {
        let Message { id, body } = message;
        self.observe_inbound_id(id);
        tracing::debug!(id, kind = ?body.kind(), "received message");

        // order these by most common to least common
        match body {
            MessageBody::FormatText(body) => self.start_format(id, body, outbound)?,
            MessageBody::RegisterConfig {
                config_id,
                global_config,
                plugin_config,
            } => {
                let result = parse_json_object(&global_config).and_then(|global_config| {
                    let plugin_config = parse_json_object(&plugin_config)?;
                    self.configs.register(config_id, global_config, plugin_config);
                    Ok(Reply::Success)
                });
                reply(outbound, id, result)?;
            }
            MessageBody::ReleaseConfig { config_id } => {
                let result = self.configs.release(config_id).map(|()| Reply::Success);
                reply(outbound, id, result)?;
            }
            MessageBody::GetConfigDiagnostics { config_id } => {
                let result = self
                    .configs
                    .diagnostics(config_id)
                    .and_then(|diagnostics| to_json(diagnostics));
                reply(outbound, id, result)?;
            }
            MessageBody::GetResolvedConfig { config_id } => {
                let result = self
                    .configs
                    .resolve(config_id, None)
                    .and_then(|config| to_json(&*config));
                reply(outbound, id, result)?;
            }
            MessageBody::CancelFormat {
                original_message_id,
            } => {
                if self.in_flight.cancel(original_message_id) {
                    tracing::debug!(original_message_id, "cancelled format operation");
                } else {
                    tracing::debug!(original_message_id, "cancel for unknown operation ignored");
                }
            }
            MessageBody::GetPluginInfo => {
                let result = to_json(&self.handler.plugin_info());
                reply(outbound, id, result)?;
            }
            MessageBody::GetLicenseText => {
                let license = Bytes::from(self.handler.license_text());
                reply(outbound, id, Ok(Reply::Data(license)))?;
            }
            MessageBody::Shutdown => {
                outbound.send_success(id)?;
                return Ok(Flow::Shutdown);
            }
            MessageBody::Active => outbound.send_success(id)?,
            MessageBody::HostFormat(_) => outbound.send_error(id, HOST_FORMAT_UNSUPPORTED)?,
            MessageBody::Success { .. }
            | MessageBody::DataResponse { .. }
            | MessageBody::ErrorResponse { .. } => {
                // This side never issues requests, so there is nothing to correlate.
                tracing::debug!(id, "ignoring inbound response");
            }
            body @ MessageBody::FormatTextResponse { .. } => {
                tracing::error!(id, kind = ?body.kind(), "unexpected inbound message");
                return Err(PluginError::UnexpectedMessage(body.kind()));
            }
        }
        Ok(Flow::Continue)
    }

    /// Resolve the request and spawn the format operation.
    ///
    /// Config lookup happens here, before spawning, so a later
    /// `ReleaseConfig` cannot race it.
    fn start_format(&mut self, id: u32, body: FormatTextBody, outbound: &WriterHandle) -> Result<()> {
        let guard = self.in_flight.begin(id);
        let request = match self.prepare_format(&body, &guard) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(id, "format request rejected: {}", e);
                return outbound.send_error(id, &e.to_string());
            }
        };

        let handler = self.handler.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            // The guard is held until the terminal message is enqueued and
            // dropped on every exit path, panics included.
            let guard = guard;

            // Run the handler in its own task so a panic becomes an error reply.
            let operation = tokio::spawn(async move { handler.format_text(request).await });
            let outcome = match operation.await {
                Ok(result) => result.map_err(|e| PluginError::Handler(format!("{e:#}"))),
                Err(e) => Err(PluginError::Handler(format!("Formatting panicked: {e}"))),
            };

            let sent = if guard.is_cancelled() {
                outbound.send_error(id, FORMAT_CANCELLED)
            } else {
                match outcome {
                    Ok(text) => outbound.send_format_text_response(id, text),
                    Err(e) => {
                        tracing::warn!(id, "format failed: {}", e);
                        outbound.send_error(id, &e.to_string())
                    }
                }
            };
            if let Err(e) = sent {
                tracing::error!(id, "failed to enqueue format response: {}", e);
            }
        });
        Ok(())
    }

    fn prepare_format(
        &self,
        body: &FormatTextBody,
        guard: &InFlightGuard,
    ) -> Result<FormatRequest<H::Config>> {
        let override_config = parse_override_config(&body.override_config)?;
        let config = self.configs.resolve(body.config_id, override_config.as_ref())?;
        FormatRequest::from_body(body, config, guard.token())
    }

    fn observe_inbound_id(&mut self, id: u32) {
        if let Some(last) = self.last_inbound_id {
            if id <= last {
                tracing::warn!(id, last, "inbound message id did not increase");
            }
        }
        self.last_inbound_id = Some(id);
    }
}

/// Send the outcome of a synchronous request.
///
/// Request failures become an `ErrorResponse`; only a dead writer is
/// returned as an error.
fn reply(outbound: &WriterHandle, id: u32, result: Result<Reply>) -> Result<()> {
    match result {
        Ok(Reply::Success) => outbound.send_success(id),
        Ok(Reply::Data(data)) => outbound.send_data(id, data),
        Err(e) => {
            tracing::warn!(id, "request failed: {}", e);
            outbound.send_error(id, &e.to_string())
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Reply> {
    Ok(Reply::Data(Bytes::from(serde_json::to_vec(value)?)))
}

/// Error for a writer task that ended while the loop still needed it.
fn writer_stopped(finished: std::result::Result<Result<()>, JoinError>) -> PluginError {
    match finished {
        Ok(Err(e)) => e,
        Ok(Ok(())) => PluginError::ConnectionClosed,
        Err(e) => PluginError::Protocol(format!("Writer task failed: {e}")),
    }
}

/// Handle to a processor running in the background, for tests and
/// embedding.
pub fn spawn_processor<H, R, W>(
    processor: MessageProcessor<H>,
    reader: R,
    writer: W,
) -> JoinHandle<Result<()>>
where
    H: PluginHandler,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(processor.run(reader, writer))
}
