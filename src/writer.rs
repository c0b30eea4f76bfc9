//! Dedicated writer task for outbound messages.
//!
//! Responses are produced by the dispatch loop and by any number of
//! concurrently running format operations. All of them funnel through a
//! single channel into one task that owns stdout, so messages reach the
//! pipe whole and in enqueue order.
//!
//! # Architecture
//!
//! ```text
//! Dispatch loop ─┐
//! Format op 1   ─┼─► mpsc::UnboundedSender<Command> ─► Writer Task ─► stdout
//! Format op N   ─┘
//! ```
//!
//! Outbound message ids are assigned by the writer task at write time, so
//! ids on the wire always increase in stream order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PluginError, Result};
use crate::protocol::{Message, MessageBody, MessageWriter};

/// Maximum messages to coalesce into a single write.
const MAX_BATCH_SIZE: usize = 64;

/// Work item for the writer task.
#[derive(Debug)]
enum Command {
    /// Write a message with the next outbound id.
    Send(MessageBody),
    /// Reply once everything enqueued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// Monotonic id source for outbound messages, starting at 1.
#[derive(Debug)]
pub struct MessageIdGenerator {
    next: u32,
}

impl MessageIdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Return the next id.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for enqueueing messages on the writer task.
///
/// This is cheaply cloneable and can be shared across format operations.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<Command>,
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Enqueue a message body.
    ///
    /// Never waits. Fails only when the writer task has stopped.
    pub fn send(&self, body: MessageBody) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(Command::Send(body)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            PluginError::ConnectionClosed
        })
    }

    /// Acknowledge a request.
    pub fn send_success(&self, original_message_id: u32) -> Result<()> {
        self.send(MessageBody::Success {
            original_message_id,
        })
    }

    /// Answer a request with raw data.
    pub fn send_data(&self, original_message_id: u32, data: impl Into<Bytes>) -> Result<()> {
        self.send(MessageBody::DataResponse {
            original_message_id,
            data: data.into(),
        })
    }

    /// Answer a request with a JSON document.
    pub fn send_data_json<T: Serialize + ?Sized>(
        &self,
        original_message_id: u32,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_vec(value)?;
        self.send_data(original_message_id, json)
    }

    /// Report a recoverable failure for a request.
    pub fn send_error(&self, original_message_id: u32, message: &str) -> Result<()> {
        self.send(MessageBody::ErrorResponse {
            original_message_id,
            data: Bytes::copy_from_slice(message.as_bytes()),
        })
    }

    /// Answer a format request. `None` means the file is unchanged.
    pub fn send_format_text_response(
        &self,
        original_message_id: u32,
        text: Option<String>,
    ) -> Result<()> {
        self.send(MessageBody::FormatTextResponse {
            original_message_id,
            content: text.map(Bytes::from),
        })
    }

    /// Wait until every message enqueued before this call is on the pipe.
    pub async fn wait_until_idle(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(tx))
            .map_err(|_| PluginError::ConnectionClosed)?;
        rx.await.map_err(|_| PluginError::ConnectionClosed)
    }

    /// Number of enqueued messages not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for enqueueing messages.
///
/// The task ends with `Ok(())` once every handle is dropped, or with the
/// first write error. A write error is fatal: part of a message may
/// already be on the pipe.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };

    let task = tokio::spawn(async move {
        let result = writer_loop(rx, MessageWriter::new(writer), pending).await;
        if let Err(e) = &result {
            tracing::error!("Catastrophic error where the stdout writer failed: {}", e);
        }
        result
    });

    (handle, task)
}

/// Main writer loop - drains commands and writes messages in order.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut writer: MessageWriter<W>,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut ids = MessageIdGenerator::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        let first = match rx.recv().await {
            Some(command) => command,
            None => return Ok(()),
        };

        // Collect additional ready commands (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(command) => batch.push(command),
                Err(_) => break,
            }
        }

        let mut batched = 0;
        for command in batch {
            match command {
                Command::Send(body) => {
                    let message = Message::new(ids.next_id(), body);
                    tracing::trace!(id = message.id, kind = ?message.kind(), "writing message");
                    buf.extend_from_slice(&message.encode()?);
                    batched += 1;
                }
                Command::Flush(done) => {
                    flush_batch(&mut writer, &mut buf, &pending, &mut batched).await?;
                    let _ = done.send(());
                }
            }
        }
        flush_batch(&mut writer, &mut buf, &pending, &mut batched).await?;
    }
}

async fn flush_batch<W>(
    writer: &mut MessageWriter<W>,
    buf: &mut BytesMut,
    pending: &AtomicUsize,
    batched: &mut usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if buf.is_empty() {
        return Ok(());
    }
    writer.write_frame(&buf[..]).await?;
    buf.clear();
    pending.fetch_sub(*batched, Ordering::Release);
    *batched = 0;
    Ok(())
}
