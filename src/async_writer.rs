// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Non-blocking buffered writer with a dedicated background drain task.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{IrError, Result};
use crate::record::IrRecord;
use crate::writer::{IrWriter, NdjsonWriter};

/// Callback receiving errors from the background drain task.
pub type ErrorHandler = Arc<dyn Fn(&IrError) + Send + Sync>;

const DEFAULT_BUFFER_SIZE: usize = 100;

enum Command {
    Record(IrRecord),
    Flush(oneshot::Sender<Result<()>>),
}

/// Wraps a synchronous writer behind a bounded channel.
///
/// `write` is non-blocking while the buffer has capacity and blocks on
/// overflow. Errors from the wrapped writer are delivered to the configured
/// error handler; the default handler ignores them.
pub struct AsyncNdjsonWriter {
    tx: Option<mpsc::Sender<Command>>,
    drain: Option<JoinHandle<Box<dyn IrWriter + Send>>>,
    count: Arc<AtomicU64>,
}

/// Configures an [`AsyncNdjsonWriter`] before spawning its drain task.
pub struct AsyncWriterBuilder {
    buffer_size: usize,
    error_handler: ErrorHandler,
}

impl Default for AsyncWriterBuilder {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            error_handler: Arc::new(|_| {}),
        }
    }
}

impl AsyncWriterBuilder {
    /// Channel capacity; `write` blocks once this many records are pending.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    /// Spawn the drain task around the given writer.
    pub fn spawn(self, writer: Box<dyn IrWriter + Send>) -> AsyncNdjsonWriter {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let count = Arc::new(AtomicU64::new(0));
        let drain = tokio::spawn(drain_loop(writer, rx, self.error_handler, count.clone()));

        AsyncNdjsonWriter {
            tx: Some(tx),
            drain: Some(drain),
            count,
        }
    }
}

async fn drain_loop(
    mut writer: Box<dyn IrWriter + Send>,
    mut rx: mpsc::Receiver<Command>,
    on_error: ErrorHandler,
    count: Arc<AtomicU64>,
) -> Box<dyn IrWriter + Send> {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Record(record) => match writer.write(record).await {
                Ok(()) => {
                    count.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => on_error(&e),
            },
            Command::Flush(resp) => {
                // Commands are processed in order, so everything enqueued
                // before the barrier has already been written.
                let _ = resp.send(writer.flush().await);
            }
        }
    }
    writer
}

impl AsyncNdjsonWriter {
    /// Wrap an existing writer with default options.
    pub fn new(writer: Box<dyn IrWriter + Send>) -> Self {
        AsyncWriterBuilder::default().spawn(writer)
    }

    pub fn builder() -> AsyncWriterBuilder {
        AsyncWriterBuilder::default()
    }

    /// Create an async writer streaming to a plain NDJSON file.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let writer = NdjsonWriter::create(path).await?;
        Ok(Self::new(Box::new(writer)))
    }

    /// Number of records the drain task has written so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IrWriter for AsyncNdjsonWriter {
    async fn write(&mut self, record: IrRecord) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(IrError::ChannelClosed)?;
        tx.send(Command::Record(record))
            .await
            .map_err(|_| IrError::ChannelClosed)
    }

    async fn flush(&mut self) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(IrError::ChannelClosed)?;
        let (resp_tx, resp_rx) = oneshot::channel();
        tx.send(Command::Flush(resp_tx))
            .await
            .map_err(|_| IrError::ChannelClosed)?;
        resp_rx.await.map_err(|_| IrError::ChannelClosed)?
    }

    async fn close(&mut self) -> Result<()> {
        // Sealing the channel lets the drain task finish its backlog.
        self.tx = None;

        let Some(drain) = self.drain.take() else {
            return Ok(());
        };

        match drain.await {
            Ok(mut writer) => writer.close().await,
            Err(e) => {
                tracing::warn!(%e, "async writer drain task failed");
                Err(IrError::ChannelClosed)
            }
        }
    }
}
