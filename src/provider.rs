// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Symmetric reader/writer factories for NDJSON, gzip, object-store and
//! in-memory channel media.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{IrError, Result};
use crate::reader::{ChannelReader, GzipNdjsonReader, IrReader, NdjsonReader};
use crate::record::IrRecord;
use crate::writer::{ChannelWriter, CompressionLevel, GzipNdjsonWriter, IrWriter, NdjsonWriter};

/// Factory pair producing readers and writers for a storage medium.
///
/// Path interpretation depends on the provider; creation checks the
/// cancellation context before allocating resources.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrWriter + Send>>;

    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrReader + Send>>;
}

/// Providers that can also wrap raw byte streams.
pub trait StreamProvider: Send + Sync {
    fn new_stream_writer(
        &self,
        w: Box<dyn AsyncWrite + Unpin + Send>,
    ) -> Result<Box<dyn IrWriter + Send>>;

    fn new_stream_reader(
        &self,
        r: Box<dyn AsyncBufRead + Unpin + Send>,
    ) -> Result<Box<dyn IrReader + Send>>;
}

fn check_cancelled(ctx: &CancellationToken) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(IrError::Cancelled);
    }
    Ok(())
}

/// Plain NDJSON files.
#[derive(Debug, Default, Clone)]
pub struct NdjsonProvider;

impl NdjsonProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for NdjsonProvider {
    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrWriter + Send>> {
        check_cancelled(ctx)?;
        Ok(Box::new(NdjsonWriter::create(path).await?))
    }

    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrReader + Send>> {
        check_cancelled(ctx)?;
        Ok(Box::new(NdjsonReader::open(path).await?))
    }
}

impl StreamProvider for NdjsonProvider {
    fn new_stream_writer(
        &self,
        w: Box<dyn AsyncWrite + Unpin + Send>,
    ) -> Result<Box<dyn IrWriter + Send>> {
        Ok(Box::new(NdjsonWriter::new(w)))
    }

    fn new_stream_reader(
        &self,
        r: Box<dyn AsyncBufRead + Unpin + Send>,
    ) -> Result<Box<dyn IrReader + Send>> {
        Ok(Box::new(NdjsonReader::new(r)))
    }
}

/// Gzip-compressed NDJSON files.
#[derive(Debug, Default, Clone)]
pub struct GzipNdjsonProvider {
    level: CompressionLevel,
}

impl GzipNdjsonProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the level eagerly so misconfiguration surfaces at
    /// construction rather than on first write.
    pub fn with_level(level: CompressionLevel) -> Result<Self> {
        level.resolve()?;
        Ok(Self { level })
    }
}

#[async_trait]
impl Provider for GzipNdjsonProvider {
    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrWriter + Send>> {
        check_cancelled(ctx)?;
        Ok(Box::new(
            GzipNdjsonWriter::create_with_level(path, self.level).await?,
        ))
    }

    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrReader + Send>> {
        check_cancelled(ctx)?;
        Ok(Box::new(GzipNdjsonReader::open(path).await?))
    }
}

impl StreamProvider for GzipNdjsonProvider {
    fn new_stream_writer(
        &self,
        w: Box<dyn AsyncWrite + Unpin + Send>,
    ) -> Result<Box<dyn IrWriter + Send>> {
        Ok(Box::new(GzipNdjsonWriter::with_level(w, self.level)?))
    }

    fn new_stream_reader(
        &self,
        r: Box<dyn AsyncBufRead + Unpin + Send>,
    ) -> Result<Box<dyn IrReader + Send>> {
        Ok(Box::new(GzipNdjsonReader::new(r)))
    }
}

/// External byte-stream backend for object stores.
///
/// Cloud implementations live outside this crate; [`FsBackend`] ships for
/// tests and local use.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>>;

    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Box<dyn AsyncWrite + Unpin + Send>>;

    async fn close(&self) -> Result<()>;
}

/// Local-directory storage backend; keys resolve below the root.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        check_cancelled(ctx)?;
        let f = tokio::fs::File::open(self.root.join(key)).await?;
        Ok(Box::new(f))
    }

    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
        check_cancelled(ctx)?;
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let f = tokio::fs::File::create(path).await?;
        Ok(Box::new(f))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Delegates to a [`StorageBackend`], auto-selecting gzip from a `.gz`
/// suffix on the key.
pub struct StorageProvider {
    backend: Arc<dyn StorageBackend>,
}

impl StorageProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}

#[async_trait]
impl Provider for StorageProvider {
    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrWriter + Send>> {
        check_cancelled(ctx)?;
        let stream = self.backend.new_writer(ctx, path).await?;
        if path.to_ascii_lowercase().ends_with(".gz") {
            Ok(Box::new(GzipNdjsonWriter::new(stream)))
        } else {
            Ok(Box::new(NdjsonWriter::new(stream)))
        }
    }

    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        path: &str,
    ) -> Result<Box<dyn IrReader + Send>> {
        check_cancelled(ctx)?;
        let stream = self.backend.new_reader(ctx, path).await?;
        if path.to_ascii_lowercase().ends_with(".gz") {
            Ok(Box::new(GzipNdjsonReader::new(BufReader::new(stream))))
        } else {
            Ok(Box::new(NdjsonReader::new(BufReader::new(stream))))
        }
    }
}

/// Connects writers and readers through a shared in-memory channel.
///
/// The path argument is ignored. The reader end is single-consumer and is
/// handed out by the first `new_reader` call; writers may be created freely
/// and share the channel.
pub struct ChannelProvider {
    tx: mpsc::Sender<IrRecord>,
    rx: Mutex<Option<mpsc::Receiver<IrRecord>>>,
}

impl ChannelProvider {
    /// A buffer of zero behaves as an unbuffered hand-off (capacity one).
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Connect to an externally-created channel.
    pub fn from_channel(tx: mpsc::Sender<IrRecord>, rx: mpsc::Receiver<IrRecord>) -> Self {
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// A sender on the shared channel, for direct hand-offs.
    pub fn sender(&self) -> mpsc::Sender<IrRecord> {
        self.tx.clone()
    }
}

#[async_trait]
impl Provider for ChannelProvider {
    async fn new_writer(
        &self,
        ctx: &CancellationToken,
        _path: &str,
    ) -> Result<Box<dyn IrWriter + Send>> {
        check_cancelled(ctx)?;
        Ok(Box::new(ChannelWriter::new(self.tx.clone())))
    }

    async fn new_reader(
        &self,
        ctx: &CancellationToken,
        _path: &str,
    ) -> Result<Box<dyn IrReader + Send>> {
        check_cancelled(ctx)?;
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or(IrError::ChannelClosed)?;
        Ok(Box::new(ChannelReader::new(rx)))
    }
}
