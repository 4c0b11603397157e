// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Streaming IR record writers: NDJSON, gzip, fan-out and channel-backed.

use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, Mutex};

use crate::error::{IrError, Result};
use crate::record::{Batch, IrRecord};

/// Streaming writer over IR records.
///
/// `close` is idempotent; writes after close fail.
#[async_trait]
pub trait IrWriter: Send {
    /// Write a single record. May block on backpressure.
    async fn write(&mut self, record: IrRecord) -> Result<()>;

    /// Complete all pending work.
    async fn flush(&mut self) -> Result<()>;

    /// Flush and release resources.
    async fn close(&mut self) -> Result<()>;
}

/// Gzip compression level for compressed writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Library default.
    Default,
    /// Favor speed over ratio.
    Fastest,
    /// Favor ratio over speed.
    Best,
    /// Store without compression.
    None,
    /// Explicit level, 1 through 9.
    Precise(i32),
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::Default
    }
}

impl CompressionLevel {
    pub(crate) fn resolve(self) -> Result<async_compression::Level> {
        match self {
            CompressionLevel::Default => Ok(async_compression::Level::Default),
            CompressionLevel::Fastest => Ok(async_compression::Level::Fastest),
            CompressionLevel::Best => Ok(async_compression::Level::Best),
            CompressionLevel::None => Ok(async_compression::Level::Precise(0)),
            CompressionLevel::Precise(n) if (1..=9).contains(&n) => {
                Ok(async_compression::Level::Precise(n))
            }
            CompressionLevel::Precise(n) => Err(IrError::InvalidCompressionLevel(n)),
        }
    }
}

/// Writes records as newline-delimited JSON through a buffered stream.
///
/// Not internally locked; share across producers through [`SharedWriter`]
/// or the async writer.
pub struct NdjsonWriter<W> {
    inner: BufWriter<W>,
    count: u64,
    closed: bool,
}

impl<W: AsyncWrite + Unpin + Send> NdjsonWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            count: 0,
            closed: false,
        }
    }

    /// Number of records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl NdjsonWriter<File> {
    /// Create (truncating) a plain NDJSON file for streaming writes.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::create(path).await?;
        Ok(Self::new(f))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> IrWriter for NdjsonWriter<W> {
    async fn write(&mut self, record: IrRecord) -> Result<()> {
        if self.closed {
            return Err(IrError::WriterClosed);
        }
        let data = serde_json::to_vec(&record).map_err(IrError::Encode)?;
        self.inner.write_all(&data).await?;
        self.inner.write_all(b"\n").await?;
        self.count += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Writes gzip-compressed newline-delimited JSON.
pub struct GzipNdjsonWriter<W: AsyncWrite + Unpin + Send> {
    inner: NdjsonWriter<GzipEncoder<BufWriter<W>>>,
}

impl<W: AsyncWrite + Unpin + Send> GzipNdjsonWriter<W> {
    /// Wrap a byte stream with the default compression level.
    pub fn new(inner: W) -> Self {
        Self {
            inner: NdjsonWriter::new(GzipEncoder::new(BufWriter::new(inner))),
        }
    }

    /// Wrap a byte stream with an explicit compression level.
    pub fn with_level(inner: W, level: CompressionLevel) -> Result<Self> {
        let level = level.resolve()?;
        Ok(Self {
            inner: NdjsonWriter::new(GzipEncoder::with_quality(BufWriter::new(inner), level)),
        })
    }

    pub fn count(&self) -> u64 {
        self.inner.count()
    }
}

impl GzipNdjsonWriter<File> {
    /// Create a gzip-compressed NDJSON file, typically `*.ndjson.gz`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::create(path).await?;
        Ok(Self::new(f))
    }

    pub async fn create_with_level(
        path: impl AsRef<Path>,
        level: CompressionLevel,
    ) -> Result<Self> {
        let resolved = level.resolve()?;
        let f = File::create(path).await?;
        Ok(Self {
            inner: NdjsonWriter::new(GzipEncoder::with_quality(BufWriter::new(f), resolved)),
        })
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> IrWriter for GzipNdjsonWriter<W> {
    async fn write(&mut self, record: IrRecord) -> Result<()> {
        self.inner.write(record).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<()> {
        // Shutdown on the encoder writes the gzip trailer before the
        // underlying stream closes.
        self.inner.close().await
    }
}

/// Fans each write out to several destinations in order.
///
/// A failing destination does not short-circuit the rest; failures are
/// collected and returned joined.
pub struct MultiWriter {
    writers: Vec<Box<dyn IrWriter + Send>>,
}

impl MultiWriter {
    /// Requires at least one destination.
    pub fn new(writers: Vec<Box<dyn IrWriter + Send>>) -> Result<Self> {
        if writers.is_empty() {
            return Err(IrError::NoWriters);
        }
        Ok(Self { writers })
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

#[async_trait]
impl IrWriter for MultiWriter {
    async fn write(&mut self, record: IrRecord) -> Result<()> {
        let mut errs = Vec::new();
        for writer in &mut self.writers {
            if let Err(e) = writer.write(record.clone()).await {
                errs.push(e);
            }
        }
        match IrError::join(errs) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        let mut errs = Vec::new();
        for writer in &mut self.writers {
            if let Err(e) = writer.flush().await {
                errs.push(e);
            }
        }
        match IrError::join(errs) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut errs = Vec::new();
        for writer in &mut self.writers {
            if let Err(e) = writer.close().await {
                errs.push(e);
            }
        }
        match IrError::join(errs) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Sends records into an in-memory channel for pipelines and tests.
///
/// Blocks when the channel is full or unbuffered until a reader catches up.
pub struct ChannelWriter {
    tx: Option<mpsc::Sender<IrRecord>>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<IrRecord>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl IrWriter for ChannelWriter {
    async fn write(&mut self, record: IrRecord) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(IrError::ChannelClosed)?;
        tx.send(record).await.map_err(|_| IrError::ChannelClosed)
    }

    async fn flush(&mut self) -> Result<()> {
        // Writes go directly to the channel.
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Clonable writer handle sharing one destination across producers.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn IrWriter + Send>>>,
}

impl SharedWriter {
    pub fn new(writer: Box<dyn IrWriter + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn write(&self, record: IrRecord) -> Result<()> {
        self.inner.lock().await.write(record).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.inner.lock().await.flush().await
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.lock().await.close().await
    }
}

#[async_trait]
impl IrWriter for SharedWriter {
    async fn write(&mut self, record: IrRecord) -> Result<()> {
        SharedWriter::write(self, record).await
    }

    async fn flush(&mut self) -> Result<()> {
        SharedWriter::flush(self).await
    }

    async fn close(&mut self) -> Result<()> {
        SharedWriter::close(self).await
    }
}

/// Write all records to a file, dispatching on extension.
///
/// `.ndjson` writes newline-delimited JSON; anything else writes the batch
/// wrapper.
pub async fn write_file(path: impl AsRef<Path>, records: Vec<IrRecord>) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let f = File::create(path).await?;
    if name.ends_with(".ndjson") {
        write_ndjson(f, records).await
    } else {
        write_batch(f, records).await
    }
}

/// Write records in the batch wrapper format with two-space indentation.
pub async fn write_batch<W: AsyncWrite + Unpin + Send>(
    mut w: W,
    records: Vec<IrRecord>,
) -> Result<()> {
    let batch = Batch::new(records);
    let data = serde_json::to_vec_pretty(&batch).map_err(IrError::Encode)?;
    w.write_all(&data).await?;
    w.write_all(b"\n").await?;
    w.flush().await?;
    Ok(())
}

/// Write records in newline-delimited JSON format.
pub async fn write_ndjson<W: AsyncWrite + Unpin + Send>(
    w: W,
    records: Vec<IrRecord>,
) -> Result<()> {
    let mut writer = NdjsonWriter::new(w);
    for record in records {
        writer.write(record).await?;
    }
    writer.close().await
}
