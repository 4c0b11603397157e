// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Streaming IR record readers with format auto-detection.

use async_compression::tokio::bufread::GzipDecoder;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::error::{IrError, Result};
use crate::record::{Batch, IrRecord, IR_VERSION};

/// Streaming reader over IR records.
///
/// `read` returns `Ok(None)` when the stream is exhausted.
#[async_trait]
pub trait IrReader: Send {
    async fn read(&mut self) -> Result<Option<IrRecord>>;

    /// Release any resources held by the reader.
    async fn close(&mut self) -> Result<()>;
}

/// Reads newline-delimited JSON records from any buffered byte stream.
pub struct NdjsonReader<R> {
    inner: R,
    line_num: u64,
    at_start: bool,
}

impl<R: AsyncBufRead + Unpin + Send> NdjsonReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_num: 0,
            at_start: true,
        }
    }

    /// Current line number, 1-based after the first read. Useful for error reporting.
    pub fn line_number(&self) -> u64 {
        self.line_num
    }
}

impl NdjsonReader<BufReader<File>> {
    /// Open a plain NDJSON file for streaming reads.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::open(path).await?;
        Ok(Self::new(BufReader::new(f)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> IrReader for NdjsonReader<R> {
    async fn read(&mut self) -> Result<Option<IrRecord>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.inner.read_line(&mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            self.line_num += 1;

            let mut text = line.trim();
            if self.at_start {
                // A byte-order mark at stream start is consumed silently.
                text = text.trim_start_matches('\u{feff}');
                self.at_start = false;
            }
            if text.is_empty() {
                continue;
            }

            return serde_json::from_str(text)
                .map(Some)
                .map_err(|e| IrError::Parse {
                    line: self.line_num,
                    source: e,
                });
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reads gzip-compressed NDJSON records.
pub struct GzipNdjsonReader<R: AsyncBufRead + Unpin + Send> {
    inner: NdjsonReader<BufReader<GzipDecoder<R>>>,
}

impl<R: AsyncBufRead + Unpin + Send> GzipNdjsonReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: NdjsonReader::new(BufReader::new(GzipDecoder::new(inner))),
        }
    }

    pub fn line_number(&self) -> u64 {
        self.inner.line_number()
    }
}

impl GzipNdjsonReader<BufReader<File>> {
    /// Open a gzip-compressed NDJSON file for streaming reads.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::open(path).await?;
        Ok(Self::new(BufReader::new(f)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> IrReader for GzipNdjsonReader<R> {
    async fn read(&mut self) -> Result<Option<IrRecord>> {
        self.inner.read().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

/// Adapts an in-memory slice of records to the [`IrReader`] interface.
pub struct SliceReader {
    records: Vec<IrRecord>,
    index: usize,
}

impl SliceReader {
    pub fn new(records: Vec<IrRecord>) -> Self {
        Self { records, index: 0 }
    }

    /// Rewind to the first record.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn remaining(&self) -> usize {
        self.records.len() - self.index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IrReader for SliceReader {
    async fn read(&mut self) -> Result<Option<IrRecord>> {
        if self.index >= self.records.len() {
            return Ok(None);
        }
        let record = self.records[self.index].clone();
        self.index += 1;
        Ok(Some(record))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives records from an in-memory channel, blocking until one arrives.
///
/// Returns end-of-stream once every sender has been dropped or closed.
pub struct ChannelReader {
    rx: mpsc::Receiver<IrRecord>,
    closed: bool,
}

impl ChannelReader {
    pub fn new(rx: mpsc::Receiver<IrRecord>) -> Self {
        Self { rx, closed: false }
    }
}

#[async_trait]
impl IrReader for ChannelReader {
    async fn read(&mut self) -> Result<Option<IrRecord>> {
        if self.closed {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(record) => Ok(Some(record)),
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rx.close();
        Ok(())
    }
}

/// Read all records from a file, dispatching on extension.
///
/// `.ndjson` reads newline-delimited JSON, `.json` reads the batch wrapper,
/// any `.gz` suffix reads gzip-compressed NDJSON. Other extensions fall back
/// to content sniffing.
pub async fn read_file(path: impl AsRef<Path>) -> Result<Vec<IrRecord>> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if name.ends_with(".gz") {
        let mut reader = GzipNdjsonReader::open(path).await?;
        return drain(&mut reader).await;
    }
    if name.ends_with(".ndjson") {
        let mut reader = NdjsonReader::open(path).await?;
        return drain(&mut reader).await;
    }
    if name.ends_with(".json") {
        let data = tokio::fs::read_to_string(path).await?;
        return read_batch(&data);
    }

    let data = tokio::fs::read_to_string(path).await?;
    read_auto_detect(&data).await
}

/// Parse a batch-format JSON document, verifying the IR version.
pub fn read_batch(data: &str) -> Result<Vec<IrRecord>> {
    let batch: Batch = serde_json::from_str(data).map_err(|e| IrError::Parse {
        line: 1,
        source: e,
    })?;
    if batch.version != IR_VERSION {
        return Err(IrError::UnsupportedVersion {
            found: batch.version,
        });
    }
    Ok(batch.records)
}

/// Read all newline-delimited records from a buffered stream.
pub async fn read_ndjson<R: AsyncBufRead + Unpin + Send>(r: R) -> Result<Vec<IrRecord>> {
    let mut reader = NdjsonReader::new(r);
    drain(&mut reader).await
}

/// Detect the format of extensionless input by peeking at the first
/// significant character.
async fn read_auto_detect(data: &str) -> Result<Vec<IrRecord>> {
    let trimmed = data.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(IrError::EmptyInput);
    }

    match trimmed.as_bytes()[0] {
        b'{' => {
            // A version key near the top means the batch wrapper.
            let head: String = trimmed.chars().take(100).collect();
            if head.contains("\"version\"") {
                read_batch(trimmed)
            } else {
                read_ndjson(trimmed.as_bytes()).await
            }
        }
        b'[' => {
            // Bare array of records, not wrapped in a batch.
            serde_json::from_str(trimmed).map_err(|e| IrError::Parse {
                line: 1,
                source: e,
            })
        }
        _ => Err(IrError::UnrecognizedFormat),
    }
}

/// Read every `.json`/`.ndjson` file in a directory.
pub async fn read_dir(dir: impl AsRef<Path>) -> Result<Vec<IrRecord>> {
    let mut all = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if !name.ends_with(".json") && !name.ends_with(".ndjson") {
            continue;
        }
        all.extend(read_file(entry.path()).await?);
    }

    Ok(all)
}

/// Stream NDJSON records through a channel without loading the whole input.
///
/// A background task reads and decodes; the returned reader yields records
/// as they arrive. The first decode error ends the stream and is delivered
/// on the error channel.
pub fn stream_ndjson<R>(r: R) -> (ChannelReader, tokio::sync::oneshot::Receiver<IrError>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(100);
    let (err_tx, err_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let mut reader = NdjsonReader::new(r);
        loop {
            match reader.read().await {
                Ok(Some(record)) => {
                    if tx.send(record).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    let _ = err_tx.send(e);
                    return;
                }
            }
        }
    });

    (ChannelReader::new(rx), err_rx)
}

/// Read and combine several inputs, each a file or a directory.
///
/// With `dedupe`, records carrying an id keep only their first occurrence;
/// records without an id are always kept.
pub async fn read_inputs(
    inputs: &[impl AsRef<Path>],
    dedupe: bool,
) -> Result<Vec<IrRecord>> {
    let mut all = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    for input in inputs {
        let path = input.as_ref();
        let records = if tokio::fs::metadata(path).await?.is_dir() {
            read_dir(path).await?
        } else {
            read_file(path).await?
        };

        for record in records {
            if dedupe {
                if let Some(id) = &record.id {
                    if !seen_ids.insert(id.clone()) {
                        continue;
                    }
                }
            }
            all.push(record);
        }
    }

    Ok(all)
}

async fn drain(reader: &mut (impl IrReader + ?Sized)) -> Result<Vec<IrRecord>> {
    let mut records = Vec::new();
    while let Some(record) = reader.read().await? {
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Method;
    use uuid::Uuid;

    fn sample_line(path: &str) -> String {
        format!(
            r#"{{"request":{{"method":"GET","path":"{path}"}},"response":{{"status":200}}}}"#
        )
    }

    #[tokio::test]
    async fn ndjson_reader_streams_records_in_order() {
        let data = format!("{}\n{}\n", sample_line("/a"), sample_line("/b"));
        let mut reader = NdjsonReader::new(data.as_bytes());

        let first = reader.read().await.expect("read").expect("record");
        assert_eq!(first.request.path, "/a");
        let second = reader.read().await.expect("read").expect("record");
        assert_eq!(second.request.path, "/b");
        assert!(reader.read().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn ndjson_reader_skips_blank_lines() {
        let data = format!("\n\n{}\n\n{}\n", sample_line("/a"), sample_line("/b"));
        let records = read_ndjson(data.as_bytes()).await.expect("read");
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn ndjson_reader_reports_one_based_line_number() {
        let data = format!("{}\nnot json\n", sample_line("/a"));
        let mut reader = NdjsonReader::new(data.as_bytes());

        reader.read().await.expect("read").expect("record");
        let err = reader.read().await.expect_err("parse error");
        match err {
            IrError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[tokio::test]
    async fn ndjson_reader_consumes_bom() {
        let data = format!("\u{feff}{}\n", sample_line("/a"));
        let records = read_ndjson(data.as_bytes()).await.expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request.path, "/a");
    }

    #[tokio::test]
    async fn ndjson_reader_tolerates_large_lines() {
        let big = "x".repeat(1024 * 1024);
        let line = format!(
            r#"{{"request":{{"method":"POST","path":"/big","body":"{big}"}},"response":{{"status":200}}}}"#
        );
        let records = read_ndjson(line.as_bytes()).await.expect("read");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn slice_reader_iterates_and_resets() {
        let mut reader = SliceReader::new(vec![
            IrRecord::new(Method::Get, "/a", 200),
            IrRecord::new(Method::Get, "/b", 200),
        ]);
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.remaining(), 2);

        reader.read().await.expect("read").expect("record");
        assert_eq!(reader.remaining(), 1);

        reader.read().await.expect("read").expect("record");
        assert!(reader.read().await.expect("read").is_none());

        reader.reset();
        assert_eq!(reader.remaining(), 2);
    }

    #[tokio::test]
    async fn channel_reader_ends_when_sender_drops() {
        let (tx, rx) = mpsc::channel(4);
        let mut reader = ChannelReader::new(rx);

        tx.send(IrRecord::new(Method::Get, "/a", 200))
            .await
            .expect("send");
        drop(tx);

        assert!(reader.read().await.expect("read").is_some());
        assert!(reader.read().await.expect("read").is_none());
        // Stays at end-of-stream once closed.
        assert!(reader.read().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn read_batch_accepts_current_version() {
        let data = format!(
            r#"{{"version":"ir.v1","records":[{}]}}"#,
            sample_line("/a")
        );
        let records = read_batch(&data).expect("read");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn read_batch_rejects_other_versions() {
        let data = r#"{"version":"ir.v0","records":[]}"#;
        let err = read_batch(data).expect_err("version error");
        match err {
            IrError::UnsupportedVersion { found } => assert_eq!(found, "ir.v0"),
            other => panic!("expected version error, got {other}"),
        }
    }

    #[tokio::test]
    async fn read_file_dispatches_on_extension() -> anyhow::Result<()> {
        let dir = std::env::temp_dir();
        let ndjson_path = dir.join(format!("ir_read_{}.ndjson", Uuid::new_v4()));
        let json_path = dir.join(format!("ir_read_{}.json", Uuid::new_v4()));

        tokio::fs::write(&ndjson_path, format!("{}\n", sample_line("/a"))).await?;
        tokio::fs::write(
            &json_path,
            format!(r#"{{"version":"ir.v1","records":[{}]}}"#, sample_line("/b")),
        )
        .await?;

        let from_ndjson = read_file(&ndjson_path).await?;
        assert_eq!(from_ndjson[0].request.path, "/a");

        let from_json = read_file(&json_path).await?;
        assert_eq!(from_json[0].request.path, "/b");

        tokio::fs::remove_file(&ndjson_path).await?;
        tokio::fs::remove_file(&json_path).await?;
        Ok(())
    }

    #[tokio::test]
    async fn read_file_auto_detects_extensionless_input() -> anyhow::Result<()> {
        let dir = std::env::temp_dir();

        let batch_path = dir.join(format!("ir_auto_batch_{}", Uuid::new_v4()));
        tokio::fs::write(
            &batch_path,
            format!(r#"{{"version":"ir.v1","records":[{}]}}"#, sample_line("/a")),
        )
        .await?;
        assert_eq!(read_file(&batch_path).await?.len(), 1);

        let ndjson_path = dir.join(format!("ir_auto_ndjson_{}", Uuid::new_v4()));
        tokio::fs::write(&ndjson_path, format!("{}\n", sample_line("/a"))).await?;
        assert_eq!(read_file(&ndjson_path).await?.len(), 1);

        let array_path = dir.join(format!("ir_auto_array_{}", Uuid::new_v4()));
        tokio::fs::write(&array_path, format!("[{}]", sample_line("/a"))).await?;
        assert_eq!(read_file(&array_path).await?.len(), 1);

        tokio::fs::remove_file(&batch_path).await?;
        tokio::fs::remove_file(&ndjson_path).await?;
        tokio::fs::remove_file(&array_path).await?;
        Ok(())
    }

    #[tokio::test]
    async fn auto_detect_empty_input_errors() {
        let err = read_auto_detect("   \n ").await.expect_err("empty");
        assert!(matches!(err, IrError::EmptyInput));
    }

    #[tokio::test]
    async fn stream_ndjson_yields_records_as_they_arrive() -> anyhow::Result<()> {
        let data = format!("{}\n{}\n", sample_line("/a"), sample_line("/b"));
        let (mut reader, _errs) = stream_ndjson(std::io::Cursor::new(data.into_bytes()));

        let mut got = Vec::new();
        while let Some(record) = reader.read().await? {
            got.push(record.request.path.clone());
        }
        assert_eq!(got, vec!["/a".to_string(), "/b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn stream_ndjson_surfaces_decode_errors() -> anyhow::Result<()> {
        let data = format!("{}\nnot json\n", sample_line("/a"));
        let (mut reader, errs) = stream_ndjson(std::io::Cursor::new(data.into_bytes()));

        assert!(reader.read().await?.is_some());
        assert!(reader.read().await?.is_none());

        let err = errs.await.expect("error delivered");
        assert!(matches!(err, IrError::Parse { line: 2, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn read_inputs_combines_and_dedupes_by_id() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a.ndjson");
        let b = dir.path().join("b.ndjson");

        let with_id = |id: &str, path: &str| {
            format!(
                r#"{{"id":"{id}","request":{{"method":"GET","path":"{path}"}},"response":{{"status":200}}}}"#
            )
        };
        tokio::fs::write(
            &a,
            format!("{}\n{}\n", with_id("r1", "/a"), sample_line("/anon")),
        )
        .await?;
        tokio::fs::write(
            &b,
            format!("{}\n{}\n", with_id("r1", "/a"), with_id("r2", "/b")),
        )
        .await?;

        let merged = read_inputs(&[&a, &b], false).await?;
        assert_eq!(merged.len(), 4);

        let deduped = read_inputs(&[&a, &b], true).await?;
        assert_eq!(deduped.len(), 3);
        let ids: Vec<_> = deduped.iter().filter_map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        Ok(())
    }

    #[tokio::test]
    async fn read_inputs_accepts_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("x.ndjson"), format!("{}\n", sample_line("/x")))
            .await?;
        tokio::fs::write(dir.path().join("y.ndjson"), format!("{}\n", sample_line("/y")))
            .await?;

        let records = read_inputs(&[dir.path()], false).await?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn read_dir_collects_known_extensions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("a.ndjson"), format!("{}\n", sample_line("/a")))
            .await?;
        tokio::fs::write(
            dir.path().join("b.json"),
            format!(r#"{{"version":"ir.v1","records":[{}]}}"#, sample_line("/b")),
        )
        .await?;
        tokio::fs::write(dir.path().join("ignored.txt"), "nope").await?;

        let records = read_dir(dir.path()).await?;
        assert_eq!(records.len(), 2);
        Ok(())
    }
}
