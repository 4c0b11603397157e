// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Error types surfaced at IR component boundaries.

use thiserror::Error;

/// Errors produced by IR readers, writers and providers.
#[derive(Debug, Error)]
pub enum IrError {
    /// Underlying file, network or gzip failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed record in a stream. `line` is 1-based.
    #[error("line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    /// Record serialization failure on the write path.
    #[error("encoding record: {0}")]
    Encode(#[source] serde_json::Error),

    /// Batch wrapper carried a version other than `ir.v1`.
    #[error("unsupported IR version: {found} (expected {})", crate::record::IR_VERSION)]
    UnsupportedVersion { found: String },

    /// Auto-detection ran against an empty stream.
    #[error("empty input")]
    EmptyInput,

    /// Auto-detection could not classify the input.
    #[error("unrecognized format: expected JSON object or array")]
    UnrecognizedFormat,

    /// Write attempted on a closed channel writer.
    #[error("channel writer is closed")]
    ChannelClosed,

    /// Write attempted on a writer that was already closed.
    #[error("writer is closed")]
    WriterClosed,

    /// Gzip level outside the accepted 1..=9 range.
    #[error("invalid gzip compression level: {0} (expected 1-9)")]
    InvalidCompressionLevel(i32),

    /// Cancellation context was cancelled before resource creation.
    #[error("operation cancelled")]
    Cancelled,

    /// Errors collected from multiple destinations (multi-writer).
    #[error("{}", join_messages(.0))]
    Join(Vec<IrError>),

    /// Multi-writer constructed with no destinations.
    #[error("at least one writer is required")]
    NoWriters,
}

/// Convenience alias used across the IR layer.
pub type Result<T> = std::result::Result<T, IrError>;

fn join_messages(errs: &[IrError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl IrError {
    /// Collapse a list of errors into `None` (no errors), the single error,
    /// or a `Join` of several.
    pub fn join(mut errs: Vec<IrError>) -> Option<IrError> {
        match errs.len() {
            0 => None,
            1 => Some(errs.remove(0)),
            _ => Some(IrError::Join(errs)),
        }
    }
}
