// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Infer OpenAPI 3.x specifications from captured HTTP request/response
//! traffic.
//!
//! The pipeline is leaf-first: capture sources write IR records through
//! [`writer`]/[`provider`], the [`inference`] engine folds records into
//! endpoints and schemas, and [`openapi`] emits the final document. The
//! [`transport`] module captures live traffic as it flows.

pub mod async_writer;
pub mod error;
pub mod inference;
pub mod openapi;
pub mod provider;
pub mod reader;
pub mod record;
pub mod transport;
pub mod writer;

pub use async_writer::AsyncNdjsonWriter;
pub use error::{IrError, Result};
pub use inference::{Engine, EngineOptions, InferenceResult};
pub use openapi::{Generator, GeneratorOptions, SpecVersion};
pub use provider::{
    ChannelProvider, FsBackend, GzipNdjsonProvider, NdjsonProvider, Provider, StorageBackend,
    StorageProvider, StreamProvider,
};
pub use reader::{ChannelReader, GzipNdjsonReader, IrReader, NdjsonReader, SliceReader};
pub use record::{Batch, BatchMetadata, IrRecord, Method, QueryValue, Scheme, Source};
pub use transport::{HttpTransport, LoggingOptions, LoggingTransport, Sampler};
pub use writer::{
    ChannelWriter, CompressionLevel, GzipNdjsonWriter, IrWriter, MultiWriter, NdjsonWriter,
    SharedWriter,
};
