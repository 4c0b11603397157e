// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Inference engine: folds IR records into endpoints, schemas and detectors.

pub mod detection;
pub mod endpoint;
pub mod path;
pub mod schema;
pub mod store;

pub use detection::{
    DetectedSecurityScheme, PaginationCategory, PaginationParam, RateLimitHeader,
    SecuritySchemeKind,
};
pub use endpoint::EndpointClusterer;
pub use path::{endpoint_key, infer_path_template, PathInferrer};
pub use schema::{build_schema_tree, merge_schemas, process_body, SchemaNode};
pub use store::{
    BodyData, EndpointData, InferenceResult, JsonType, ParamData, ResponseData, SchemaStore,
    ValueFormat,
};

use crate::error::Result;
use crate::reader::IrReader;
use crate::record::IrRecord;

/// Status-window filtering applied before clustering.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Keep 4xx/5xx responses in the result.
    pub include_error_responses: bool,
    pub min_status_code: u16,
    pub max_status_code: u16,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            include_error_responses: true,
            min_status_code: 100,
            max_status_code: 599,
        }
    }
}

/// Orchestrates record filtering, clustering and finalization.
pub struct Engine {
    clusterer: EndpointClusterer,
    options: EngineOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            clusterer: EndpointClusterer::new(),
            options,
        }
    }

    /// Fold one record. Records outside the status window are dropped;
    /// a single bad record never fails the pipeline.
    pub fn process_record(&self, record: &IrRecord) {
        let status = record.response.status;
        if status < self.options.min_status_code || status > self.options.max_status_code {
            return;
        }
        if !self.options.include_error_responses && status >= 400 {
            return;
        }

        self.clusterer.add_record(record);
    }

    pub fn process_records(&self, records: &[IrRecord]) {
        for record in records {
            self.process_record(record);
        }
    }

    /// Drain a reader into the engine, stopping at end-of-stream.
    ///
    /// The first read error aborts the loop and is surfaced to the caller.
    pub async fn process_reader(&self, reader: &mut (dyn IrReader + Send)) -> Result<()> {
        while let Some(record) = reader.read().await? {
            self.process_record(&record);
        }
        Ok(())
    }

    /// Freeze the engine into its read-only result.
    pub fn finalize(self) -> InferenceResult {
        self.clusterer.finalize();
        self.clusterer.into_result()
    }
}

/// Infer endpoints from an in-memory record slice with default options.
pub fn infer_from_records(records: &[IrRecord]) -> InferenceResult {
    let engine = Engine::default();
    engine.process_records(records);
    engine.finalize()
}

/// Infer endpoints from a streaming reader with default options.
pub async fn infer_from_reader(reader: &mut (dyn IrReader + Send)) -> Result<InferenceResult> {
    let engine = Engine::default();
    engine.process_reader(reader).await?;
    Ok(engine.finalize())
}

/// Read an IR file and infer endpoints from its records.
pub async fn infer_from_file(path: impl AsRef<std::path::Path>) -> Result<InferenceResult> {
    let records = crate::reader::read_file(path).await?;
    Ok(infer_from_records(&records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SliceReader;
    use crate::record::Method;
    use serde_json::json;

    #[test]
    fn status_window_filters_records() {
        let engine = Engine::new(EngineOptions {
            min_status_code: 200,
            max_status_code: 299,
            ..EngineOptions::default()
        });

        engine.process_record(&IrRecord::new(Method::Get, "/a", 200));
        engine.process_record(&IrRecord::new(Method::Get, "/b", 301));
        engine.process_record(&IrRecord::new(Method::Get, "/c", 199));

        let result = engine.finalize();
        assert_eq!(result.endpoints.len(), 1);
        assert!(result.endpoints.contains_key("GET /a"));
    }

    #[test]
    fn error_responses_can_be_dropped() {
        let engine = Engine::new(EngineOptions {
            include_error_responses: false,
            ..EngineOptions::default()
        });

        engine.process_record(&IrRecord::new(Method::Get, "/a", 200));
        engine.process_record(&IrRecord::new(Method::Get, "/a", 404));
        engine.process_record(&IrRecord::new(Method::Get, "/b", 500));

        let result = engine.finalize();
        assert_eq!(result.endpoints.len(), 1);
        let endpoint = &result.endpoints["GET /a"];
        assert_eq!(endpoint.responses.len(), 1);
    }

    #[tokio::test]
    async fn process_reader_drains_to_end() -> anyhow::Result<()> {
        let engine = Engine::default();
        let mut reader = SliceReader::new(vec![
            IrRecord::new(Method::Get, "/users", 200),
            IrRecord::new(Method::Get, "/users/42", 200),
        ]);

        engine.process_reader(&mut reader).await?;
        let result = engine.finalize();

        assert!(result.endpoints.contains_key("GET /users"));
        assert!(result.endpoints.contains_key("GET /users/{userId}"));
        Ok(())
    }

    #[test]
    fn finalize_runs_optionality_bookkeeping() {
        let engine = Engine::default();
        engine.process_record(
            &IrRecord::new(Method::Post, "/users", 201)
                .with_request_body(json!({"name": "A", "email": "a@x.com"})),
        );
        engine.process_record(
            &IrRecord::new(Method::Post, "/users", 201).with_request_body(json!({"name": "B"})),
        );

        let result = engine.finalize();
        let body = result.endpoints["POST /users"]
            .request_body
            .as_ref()
            .unwrap();
        assert!(!body.schema.is_optional("name"));
        assert!(body.schema.is_optional("email"));
    }

    #[test]
    fn concurrent_process_record_is_safe() {
        use std::sync::Arc;
        let engine = Arc::new(Engine::default());

        let mut handles = Vec::new();
        for t in 0..4 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    engine
                        .process_record(&IrRecord::new(Method::Get, format!("/u/{t}/{i}"), 200));
                }
            }));
        }
        for h in handles {
            h.join().expect("thread join");
        }

        let engine = Arc::into_inner(engine).expect("sole owner");
        let result = engine.finalize();
        let total: u64 = result.endpoints.values().map(|e| e.request_count).sum();
        assert_eq!(total, 200);
    }
}
