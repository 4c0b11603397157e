// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Groups IR records by `(method, path template)` and aggregates parameters,
//! bodies and responses.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{LazyLock, Mutex};

use crate::record::{IrRecord, QueryValue};

use super::detection::{PaginationDetector, RateLimitDetector, SecurityDetector};
use super::path::{endpoint_key, PathInferrer};
use super::schema::process_body;
use super::store::{BodyData, EndpointData, InferenceResult, ParamData, ResponseData};

/// Transport, tracing, CORS, cache and CDN headers that never become
/// documented parameters.
static EXCLUDED_HEADERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "content-length",
        "content-type",
        "date",
        "server",
        "connection",
        "keep-alive",
        "transfer-encoding",
        "accept",
        "accept-encoding",
        "accept-language",
        "user-agent",
        "host",
        "cache-control",
        "pragma",
        "expires",
        "x-request-id",
        "x-correlation-id",
        "x-trace-id",
        "x-forwarded-for",
        "x-forwarded-proto",
        "x-forwarded-host",
        "x-real-ip",
        "cf-ray",
        "cf-connecting-ip",
        "cf-ipcountry",
        "cf-visitor",
        "cf-request-id",
        "x-amzn-requestid",
        "x-amzn-trace-id",
        "x-cache",
        "x-cache-hits",
        "x-served-by",
        "x-timer",
        "vary",
        "etag",
        "last-modified",
        "if-none-match",
        "if-modified-since",
        "access-control-allow-origin",
        "access-control-allow-methods",
        "access-control-allow-headers",
        "access-control-allow-credentials",
        "access-control-max-age",
        "access-control-expose-headers",
    ]
    .into_iter()
    .collect()
});

fn is_excluded_header(name: &str) -> bool {
    EXCLUDED_HEADERS.contains(name.to_ascii_lowercase().as_str())
}

#[derive(Default)]
struct ClustererState {
    endpoints: std::collections::BTreeMap<String, EndpointData>,
    hosts: BTreeSet<String>,
    schemes: BTreeSet<String>,
    security: SecurityDetector,
    pagination: PaginationDetector,
    rate_limit: RateLimitDetector,
}

/// Endpoint accumulator; safe for concurrent record feeds.
pub struct EndpointClusterer {
    path_inferrer: PathInferrer,
    state: Mutex<ClustererState>,
}

impl Default for EndpointClusterer {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointClusterer {
    pub fn new() -> Self {
        Self {
            path_inferrer: PathInferrer::new(),
            state: Mutex::new(ClustererState::default()),
        }
    }

    /// Fold one record into its endpoint, creating it on first sighting.
    pub fn add_record(&self, record: &IrRecord) {
        // The template is taken from the record when pre-resolved.
        let (template, params) = match record.request.path_template.as_deref() {
            Some(t) if !t.is_empty() => (
                t.to_string(),
                record.request.path_params.clone().unwrap_or_default(),
            ),
            _ => self.path_inferrer.infer_template(&record.request.path),
        };

        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!("endpoint clusterer lock poisoned");
                return;
            }
        };

        if let Some(host) = record.request.host.as_deref() {
            if !host.is_empty() {
                state.hosts.insert(host.to_string());
            }
        }
        let scheme = record
            .request
            .scheme
            .map(|s| s.as_str())
            .unwrap_or("https");
        state.schemes.insert(scheme.to_string());

        let empty_query = HashMap::new();
        let query = record.request.query.as_ref().unwrap_or(&empty_query);
        let empty_headers = HashMap::new();
        let headers = record.request.headers.as_ref().unwrap_or(&empty_headers);
        let response_headers = record.response.headers.as_ref().unwrap_or(&empty_headers);

        state.security.detect_from_headers(headers);
        state.pagination.detect_from_query(query);
        state.rate_limit.detect_from_headers(response_headers);

        let key = endpoint_key(record.request.method.as_str(), &template);
        let endpoint = state
            .endpoints
            .entry(key)
            .or_insert_with(|| EndpointData::new(record.request.method.as_str(), template.clone()));

        endpoint.request_count += 1;

        // Path parameters are always required.
        for (name, value) in &params {
            let param = endpoint
                .path_params
                .entry(name.clone())
                .or_insert_with(|| ParamData::new(name.clone()));
            param.add_value(&Value::String(value.clone()));
        }

        // Query parameters: required while present in every observation
        // since their introduction; a single miss demotes them for good.
        for (name, value) in query {
            let param = endpoint
                .query_params
                .entry(name.clone())
                .or_insert_with(|| ParamData::new(name.clone()));
            add_query_value(param, value);
        }
        for (name, param) in endpoint.query_params.iter_mut() {
            if !query.contains_key(name) {
                param.required = false;
            }
        }

        // Request headers behave like query parameters after the ignore list.
        for (name, value) in headers {
            if is_excluded_header(name) {
                continue;
            }
            let param = endpoint
                .header_params
                .entry(name.clone())
                .or_insert_with(|| ParamData::new(name.clone()));
            param.add_value(&Value::String(value.clone()));
        }
        for (name, param) in endpoint.header_params.iter_mut() {
            if !headers.contains_key(name) {
                param.required = false;
            }
        }

        if let Some(body) = non_null_body(&record.request.body) {
            let content_type = record
                .request
                .content_type
                .clone()
                .unwrap_or_else(|| "application/json".to_string());
            let body_data = endpoint
                .request_body
                .get_or_insert_with(|| BodyData::new(content_type));
            process_body(&body_data.schema, body);
        }

        let status = record.response.status;
        let response = endpoint.responses.entry(status).or_insert_with(|| {
            let content_type = record
                .response
                .content_type
                .clone()
                .unwrap_or_else(|| "application/json".to_string());
            ResponseData::new(status, content_type)
        });

        if let Some(body) = non_null_body(&record.response.body) {
            process_body(&response.body, body);
        }

        for (name, value) in response_headers {
            if is_excluded_header(name) {
                continue;
            }
            let param = response
                .headers
                .entry(name.clone())
                .or_insert_with(|| ParamData::new(name.clone()));
            param.add_value(&Value::String(value.clone()));
        }
    }

    /// Complete optionality bookkeeping on every body store.
    pub fn finalize(&self) {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!("endpoint clusterer lock poisoned during finalize");
                return;
            }
        };

        for endpoint in state.endpoints.values() {
            if let Some(body) = &endpoint.request_body {
                body.schema.finalize_optional();
            }
            for response in endpoint.responses.values() {
                response.body.finalize_optional();
            }
        }
    }

    /// Freeze the accumulated state into an [`InferenceResult`].
    pub fn into_result(self) -> InferenceResult {
        let state = match self.state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => {
                tracing::warn!("endpoint clusterer lock poisoned at freeze");
                poisoned.into_inner()
            }
        };

        InferenceResult {
            endpoints: state.endpoints,
            hosts: state.hosts.into_iter().collect(),
            schemes: state.schemes.into_iter().collect(),
            security_schemes: state.security.into_schemes(),
            pagination_params: state.pagination.into_params(),
            rate_limit_headers: state.rate_limit.into_headers(),
        }
    }
}

/// Multi-valued query parameters are folded element-wise so the parameter
/// stays a string with each variant as an example.
fn add_query_value(param: &mut ParamData, value: &QueryValue) {
    match value {
        QueryValue::One(s) => param.add_value(&Value::String(s.clone())),
        QueryValue::Many(values) => {
            for s in values {
                param.add_value(&Value::String(s.clone()));
            }
        }
    }
}

fn non_null_body(body: &Option<Value>) -> Option<&Value> {
    body.as_ref().filter(|b| !b.is_null())
}
