// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Canonical IR record struct bridging capture sources and the inference engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Current IR schema version carried by batch files.
pub const IR_VERSION: &str = "ir.v1";

/// HTTP request method.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl Method {
    /// Uppercase wire form, e.g. `"GET"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }

    /// Parse a method token case-insensitively.
    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "HEAD" => Some(Method::Head),
            "OPTIONS" => Some(Method::Options),
            "TRACE" => Some(Method::Trace),
            "CONNECT" => Some(Method::Connect),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request scheme.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Capture source that produced a record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Har,
    Playwright,
    LoggingTransport,
    Proxy,
    Manual,
}

/// A query value is either a single string or a list of strings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryValue {
    /// First value, for type/format sniffing.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::One(s) => Some(s),
            QueryValue::Many(v) => v.first().map(|s| s.as_str()),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::One(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::One(s)
    }
}

/// Request portion of an IR record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: Method,

    /// Raw path, no query string.
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Pre-resolved template, e.g. `/users/{userId}`. Inferred when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_template: Option<String>,

    /// Values extracted for the template placeholders. Keys must be a subset
    /// of the placeholders in `path_template` when both are supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_params: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<HashMap<String, QueryValue>>,

    /// Lowercase header names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Response portion of an IR record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Status code, 100-599 on a valid record.
    pub status: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// One captured HTTP exchange.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IrRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    pub request: Request,
    pub response: Response,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl IrRecord {
    /// Create a record with the three required fields.
    pub fn new(method: Method, path: impl Into<String>, status: u16) -> Self {
        Self {
            id: None,
            timestamp: None,
            source: None,
            request: Request {
                method,
                path: path.into(),
                scheme: None,
                host: None,
                path_template: None,
                path_params: None,
                query: None,
                headers: None,
                content_type: None,
                body: None,
            },
            response: Response {
                status,
                headers: None,
                content_type: None,
                body: None,
            },
            duration_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, t: DateTime<Utc>) -> Self {
        self.timestamp = Some(t);
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.request.scheme = Some(scheme);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.request.host = Some(host.into());
        self
    }

    pub fn with_query(mut self, query: HashMap<String, QueryValue>) -> Self {
        self.request.query = Some(query);
        self
    }

    pub fn with_request_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.request.headers = Some(headers);
        self
    }

    pub fn with_response_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.response.headers = Some(headers);
        self
    }

    pub fn with_request_content_type(mut self, ct: impl Into<String>) -> Self {
        self.request.content_type = Some(ct.into());
        self
    }

    pub fn with_response_content_type(mut self, ct: impl Into<String>) -> Self {
        self.response.content_type = Some(ct.into());
        self
    }

    pub fn with_request_body(mut self, body: Value) -> Self {
        self.request.body = Some(body);
        self
    }

    pub fn with_response_body(mut self, body: Value) -> Self {
        self.response.body = Some(body);
        self
    }

    pub fn with_path_template(
        mut self,
        template: impl Into<String>,
        params: HashMap<String, String>,
    ) -> Self {
        self.request.path_template = Some(template.into());
        self.request.path_params = Some(params);
        self
    }

    pub fn with_duration_ms(mut self, ms: f64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Check the record invariants beyond what deserialization enforces:
    /// a status inside 100-599, and path parameters that all have a
    /// matching placeholder when a template is supplied.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(100..=599).contains(&self.response.status) {
            return Err(format!(
                "response status {} outside the 100-599 range",
                self.response.status
            ));
        }

        if let (Some(template), Some(params)) = (
            self.request.path_template.as_deref(),
            self.request.path_params.as_ref(),
        ) {
            for key in params.keys() {
                if !template.contains(&format!("{{{key}}}")) {
                    return Err(format!(
                        "path parameter '{key}' has no placeholder in template '{template}'"
                    ));
                }
            }
        }

        Ok(())
    }

    /// The path template when set and non-empty, otherwise the raw path.
    pub fn effective_path_template(&self) -> &str {
        match self.request.path_template.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => &self.request.path,
        }
    }
}

/// Optional metadata on a batch of records.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
}

/// Wrapper format for JSON batch files.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Batch {
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BatchMetadata>,

    pub records: Vec<IrRecord>,
}

impl Batch {
    /// Wrap records with the current version and generated-at metadata.
    pub fn new(records: Vec<IrRecord>) -> Self {
        Self {
            version: IR_VERSION.to_string(),
            metadata: Some(BatchMetadata {
                generated_at: Some(Utc::now()),
                source: None,
                record_count: Some(records.len()),
            }),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_roundtrip_minimal_record() {
        let r = IrRecord::new(Method::Get, "/users", 200);
        let s = serde_json::to_string(&r).expect("serialize");
        let back: IrRecord = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(r, back);
    }

    #[test]
    fn serde_roundtrip_full_record() {
        let mut query = HashMap::new();
        query.insert("limit".to_string(), QueryValue::One("10".to_string()));
        query.insert(
            "tag".to_string(),
            QueryValue::Many(vec!["a".to_string(), "b".to_string()]),
        );

        let mut headers = HashMap::new();
        headers.insert("x-custom".to_string(), "1".to_string());

        let r = IrRecord::new(Method::Post, "/users", 201)
            .with_id("abc")
            .with_timestamp(Utc::now())
            .with_source(Source::LoggingTransport)
            .with_scheme(Scheme::Https)
            .with_host("api.example.com")
            .with_query(query)
            .with_request_headers(headers)
            .with_request_content_type("application/json")
            .with_request_body(json!({"name": "Alice"}))
            .with_response_body(json!({"id": 1}))
            .with_duration_ms(12.0);

        let s = serde_json::to_string(&r).expect("serialize");
        let back: IrRecord = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(r, back);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let r = IrRecord::new(Method::Get, "/a", 200)
            .with_path_template("/a", HashMap::new())
            .with_duration_ms(5.0)
            .with_request_content_type("text/plain");
        let v: serde_json::Value = serde_json::to_value(&r).expect("to_value");
        assert!(v["request"]["pathTemplate"].is_string());
        assert!(v["request"]["contentType"].is_string());
        assert!(v["durationMs"].is_number());
    }

    #[test]
    fn source_serializes_kebab_case() {
        let v = serde_json::to_value(Source::LoggingTransport).expect("to_value");
        assert_eq!(v, json!("logging-transport"));
    }

    #[test]
    fn query_value_accepts_scalar_and_list() {
        let q: HashMap<String, QueryValue> =
            serde_json::from_str(r#"{"a":"1","b":["2","3"]}"#).expect("parse");
        assert_eq!(q["a"].first(), Some("1"));
        assert_eq!(q["b"].first(), Some("2"));
    }

    #[test]
    fn effective_template_prefers_non_empty_template() {
        let r = IrRecord::new(Method::Get, "/users/42", 200);
        assert_eq!(r.effective_path_template(), "/users/42");

        let r = r.with_path_template("/users/{userId}", HashMap::new());
        assert_eq!(r.effective_path_template(), "/users/{userId}");

        let mut r2 = IrRecord::new(Method::Get, "/users/42", 200);
        r2.request.path_template = Some(String::new());
        assert_eq!(r2.effective_path_template(), "/users/42");
    }

    #[test]
    fn validate_accepts_well_formed_records() {
        let r = IrRecord::new(Method::Get, "/users/42", 200).with_path_template(
            "/users/{userId}",
            [("userId".to_string(), "42".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(r.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_status() {
        let r = IrRecord::new(Method::Get, "/", 600);
        let err = r.validate().unwrap_err();
        assert!(err.contains("600"));

        let r = IrRecord::new(Method::Get, "/", 99);
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_rejects_params_without_placeholders() {
        let r = IrRecord::new(Method::Get, "/users/42", 200).with_path_template(
            "/users/{userId}",
            [("orderId".to_string(), "9".to_string())]
                .into_iter()
                .collect(),
        );
        let err = r.validate().unwrap_err();
        assert!(err.contains("orderId"));
    }

    #[test]
    fn batch_new_stamps_version_and_count() {
        let b = Batch::new(vec![IrRecord::new(Method::Get, "/", 200)]);
        assert_eq!(b.version, IR_VERSION);
        assert_eq!(b.metadata.as_ref().unwrap().record_count, Some(1));
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("DELETE"), Some(Method::Delete));
        assert_eq!(Method::parse("bogus"), None);
    }
}
