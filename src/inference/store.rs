// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Flat path-keyed observation stores and scalar type/format inference.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{LazyLock, RwLock};

/// Default cap on unique example values retained per path.
pub const MAX_EXAMPLES: usize = 5;

/// JSON Schema scalar and container types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

/// Detected string formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Uuid,
    Email,
    DateTime,
    Date,
    Time,
    Uri,
    Ipv4,
    Ipv6,
}

impl ValueFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueFormat::Uuid => "uuid",
            ValueFormat::Email => "email",
            ValueFormat::DateTime => "date-time",
            ValueFormat::Date => "date",
            ValueFormat::Time => "time",
            ValueFormat::Uri => "uri",
            ValueFormat::Ipv4 => "ipv4",
            ValueFormat::Ipv6 => "ipv6",
        }
    }
}

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid regex")
});

static DATE_TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}").expect("date-time regex"));

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex"));

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}").expect("time regex"));

static URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").expect("uri regex"));

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$")
        .expect("ipv4 regex")
});

static IPV6_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}$").expect("ipv6 regex"));

/// JSON Schema type of a serde value. Null yields `None`.
pub fn infer_type(value: &Value) -> Option<JsonType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(JsonType::Boolean),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(JsonType::Integer)
            } else if n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false) {
                // Whole-valued floats read as integers.
                Some(JsonType::Integer)
            } else {
                Some(JsonType::Number)
            }
        }
        Value::String(_) => Some(JsonType::String),
        Value::Array(_) => Some(JsonType::Array),
        Value::Object(_) => Some(JsonType::Object),
    }
}

/// Widen two observed types: integer with number gives number, any other
/// conflict falls back to string.
pub fn merge_types(a: JsonType, b: JsonType) -> JsonType {
    if a == b {
        return a;
    }
    match (a, b) {
        (JsonType::Integer, JsonType::Number) | (JsonType::Number, JsonType::Integer) => {
            JsonType::Number
        }
        _ => JsonType::String,
    }
}

/// Detect a string format using the standard patterns.
pub fn detect_format(s: &str) -> Option<ValueFormat> {
    if s.is_empty() {
        return None;
    }

    if UUID_PATTERN.is_match(s) {
        Some(ValueFormat::Uuid)
    } else if EMAIL_PATTERN.is_match(s) {
        Some(ValueFormat::Email)
    } else if DATE_TIME_PATTERN.is_match(s) {
        Some(ValueFormat::DateTime)
    } else if DATE_PATTERN.is_match(s) {
        Some(ValueFormat::Date)
    } else if TIME_PATTERN.is_match(s) {
        Some(ValueFormat::Time)
    } else if URI_PATTERN.is_match(s) {
        Some(ValueFormat::Uri)
    } else if IPV4_PATTERN.is_match(s) {
        Some(ValueFormat::Ipv4)
    } else if IPV6_PATTERN.is_match(s) {
        Some(ValueFormat::Ipv6)
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct StoreState {
    examples: HashMap<String, Vec<Value>>,
    types: HashMap<String, JsonType>,
    optional: HashMap<String, bool>,
    nullable: HashMap<String, bool>,
    formats: HashMap<String, ValueFormat>,
    seen_count: HashMap<String, u64>,
    total_count: u64,
}

/// Accumulates JSON field observations keyed by dotted paths.
///
/// Paths use dot notation with `[]` marking array descent, e.g.
/// `items[].name`. Interior read-write lock so concurrent record
/// processing stays safe.
#[derive(Debug, Default)]
pub struct SchemaStore {
    state: RwLock<StoreState>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one body observation, for optionality tracking.
    pub fn add_observation(&self) {
        match self.state.write() {
            Ok(mut state) => state.total_count += 1,
            Err(_) => tracing::warn!("schema store lock poisoned during write"),
        }
    }

    /// Record a value at a path. Null marks the path nullable.
    pub fn add_value(&self, path: &str, value: &Value) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!("schema store lock poisoned during write");
                return;
            }
        };

        *state.seen_count.entry(path.to_string()).or_insert(0) += 1;

        if value.is_null() {
            state.nullable.insert(path.to_string(), true);
            return;
        }

        if let Some(inferred) = infer_type(value) {
            let merged = match state.types.get(path) {
                Some(existing) => merge_types(*existing, inferred),
                None => inferred,
            };
            state.types.insert(path.to_string(), merged);
        }

        if let Value::String(s) = value {
            // First detected format per path is final.
            if !state.formats.contains_key(path) {
                if let Some(format) = detect_format(s) {
                    state.formats.insert(path.to_string(), format);
                }
            }
        }

        let examples = state.examples.entry(path.to_string()).or_default();
        if examples.len() < MAX_EXAMPLES && !examples.contains(value) {
            examples.push(value.clone());
        }
    }

    /// Mark every path that missed at least one observation as optional.
    pub fn finalize_optional(&self) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!("schema store lock poisoned during finalize");
                return;
            }
        };

        let total = state.total_count;
        let optional: Vec<String> = state
            .seen_count
            .iter()
            .filter(|(_, &count)| count < total)
            .map(|(path, _)| path.clone())
            .collect();
        for path in optional {
            state.optional.insert(path, true);
        }
    }

    /// All tracked paths, including those only ever observed as null.
    pub fn paths(&self) -> Vec<String> {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!("schema store lock poisoned during read");
                return Vec::new();
            }
        };

        let mut paths: Vec<String> = state.examples.keys().cloned().collect();
        for path in state.nullable.keys() {
            if !state.examples.contains_key(path) {
                paths.push(path.clone());
            }
        }
        paths
    }

    pub fn type_of(&self, path: &str) -> Option<JsonType> {
        self.state.read().ok().and_then(|s| s.types.get(path).copied())
    }

    pub fn format_of(&self, path: &str) -> Option<ValueFormat> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.formats.get(path).copied())
    }

    pub fn is_nullable(&self, path: &str) -> bool {
        self.state
            .read()
            .ok()
            .map(|s| s.nullable.get(path).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn is_optional(&self, path: &str) -> bool {
        self.state
            .read()
            .ok()
            .map(|s| s.optional.get(path).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn examples_of(&self, path: &str) -> Vec<Value> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.examples.get(path).cloned())
            .unwrap_or_default()
    }

    /// True when at least one non-null value was recorded anywhere.
    pub fn has_examples(&self) -> bool {
        self.state
            .read()
            .ok()
            .map(|s| !s.examples.is_empty())
            .unwrap_or(false)
    }

    /// True when nothing was ever recorded, not even a null.
    pub fn is_empty(&self) -> bool {
        self.state
            .read()
            .ok()
            .map(|s| s.examples.is_empty() && s.nullable.is_empty())
            .unwrap_or(true)
    }

    pub fn total_observations(&self) -> u64 {
        self.state.read().ok().map(|s| s.total_count).unwrap_or(0)
    }
}

/// Aggregated values for a single path, query or header parameter.
#[derive(Debug, Clone)]
pub struct ParamData {
    pub name: String,
    pub examples: Vec<Value>,
    pub ty: JsonType,
    pub format: Option<ValueFormat>,
    pub required: bool,
    seen_count: u64,
}

impl ParamData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            examples: Vec::new(),
            ty: JsonType::String,
            format: None,
            required: true,
            seen_count: 0,
        }
    }

    /// Fold one observed value into the parameter.
    ///
    /// Parameter values arrive as strings off the wire, so numeric-looking
    /// text is sniffed into integer/number types.
    pub fn add_value(&mut self, value: &Value) {
        self.seen_count += 1;

        let inferred = match value {
            Value::String(s) if s.parse::<i64>().is_ok() => Some(JsonType::Integer),
            Value::String(s) if s.parse::<f64>().is_ok() => Some(JsonType::Number),
            other => infer_type(other),
        };
        if let Some(inferred) = inferred {
            // The string default is provisional until a value arrives.
            if self.ty == JsonType::String {
                self.ty = inferred;
            } else {
                self.ty = merge_types(self.ty, inferred);
            }
        }

        if let Value::String(s) = value {
            if self.format.is_none() {
                self.format = detect_format(s);
            }
        }

        if self.examples.len() < MAX_EXAMPLES && !self.examples.contains(value) {
            self.examples.push(value.clone());
        }
    }

    pub fn seen_count(&self) -> u64 {
        self.seen_count
    }
}

/// Request or response body accumulator with its media type.
#[derive(Debug)]
pub struct BodyData {
    pub content_type: String,
    pub schema: SchemaStore,
}

impl BodyData {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            schema: SchemaStore::new(),
        }
    }
}

/// Per-status-code response aggregate.
#[derive(Debug)]
pub struct ResponseData {
    pub status: u16,
    pub content_type: String,
    pub headers: BTreeMap<String, ParamData>,
    pub body: SchemaStore,
}

impl ResponseData {
    pub fn new(status: u16, content_type: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: BTreeMap::new(),
            body: SchemaStore::new(),
        }
    }
}

/// Everything observed for one `(method, path template)` pair.
#[derive(Debug)]
pub struct EndpointData {
    pub method: String,
    pub path_template: String,
    pub path_params: BTreeMap<String, ParamData>,
    pub query_params: BTreeMap<String, ParamData>,
    pub header_params: BTreeMap<String, ParamData>,
    pub request_body: Option<BodyData>,
    pub responses: BTreeMap<u16, ResponseData>,
    pub request_count: u64,
}

impl EndpointData {
    pub fn new(method: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path_template: path_template.into(),
            path_params: BTreeMap::new(),
            query_params: BTreeMap::new(),
            header_params: BTreeMap::new(),
            request_body: None,
            responses: BTreeMap::new(),
            request_count: 0,
        }
    }
}

/// Frozen output of the inference engine.
#[derive(Debug, Default)]
pub struct InferenceResult {
    /// Keyed by `"<METHOD> <pathTemplate>"`.
    pub endpoints: BTreeMap<String, EndpointData>,
    pub hosts: Vec<String>,
    pub schemes: Vec<String>,
    pub security_schemes: BTreeMap<String, super::detection::DetectedSecurityScheme>,
    pub pagination_params: BTreeMap<String, super::detection::PaginationParam>,
    pub rate_limit_headers: BTreeMap<String, super::detection::RateLimitHeader>,
}
