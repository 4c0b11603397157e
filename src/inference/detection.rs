// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Auxiliary detectors: authentication schemes, pagination parameters and
//! rate-limit headers.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::record::QueryValue;

use super::store::JsonType;

/// Kind of a detected security scheme, per the OpenAPI vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritySchemeKind {
    Http,
    ApiKey,
}

impl SecuritySchemeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecuritySchemeKind::Http => "http",
            SecuritySchemeKind::ApiKey => "apiKey",
        }
    }
}

/// One authentication scheme observed in request headers.
#[derive(Debug, Clone)]
pub struct DetectedSecurityScheme {
    pub kind: SecuritySchemeKind,
    /// `bearer`, `basic` or `digest` for HTTP schemes.
    pub scheme: Option<String>,
    /// Header name for apiKey schemes.
    pub name: Option<String>,
    /// Parameter location for apiKey schemes.
    pub location: Option<String>,
    pub bearer_format: Option<String>,
    pub count: u64,
}

/// Recognizes authentication schemes from request headers.
#[derive(Debug, Default)]
pub struct SecurityDetector {
    schemes: BTreeMap<String, DetectedSecurityScheme>,
}

impl SecurityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_from_headers(&mut self, headers: &HashMap<String, String>) {
        for (name, value) in headers {
            match name.to_ascii_lowercase().as_str() {
                "authorization" => self.detect_authorization(value),
                "x-api-key" | "api-key" | "apikey" => self.add_scheme(
                    "apiKeyHeader",
                    DetectedSecurityScheme {
                        kind: SecuritySchemeKind::ApiKey,
                        scheme: None,
                        name: Some(name.clone()),
                        location: Some("header".to_string()),
                        bearer_format: None,
                        count: 0,
                    },
                ),
                "x-auth-token" | "x-access-token" => self.add_scheme(
                    "tokenHeader",
                    DetectedSecurityScheme {
                        kind: SecuritySchemeKind::ApiKey,
                        scheme: None,
                        name: Some(name.clone()),
                        location: Some("header".to_string()),
                        bearer_format: None,
                        count: 0,
                    },
                ),
                _ => {}
            }
        }
    }

    fn detect_authorization(&mut self, value: &str) {
        let lower = value.to_ascii_lowercase();

        if let Some(token) = lower.strip_prefix("bearer ") {
            let bearer_format = if is_jwt(token.trim()) {
                Some("JWT".to_string())
            } else {
                None
            };
            self.add_scheme(
                "bearerAuth",
                DetectedSecurityScheme {
                    kind: SecuritySchemeKind::Http,
                    scheme: Some("bearer".to_string()),
                    name: None,
                    location: None,
                    bearer_format,
                    count: 0,
                },
            );
        } else if lower.starts_with("basic ") {
            self.add_scheme(
                "basicAuth",
                DetectedSecurityScheme {
                    kind: SecuritySchemeKind::Http,
                    scheme: Some("basic".to_string()),
                    name: None,
                    location: None,
                    bearer_format: None,
                    count: 0,
                },
            );
        } else if lower.starts_with("digest ") {
            self.add_scheme(
                "digestAuth",
                DetectedSecurityScheme {
                    kind: SecuritySchemeKind::Http,
                    scheme: Some("digest".to_string()),
                    name: None,
                    location: None,
                    bearer_format: None,
                    count: 0,
                },
            );
        }
    }

    /// First detection fixes the scheme; repeats only bump the counter,
    /// except that a bearer format seen later fills a missing one.
    fn add_scheme(&mut self, key: &str, scheme: DetectedSecurityScheme) {
        match self.schemes.get_mut(key) {
            Some(existing) => {
                existing.count += 1;
                if existing.bearer_format.is_none() {
                    existing.bearer_format = scheme.bearer_format;
                }
            }
            None => {
                let mut scheme = scheme;
                scheme.count = 1;
                self.schemes.insert(key.to_string(), scheme);
            }
        }
    }

    pub fn schemes(&self) -> &BTreeMap<String, DetectedSecurityScheme> {
        &self.schemes
    }

    pub fn into_schemes(self) -> BTreeMap<String, DetectedSecurityScheme> {
        self.schemes
    }
}

/// A token looks like a JWT when it has exactly three base64url segments.
fn is_jwt(token: &str) -> bool {
    static BASE64URL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("base64url regex"));

    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| BASE64URL.is_match(p))
}

/// Pagination style implied by a query-parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationCategory {
    Page,
    Offset,
    Cursor,
}

impl PaginationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaginationCategory::Page => "page",
            PaginationCategory::Offset => "offset",
            PaginationCategory::Cursor => "cursor",
        }
    }
}

/// One pagination parameter observed in query strings.
#[derive(Debug, Clone)]
pub struct PaginationParam {
    pub name: String,
    pub category: PaginationCategory,
    pub examples: Vec<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub description: String,
}

static PAGINATION_VOCABULARY: LazyLock<HashMap<&'static str, PaginationCategory>> = LazyLock::new(|| {
    use PaginationCategory::*;
    [
        ("page", Page),
        ("page_num", Page),
        ("pagenum", Page),
        ("p", Page),
        ("limit", Offset),
        ("per_page", Offset),
        ("perpage", Offset),
        ("page_size", Offset),
        ("pagesize", Offset),
        ("size", Offset),
        ("count", Offset),
        ("offset", Offset),
        ("skip", Offset),
        ("start", Offset),
        ("from", Offset),
        ("cursor", Cursor),
        ("after", Cursor),
        ("before", Cursor),
        ("next", Cursor),
        ("prev", Cursor),
    ]
    .into_iter()
    .collect()
});

/// Recognizes pagination parameters from a fixed name vocabulary.
#[derive(Debug, Default)]
pub struct PaginationDetector {
    params: BTreeMap<String, PaginationParam>,
}

impl PaginationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_from_query(&mut self, query: &HashMap<String, QueryValue>) {
        for (name, value) in query {
            let lower = name.to_ascii_lowercase();
            if let Some(&category) = PAGINATION_VOCABULARY.get(lower.as_str()) {
                self.add_param(name, category, value);
            }
        }
    }

    fn add_param(&mut self, name: &str, category: PaginationCategory, value: &QueryValue) {
        let param = self
            .params
            .entry(name.to_string())
            .or_insert_with(|| PaginationParam {
                name: name.to_string(),
                category,
                examples: Vec::with_capacity(5),
                min: None,
                max: None,
                description: describe_pagination(name),
            });

        let text = value.first().unwrap_or_default().to_string();
        if param.examples.len() < 5 && !param.examples.contains(&text) {
            param.examples.push(text.clone());
        }

        if let Ok(n) = text.parse::<i64>() {
            param.min = Some(param.min.map_or(n, |m| m.min(n)));
            param.max = Some(param.max.map_or(n, |m| m.max(n)));
        }
    }

    pub fn params(&self) -> &BTreeMap<String, PaginationParam> {
        &self.params
    }

    pub fn into_params(self) -> BTreeMap<String, PaginationParam> {
        self.params
    }
}

fn describe_pagination(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "page" | "page_num" | "p" => "Page number (1-indexed)",
        "limit" | "per_page" | "page_size" | "size" => "Number of items per page",
        "offset" | "skip" => "Number of items to skip",
        "cursor" | "after" => "Cursor for pagination (from previous response)",
        "before" => "Cursor for reverse pagination",
        _ => "",
    }
    .to_string()
}

/// One rate-limit header observed on responses.
#[derive(Debug, Clone)]
pub struct RateLimitHeader {
    pub name: String,
    pub description: String,
    pub ty: JsonType,
    pub example: String,
    pub count: u64,
}

static RATE_LIMIT_VOCABULARY: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        (
            "x-ratelimit-limit",
            "Maximum number of requests allowed in the time window",
        ),
        (
            "x-ratelimit-remaining",
            "Number of requests remaining in the current time window",
        ),
        ("x-ratelimit-reset", "Unix timestamp when the rate limit resets"),
        (
            "x-rate-limit-limit",
            "Maximum number of requests allowed in the time window",
        ),
        (
            "x-rate-limit-remaining",
            "Number of requests remaining in the current time window",
        ),
        (
            "x-rate-limit-reset",
            "Unix timestamp when the rate limit resets",
        ),
        (
            "ratelimit-limit",
            "Maximum number of requests allowed in the time window",
        ),
        (
            "ratelimit-remaining",
            "Number of requests remaining in the current time window",
        ),
        ("ratelimit-reset", "Unix timestamp when the rate limit resets"),
        ("retry-after", "Number of seconds to wait before retrying"),
        ("x-retry-after", "Number of seconds to wait before retrying"),
    ]
    .into_iter()
    .collect()
});

/// Recognizes rate-limit headers from a fixed name vocabulary.
#[derive(Debug, Default)]
pub struct RateLimitDetector {
    headers: BTreeMap<String, RateLimitHeader>,
}

impl RateLimitDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_from_headers(&mut self, headers: &HashMap<String, String>) {
        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            if let Some(description) = RATE_LIMIT_VOCABULARY.get(lower.as_str()).copied() {
                self.add_header(name, description, value);
            }
        }
    }

    fn add_header(&mut self, name: &str, description: &str, value: &str) {
        let header = self
            .headers
            .entry(name.to_string())
            .or_insert_with(|| RateLimitHeader {
                name: name.to_string(),
                description: description.to_string(),
                ty: if value.parse::<i64>().is_ok() {
                    JsonType::Integer
                } else {
                    JsonType::String
                },
                example: value.to_string(),
                count: 0,
            });
        header.count += 1;
    }

    pub fn headers(&self) -> &BTreeMap<String, RateLimitHeader> {
        &self.headers
    }

    pub fn into_headers(self) -> BTreeMap<String, RateLimitHeader> {
        self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bearer_jwt_sets_bearer_format() {
        let mut detector = SecurityDetector::new();
        detector.detect_from_headers(&headers(&[(
            "authorization",
            "Bearer eyJhbGci.eyJzdWI.signature",
        )]));

        let scheme = &detector.schemes()["bearerAuth"];
        assert_eq!(scheme.kind, SecuritySchemeKind::Http);
        assert_eq!(scheme.scheme.as_deref(), Some("bearer"));
        assert_eq!(scheme.bearer_format.as_deref(), Some("JWT"));
        assert_eq!(scheme.count, 1);
    }

    #[test]
    fn opaque_bearer_has_no_format() {
        let mut detector = SecurityDetector::new();
        detector.detect_from_headers(&headers(&[("authorization", "Bearer opaquetoken123")]));
        assert!(detector.schemes()["bearerAuth"].bearer_format.is_none());
    }

    #[test]
    fn basic_and_digest_schemes() {
        let mut detector = SecurityDetector::new();
        detector.detect_from_headers(&headers(&[(
            "authorization",
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==",
        )]));
        detector.detect_from_headers(&headers(&[(
            "authorization",
            "Digest username=\"Mufasa\"",
        )]));

        assert_eq!(
            detector.schemes()["basicAuth"].scheme.as_deref(),
            Some("basic")
        );
        assert_eq!(
            detector.schemes()["digestAuth"].scheme.as_deref(),
            Some("digest")
        );
    }

    #[test]
    fn api_key_headers_are_keyed_by_kind() {
        let mut detector = SecurityDetector::new();
        detector.detect_from_headers(&headers(&[("x-api-key", "k1")]));
        detector.detect_from_headers(&headers(&[("x-auth-token", "t1")]));

        let api_key = &detector.schemes()["apiKeyHeader"];
        assert_eq!(api_key.kind, SecuritySchemeKind::ApiKey);
        assert_eq!(api_key.name.as_deref(), Some("x-api-key"));
        assert_eq!(api_key.location.as_deref(), Some("header"));

        assert!(detector.schemes().contains_key("tokenHeader"));
    }

    #[test]
    fn repeat_detections_increment_count() {
        let mut detector = SecurityDetector::new();
        for _ in 0..3 {
            detector.detect_from_headers(&headers(&[("authorization", "Bearer abc")]));
        }
        assert_eq!(detector.schemes()["bearerAuth"].count, 3);
    }

    #[test]
    fn later_jwt_fills_missing_bearer_format() {
        let mut detector = SecurityDetector::new();
        detector.detect_from_headers(&headers(&[("authorization", "Bearer opaque")]));
        detector.detect_from_headers(&headers(&[("authorization", "Bearer aa.bb.cc")]));
        assert_eq!(
            detector.schemes()["bearerAuth"].bearer_format.as_deref(),
            Some("JWT")
        );
    }

    #[rstest::rstest]
    #[case("eyJhbGci.eyJzdWI.signature", true)]
    #[case("aa.bb.cc", true)]
    #[case("aa.bb", false)]
    #[case("aa.bb.cc.dd", false)]
    #[case("aa.b b.cc", false)]
    #[case("", false)]
    fn jwt_detection(#[case] token: &str, #[case] expected: bool) {
        assert_eq!(is_jwt(token), expected, "{token}");
    }

    #[test]
    fn pagination_detector_maps_vocabulary() {
        let mut detector = PaginationDetector::new();
        let mut query = HashMap::new();
        query.insert("page".to_string(), QueryValue::One("2".to_string()));
        query.insert("limit".to_string(), QueryValue::One("50".to_string()));
        query.insert("cursor".to_string(), QueryValue::One("abc".to_string()));
        query.insert("q".to_string(), QueryValue::One("search".to_string()));
        detector.detect_from_query(&query);

        assert_eq!(
            detector.params()["page"].category,
            PaginationCategory::Page
        );
        assert_eq!(
            detector.params()["limit"].category,
            PaginationCategory::Offset
        );
        assert_eq!(
            detector.params()["cursor"].category,
            PaginationCategory::Cursor
        );
        assert!(!detector.params().contains_key("q"));
    }

    #[test]
    fn pagination_tracks_min_max_for_numeric_values() {
        let mut detector = PaginationDetector::new();
        for v in ["10", "50", "25"] {
            let mut query = HashMap::new();
            query.insert("limit".to_string(), QueryValue::One(v.to_string()));
            detector.detect_from_query(&query);
        }

        let param = &detector.params()["limit"];
        assert_eq!(param.min, Some(10));
        assert_eq!(param.max, Some(50));
        assert_eq!(param.examples, vec!["10", "50", "25"]);
        assert_eq!(param.description, "Number of items per page");
    }

    #[test]
    fn pagination_non_numeric_skips_min_max() {
        let mut detector = PaginationDetector::new();
        let mut query = HashMap::new();
        query.insert("cursor".to_string(), QueryValue::One("abc".to_string()));
        detector.detect_from_query(&query);

        let param = &detector.params()["cursor"];
        assert!(param.min.is_none());
        assert!(param.max.is_none());
    }

    #[test]
    fn rate_limit_detector_maps_vocabulary() {
        let mut detector = RateLimitDetector::new();
        detector.detect_from_headers(&headers(&[
            ("x-ratelimit-limit", "100"),
            ("x-ratelimit-remaining", "99"),
            ("retry-after", "Wed, 21 Oct 2026 07:28:00 GMT"),
            ("content-type", "application/json"),
        ]));

        let limit = &detector.headers()["x-ratelimit-limit"];
        assert_eq!(limit.ty, JsonType::Integer);
        assert_eq!(limit.example, "100");
        assert!(limit.description.contains("Maximum number of requests"));

        let retry = &detector.headers()["retry-after"];
        assert_eq!(retry.ty, JsonType::String);

        assert!(!detector.headers().contains_key("content-type"));
    }

    #[test]
    fn rate_limit_counts_repeat_observations() {
        let mut detector = RateLimitDetector::new();
        for _ in 0..2 {
            detector.detect_from_headers(&headers(&[("x-ratelimit-limit", "100")]));
        }
        assert_eq!(detector.headers()["x-ratelimit-limit"].count, 2);
    }
}
