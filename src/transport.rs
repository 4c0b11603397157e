// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! HTTP round-tripper that records request/response pairs as IR records.

use async_trait::async_trait;
use chrono::Utc;
use hyper::{Body, HeaderMap, Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::async_writer::ErrorHandler;
use crate::record::{IrRecord, Method, QueryValue, Scheme, Source};
use crate::writer::SharedWriter;

/// Pluggable HTTP transport, the seam the round-tripper wraps.
///
/// Implementations must not modify the request body stream once consumed.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn round_trip(&self, req: Request<Body>) -> anyhow::Result<Response<Body>>;
}

#[async_trait]
impl<C> HttpTransport for hyper::Client<C>
where
    C: hyper::client::connect::Connect + Clone + Send + Sync + 'static,
{
    async fn round_trip(&self, req: Request<Body>) -> anyhow::Result<Response<Body>> {
        Ok(self.request(req).await?)
    }
}

/// Uniform random source for the sampling filter, injectable for tests.
pub trait Sampler: Send + Sync {
    /// A draw in `[0, 1)`.
    fn sample(&self) -> f64;
}

struct ThreadRngSampler;

impl Sampler for ThreadRngSampler {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Configures capture behavior for [`LoggingTransport`].
#[derive(Clone)]
pub struct LoggingOptions {
    /// Header names excluded from capture, compared lowercase.
    pub filter_headers: Vec<String>,

    pub include_request_body: bool,
    pub include_response_body: bool,

    /// Body capture cap in bytes; 0 means unlimited.
    pub max_body_size: usize,

    /// Source tag stamped on emitted records.
    pub source: Source,

    /// Path prefixes that are never logged.
    pub skip_paths: Vec<String>,

    /// When non-empty, only these methods are logged (case-insensitive).
    pub allow_methods: Vec<String>,

    /// When non-empty, only these hosts are logged (case-insensitive).
    pub allow_hosts: Vec<String>,

    /// Status codes whose exchanges are not logged.
    pub skip_status_codes: Vec<u16>,

    /// Fraction of requests to log. Values at or below zero and at or above
    /// one both mean "log everything", so a zero-initialized options struct
    /// stays safe.
    pub sample_rate: f64,

    /// Headers checked in order for a request ID; first non-empty value
    /// becomes the record id, otherwise a UUID is generated.
    pub request_id_headers: Vec<String>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            filter_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
                "x-auth-token".to_string(),
            ],
            include_request_body: true,
            include_response_body: true,
            max_body_size: 1 << 20,
            source: Source::Proxy,
            skip_paths: Vec::new(),
            allow_methods: Vec::new(),
            allow_hosts: Vec::new(),
            skip_status_codes: Vec::new(),
            sample_rate: 1.0,
            request_id_headers: Vec::new(),
        }
    }
}

/// Wraps a transport and writes one IR record per observed exchange.
///
/// Capture failures never affect the HTTP result returned to the caller.
/// Safe for concurrent callers.
#[derive(Clone)]
pub struct LoggingTransport {
    base: Arc<dyn HttpTransport>,
    writer: SharedWriter,
    options: Arc<LoggingOptions>,
    sampler: Arc<dyn Sampler>,
    on_error: Option<ErrorHandler>,
}

impl LoggingTransport {
    /// Wrap the default hyper client.
    pub fn new(writer: SharedWriter) -> Self {
        Self {
            base: Arc::new(hyper::Client::new()),
            writer,
            options: Arc::new(LoggingOptions::default()),
            sampler: Arc::new(ThreadRngSampler),
            on_error: None,
        }
    }

    pub fn with_base(mut self, base: Arc<dyn HttpTransport>) -> Self {
        self.base = base;
        self
    }

    pub fn with_options(mut self, options: LoggingOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Called when handing a record to the writer fails.
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Forward a request, recording the exchange when the filters admit it.
    pub async fn round_trip(&self, req: Request<Body>) -> anyhow::Result<Response<Body>> {
        let method = match Method::parse(req.method().as_str()) {
            Some(m) => m,
            // Extension methods fall outside the IR vocabulary; pass through.
            None => return self.base.round_trip(req).await,
        };

        if !self.should_log_request(&req) {
            return self.base.round_trip(req).await;
        }

        let started_wall = Utc::now();
        let started = Instant::now();

        // Capture the request, then restore its body from the in-memory copy
        // so the wrapped transport sees the original bytes.
        let (parts, body) = req.into_parts();
        let request_bytes = hyper::body::to_bytes(body).await?;
        let ir_request = self.capture_request(method, &parts, &request_bytes);
        let request_id = self.extract_request_id(&parts.headers);
        let req = Request::from_parts(parts, Body::from(request_bytes));

        let resp = self.base.round_trip(req).await?;

        if self
            .options
            .skip_status_codes
            .contains(&resp.status().as_u16())
        {
            return Ok(resp);
        }

        let (parts, body) = resp.into_parts();
        let response_bytes = hyper::body::to_bytes(body).await?;
        let ir_response = self.capture_response(&parts, &response_bytes);
        let resp = Response::from_parts(parts, Body::from(response_bytes));

        let duration_ms = started.elapsed().as_millis() as f64;
        let id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let record = IrRecord {
            id: Some(id),
            timestamp: Some(started_wall),
            source: Some(self.options.source),
            request: ir_request,
            response: ir_response,
            duration_ms: Some(duration_ms),
        };

        if let Err(e) = self.writer.write(record).await {
            match &self.on_error {
                Some(handler) => handler(&e),
                None => tracing::warn!(%e, "failed to write capture record"),
            }
        }

        Ok(resp)
    }

    fn should_log_request(&self, req: &Request<Body>) -> bool {
        let rate = self.options.sample_rate;
        if rate > 0.0 && rate < 1.0 && self.sampler.sample() > rate {
            return false;
        }

        let path = req.uri().path();
        if self
            .options
            .skip_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return false;
        }

        if !self.options.allow_methods.is_empty()
            && !self
                .options
                .allow_methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(req.method().as_str()))
        {
            return false;
        }

        if !self.options.allow_hosts.is_empty() {
            let host = request_host(req).unwrap_or_default();
            if !self
                .options
                .allow_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(&host))
            {
                return false;
            }
        }

        true
    }

    fn capture_request(
        &self,
        method: Method,
        parts: &hyper::http::request::Parts,
        body: &[u8],
    ) -> crate::record::Request {
        let uri = &parts.uri;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            // Captured traffic defaults to https when the scheme is elided.
            _ => Scheme::Https,
        };

        let host = uri
            .host()
            .map(|h| h.to_string())
            .or_else(|| header_value(&parts.headers, "host"));

        let query = uri.query().map(parse_query).filter(|q| !q.is_empty());
        let headers = self.filter_headers(&parts.headers);
        let content_type = header_value(&parts.headers, "content-type");

        let captured_body = if self.options.include_request_body {
            self.parse_body(body, content_type.as_deref())
        } else {
            None
        };

        crate::record::Request {
            method,
            path: uri.path().to_string(),
            scheme: Some(scheme),
            host,
            path_template: None,
            path_params: None,
            query,
            headers,
            content_type,
            body: captured_body,
        }
    }

    fn capture_response(
        &self,
        parts: &hyper::http::response::Parts,
        body: &[u8],
    ) -> crate::record::Response {
        let headers = self.filter_headers(&parts.headers);
        let content_type = header_value(&parts.headers, "content-type");

        let captured_body = if self.options.include_response_body {
            self.parse_body(body, content_type.as_deref())
        } else {
            None
        };

        crate::record::Response {
            status: parts.status.as_u16(),
            headers,
            content_type,
            body: captured_body,
        }
    }

    fn extract_request_id(&self, headers: &HeaderMap) -> Option<String> {
        self.options
            .request_id_headers
            .iter()
            .find_map(|name| header_value(headers, name).filter(|v| !v.is_empty()))
    }

    fn filter_headers(&self, headers: &HeaderMap) -> Option<HashMap<String, String>> {
        let mut out = HashMap::new();
        for (name, value) in headers.iter() {
            let key = name.as_str().to_ascii_lowercase();
            if self
                .options
                .filter_headers
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&key))
            {
                continue;
            }
            if let Ok(v) = value.to_str() {
                out.insert(key, v.to_string());
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// JSON-looking payloads are decoded; everything else is kept as text.
    fn parse_body(&self, data: &[u8], content_type: Option<&str>) -> Option<Value> {
        if data.is_empty() {
            return None;
        }

        let max = self.options.max_body_size;
        let capped = if max > 0 && data.len() > max {
            &data[..max]
        } else {
            data
        };

        if let Some(ct) = content_type {
            if ct.contains("application/json") || ct.contains("+json") {
                if let Ok(v) = serde_json::from_slice(capped) {
                    return Some(v);
                }
            }
        }

        Some(Value::String(
            String::from_utf8_lossy(capped).into_owned(),
        ))
    }
}

fn request_host(req: &Request<Body>) -> Option<String> {
    req.uri()
        .host()
        .map(|h| h.to_string())
        .or_else(|| header_value(req.headers(), "host"))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Parse a raw query string, coalescing single-valued keys to scalars.
fn parse_query(query: &str) -> HashMap<String, QueryValue> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        grouped.entry(k.into_owned()).or_default().push(v.into_owned());
    }

    grouped
        .into_iter()
        .map(|(k, mut vs)| {
            let value = if vs.len() == 1 {
                QueryValue::One(vs.remove(0))
            } else {
                QueryValue::Many(vs)
            };
            (k, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{ChannelReader, IrReader};
    use crate::writer::ChannelWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedSampler(f64);

    impl Sampler for FixedSampler {
        fn sample(&self) -> f64 {
            self.0
        }
    }

    struct SeqSampler(Mutex<Vec<f64>>);

    impl Sampler for SeqSampler {
        fn sample(&self) -> f64 {
            self.0.lock().expect("sampler lock").remove(0)
        }
    }

    fn channel_transport() -> (SharedWriter, ChannelReader) {
        let (tx, rx) = mpsc::channel(64);
        (
            SharedWriter::new(Box::new(ChannelWriter::new(tx))),
            ChannelReader::new(rx),
        )
    }

    async fn drain_records(mut reader: ChannelReader, shared: SharedWriter) -> Vec<IrRecord> {
        shared.close().await.expect("close writer");
        let mut out = Vec::new();
        while let Some(r) = reader.read().await.expect("read") {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn forwards_and_records_json_exchange() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(body_json(serde_json::json!({"name": "Alice"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("content-type", "application/json")
                    .set_body_json(serde_json::json!({"id": 1})),
            )
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone())
            .with_options(LoggingOptions {
                request_id_headers: vec!["x-request-id".to_string()],
                ..LoggingOptions::default()
            });

        let req = Request::builder()
            .method("POST")
            .uri(format!("{}/users?limit=10", mock.uri()))
            .header("content-type", "application/json")
            .header("authorization", "Bearer secret")
            .header("x-request-id", "req-1")
            .body(Body::from(r#"{"name": "Alice"}"#))
            .unwrap();

        let resp = transport.round_trip(req).await?;
        assert_eq!(resp.status(), 201);

        // The response body is restored for the caller.
        let body = hyper::body::to_bytes(resp.into_body()).await?;
        assert_eq!(
            serde_json::from_slice::<Value>(&body)?,
            serde_json::json!({"id": 1})
        );

        let records = drain_records(reader, shared).await;
        assert_eq!(records.len(), 1);
        let record = &records[0];

        assert_eq!(record.id.as_deref(), Some("req-1"));
        assert_eq!(record.source, Some(Source::Proxy));
        assert_eq!(record.request.method, Method::Post);
        assert_eq!(record.request.path, "/users");
        assert_eq!(
            record.request.query.as_ref().unwrap()["limit"],
            QueryValue::One("10".to_string())
        );
        // Sensitive headers are filtered out.
        assert!(!record
            .request
            .headers
            .as_ref()
            .unwrap()
            .contains_key("authorization"));
        assert_eq!(
            record.request.body,
            Some(serde_json::json!({"name": "Alice"}))
        );
        assert_eq!(record.response.status, 201);
        assert_eq!(record.response.body, Some(serde_json::json!({"id": 1})));
        assert!(record.duration_ms.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn generates_uuid_when_no_request_id_header() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone());

        let req = Request::builder()
            .uri(mock.uri())
            .body(Body::empty())
            .unwrap();
        transport.round_trip(req).await?;

        let records = drain_records(reader, shared).await;
        let id = records[0].id.as_deref().expect("id");
        assert!(Uuid::parse_str(id).is_ok());
        Ok(())
    }

    #[rstest::rstest]
    #[case(0.0, 0.7, true)]
    #[case(1.0, 0.7, true)]
    #[case(1.5, 0.99, true)]
    #[case(-0.5, 0.99, true)]
    #[case(0.5, 0.4, true)]
    #[case(0.5, 0.6, false)]
    #[tokio::test]
    async fn sample_rate_filtering(
        #[case] rate: f64,
        #[case] draw: f64,
        #[case] logged: bool,
    ) -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone())
            .with_options(LoggingOptions {
                sample_rate: rate,
                ..LoggingOptions::default()
            })
            .with_sampler(Arc::new(FixedSampler(draw)));

        let req = Request::builder()
            .uri(mock.uri())
            .body(Body::empty())
            .unwrap();
        transport.round_trip(req).await?;

        let records = drain_records(reader, shared).await;
        assert_eq!(records.len(), usize::from(logged));
        Ok(())
    }

    #[tokio::test]
    async fn pre_flight_filters_pass_through_unlogged() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone()).with_options(LoggingOptions {
            skip_paths: vec!["/health".to_string()],
            allow_methods: vec!["GET".to_string()],
            allow_hosts: vec!["127.0.0.1".to_string()],
            ..LoggingOptions::default()
        });

        // Skipped path.
        let req = Request::builder()
            .uri(format!("{}/health/live", mock.uri()))
            .body(Body::empty())
            .unwrap();
        assert_eq!(transport.round_trip(req).await?.status(), 200);

        // Disallowed method.
        let req = Request::builder()
            .method("DELETE")
            .uri(format!("{}/users", mock.uri()))
            .body(Body::empty())
            .unwrap();
        assert_eq!(transport.round_trip(req).await?.status(), 204);

        // Allowed: GET on an allowed host outside the skip prefix.
        let req = Request::builder()
            .uri(format!("{}/users", mock.uri()))
            .body(Body::empty())
            .unwrap();
        assert_eq!(transport.round_trip(req).await?.status(), 200);

        let records = drain_records(reader, shared).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request.path, "/users");
        Ok(())
    }

    #[tokio::test]
    async fn skip_status_codes_drop_post_flight() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;
        Mock::given(path("/found"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone()).with_options(LoggingOptions {
            skip_status_codes: vec![404],
            ..LoggingOptions::default()
        });

        for p in ["/missing", "/found"] {
            let req = Request::builder()
                .uri(format!("{}{}", mock.uri(), p))
                .body(Body::empty())
                .unwrap();
            transport.round_trip(req).await?;
        }

        let records = drain_records(reader, shared).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response.status, 200);
        Ok(())
    }

    #[tokio::test]
    async fn transport_errors_propagate_unlogged() -> anyhow::Result<()> {
        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone());

        // A port that is (very likely) closed.
        let req = Request::builder()
            .uri("http://127.0.0.1:9/")
            .body(Body::empty())
            .unwrap();
        assert!(transport.round_trip(req).await.is_err());

        let records = drain_records(reader, shared).await;
        assert!(records.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn writer_failure_never_fails_the_call() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let (tx, _rx) = mpsc::channel(1);
        let mut closed = ChannelWriter::new(tx);
        use crate::writer::IrWriter;
        closed.close().await?;
        let shared = SharedWriter::new(Box::new(closed));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let transport = LoggingTransport::new(shared)
            .with_error_handler(Arc::new(move |_| {
                seen2.fetch_add(1, Ordering::SeqCst);
            }));

        let req = Request::builder()
            .uri(mock.uri())
            .body(Body::empty())
            .unwrap();
        let resp = transport.round_trip(req).await?;

        assert_eq!(resp.status(), 200);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn non_json_bodies_are_captured_as_text() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("hello"),
            )
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone());

        let req = Request::builder()
            .uri(mock.uri())
            .body(Body::empty())
            .unwrap();
        transport.round_trip(req).await?;

        let records = drain_records(reader, shared).await;
        assert_eq!(
            records[0].response.body,
            Some(Value::String("hello".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_raw_text() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("{not json"),
            )
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone());

        let req = Request::builder()
            .uri(mock.uri())
            .body(Body::empty())
            .unwrap();
        transport.round_trip(req).await?;

        let records = drain_records(reader, shared).await;
        assert_eq!(
            records[0].response.body,
            Some(Value::String("{not json".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn sequential_draws_respect_rate_boundaries() -> anyhow::Result<()> {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let (shared, reader) = channel_transport();
        let transport = LoggingTransport::new(shared.clone())
            .with_options(LoggingOptions {
                sample_rate: 0.5,
                ..LoggingOptions::default()
            })
            .with_sampler(Arc::new(SeqSampler(Mutex::new(vec![0.1, 0.9, 0.3, 0.8]))));

        for _ in 0..4 {
            let req = Request::builder()
                .uri(mock.uri())
                .body(Body::empty())
                .unwrap();
            transport.round_trip(req).await?;
        }

        let records = drain_records(reader, shared).await;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[test]
    fn parse_query_coalesces_singletons() {
        let q = parse_query("a=1&b=2&b=3&c=");
        assert_eq!(q["a"], QueryValue::One("1".to_string()));
        assert_eq!(
            q["b"],
            QueryValue::Many(vec!["2".to_string(), "3".to_string()])
        );
        assert_eq!(q["c"], QueryValue::One(String::new()));
    }
}
