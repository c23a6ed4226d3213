use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::LazyLock;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

use replicated_core::ValidationError;
use replicated_core::error::codes;

use crate::resilience::{
    Admission, BreakerSettings, CircuitBreaker, RetryPolicy, is_retryable_status,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.replicated.com/vendor";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 10;
pub const USER_AGENT: &str = concat!("replicated-mcp-server/", env!("CARGO_PKG_VERSION"));

static PATH_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://vendor.invalid/").expect("static base URL parses"));

/// A GET against the vendor API, expressed as unescaped path segments so
/// identifiers can never smuggle extra path components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Escaped path, e.g. `/v3/app/my%20app/releases`. Escaping is the same
    /// one the transport applies against the real endpoint.
    pub fn path(&self) -> String {
        self.apply_to(&PATH_BASE)
            .map(|url| url.path().to_string())
            .unwrap_or_default()
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn apply_to(&self, base: &Url) -> Result<Url, TransportError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Build(format!("endpoint '{base}' cannot be a base URL")))?
            .pop_if_empty()
            .extend(&self.segments);
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

/// What a transport hands back for any completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: serde_json::to_vec(body).unwrap_or_default(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

/// The seam between entity services and the network.
pub trait Transport: Send + Sync + 'static {
    fn get(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// reqwest-backed transport carrying the vendor token and user agent.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: Url,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(endpoint: Url, api_token: &str) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        // Vendor-portal tokens are sent as-is, without a "Bearer" scheme.
        let mut auth = HeaderValue::from_str(api_token)
            .map_err(|_| TransportError::Build("API token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let url = request.apply_to(&self.endpoint)?;
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(format!("failed to read response body: {e}")))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
            retry_after,
        })
    }
}

/// Non-2xx vendor API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    /// Message defaults to the canonical status text; a JSON body's
    /// `message` (or `error`) and `details` override it.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let mut message = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
            .to_string();
        let mut details = None;

        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
            if let Some(m) = map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
            {
                message = m.to_string();
            }
            details = match map.get("details") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
        }

        Self {
            status,
            message,
            details,
        }
    }

    /// Stable machine code for agents.
    pub fn code(&self) -> &'static str {
        match self.status {
            401 => "unauthorized",
            403 => "forbidden",
            404 => "not_found",
            429 => "rate_limited",
            _ => "api_error",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error (status {}): {}", self.status, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " - {details}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or malformed input, raised before any request is built.
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        source: TransportError,
    },
    #[error("{operation}: request timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("{operation}: vendor API circuit is open after repeated failures; retry in {}s", .retry_in.as_secs())]
    CircuitOpen {
        operation: &'static str,
        retry_in: Duration,
    },
    #[error("{operation}: {source}")]
    Api {
        operation: &'static str,
        source: ApiError,
    },
    #[error("{operation}: failed to decode response: {source}")]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ClientError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ClientError::InvalidArgument(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ClientError::InvalidArgument(_) => codes::VALIDATION_FAILED,
            ClientError::Transport { .. } => "transport_error",
            ClientError::Timeout { .. } => "timeout",
            ClientError::CircuitOpen { .. } => "circuit_open",
            ClientError::Api { source, .. } => source.code(),
            ClientError::Decode { .. } => "decode_error",
            ClientError::Validation(_) => codes::ENTITY_INVALID,
        }
    }

    pub fn api_status(&self) -> Option<u16> {
        match self {
            ClientError::Api { source, .. } => Some(source.status),
            _ => None,
        }
    }
}

/// What to do with entities that fail validation after decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Log a warning and return the data anyway.
    #[default]
    Advisory,
    /// Fail the call.
    Strict,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: BreakerSettings,
    /// Outbound requests per second; `None` disables client-side throttling.
    pub rate_limit: Option<NonZeroU32>,
    pub validation: ValidationMode,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            breaker: BreakerSettings::default(),
            rate_limit: NonZeroU32::new(DEFAULT_RATE_LIMIT_PER_SEC),
            validation: ValidationMode::Advisory,
        }
    }
}

/// Shared, read-only handle on the vendor API. Services borrow it.
pub struct VendorClient<T = HttpTransport> {
    transport: T,
    timeout: Duration,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    limiter: Option<DefaultDirectRateLimiter>,
    validation: ValidationMode,
}

impl<T: Transport> VendorClient<T> {
    pub fn new(transport: T, options: ClientOptions) -> Self {
        Self {
            transport,
            timeout: options.timeout,
            retry: options.retry,
            breaker: CircuitBreaker::new(options.breaker),
            limiter: options
                .rate_limit
                .map(|rps| RateLimiter::direct(Quota::per_second(rps))),
            validation: options.validation,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.validation
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a GET and parse the body as JSON.
    ///
    /// Each attempt gets the full per-request timeout. Connect failures and
    /// throttling/gateway statuses are retried per the retry policy; nothing
    /// else is.
    pub async fn get_json(
        &self,
        operation: &'static str,
        request: &ApiRequest,
    ) -> Result<Value, ClientError> {
        let admission = self
            .breaker
            .check()
            .map_err(|retry_in| ClientError::CircuitOpen {
                operation,
                retry_in,
            })?;
        let mut probe = ProbeGuard {
            breaker: &self.breaker,
            pending: admission == Admission::Probe,
        };
        let result = self.send_with_retries(operation, request).await;
        probe.pending = false;
        result
    }

    /// Every terminal outcome records success or failure on the breaker.
    async fn send_with_retries(
        &self,
        operation: &'static str,
        request: &ApiRequest,
    ) -> Result<Value, ClientError> {
        let path = request.path();
        let mut attempt = 0_u32;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            tracing::debug!(operation, path = %path, attempt, "vendor API request");

            let outcome = tokio::time::timeout(self.timeout, self.transport.get(request)).await;
            let response = match outcome {
                Err(_) => {
                    self.breaker.record_failure();
                    tracing::warn!(operation, path = %path, timeout_ms = self.timeout.as_millis() as u64, "vendor API request timed out");
                    return Err(ClientError::Timeout {
                        operation,
                        timeout: self.timeout,
                    });
                }
                Ok(Err(err)) => {
                    if err.is_retryable() && self.retry.allows(attempt) {
                        let delay = self.retry.delay(attempt, None);
                        tracing::info!(operation, error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying vendor API request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    self.breaker.record_failure();
                    tracing::warn!(operation, path = %path, error = %err, "vendor API request failed");
                    return Err(ClientError::Transport {
                        operation,
                        source: err,
                    });
                }
                Ok(Ok(response)) => response,
            };

            if response.is_success() {
                self.breaker.record_success();
                return serde_json::from_slice(&response.body)
                    .map_err(|source| ClientError::Decode { operation, source });
            }

            if is_retryable_status(response.status) && self.retry.allows(attempt) {
                let delay = self.retry.delay(attempt, response.retry_after);
                tracing::info!(operation, status = response.status, attempt, delay_ms = delay.as_millis() as u64, "retrying vendor API request");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if response.status >= 500 || response.status == 429 {
                self.breaker.record_failure();
            } else {
                self.breaker.record_success();
            }
            let err = ApiError::from_response(response.status, &response.body);
            tracing::warn!(operation, path = %path, status = err.status, error = %err, "vendor API returned error status");
            return Err(ClientError::Api {
                operation,
                source: err,
            });
        }
    }
}

/// Hands the half-open slot back when a probe's future is dropped before
/// it reaches an outcome (cancelled task, caller-side timeout).
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    pending: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.pending {
            self.breaker.abandon_probe();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockTransport, client};
    use super::*;
    use serde_json::json;

    #[test]
    fn request_path_escapes_each_segment() {
        let request = ApiRequest::new(["v3", "app", "my app/x", "releases"]);
        assert_eq!(request.path(), "/v3/app/my%20app%2Fx/releases");
    }

    #[test]
    fn request_url_keeps_endpoint_prefix_and_query() {
        let base = Url::parse("https://api.replicated.com/vendor").unwrap();
        let url = ApiRequest::new(["v3", "app", "a1", "channels"])
            .query("limit", 5)
            .query("offset", 10)
            .apply_to(&base)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.replicated.com/vendor/v3/app/a1/channels?limit=5&offset=10"
        );
    }

    #[test]
    fn api_error_prefers_body_message_and_details() {
        let err = ApiError::from_response(
            404,
            br#"{"message":"Not Found","details":"app missing does not exist"}"#,
        );
        assert_eq!(
            err.to_string(),
            "API error (status 404): Not Found - app missing does not exist"
        );
        assert_eq!(err.code(), "not_found");

        let bare = ApiError::from_response(503, b"upstream unavailable");
        assert_eq!(bare.message, "Service Unavailable");
        assert_eq!(bare.details, None);
    }

    #[test]
    fn client_error_codes_are_stable() {
        assert_eq!(ClientError::invalid("x").code(), "validation_failed");
        let api = ClientError::Api {
            operation: "get application",
            source: ApiError::from_response(401, b"{}"),
        };
        assert_eq!(api.code(), "unauthorized");
        assert_eq!(api.api_status(), Some(401));
    }

    #[tokio::test]
    async fn timeout_aborts_slow_transport_without_decoding() {
        let transport = MockTransport::always(json!({"applications": []}))
            .with_delay(Duration::from_millis(100));
        let client = VendorClient::new(
            transport,
            ClientOptions {
                timeout: Duration::from_millis(10),
                retry: RetryPolicy::none(),
                rate_limit: None,
                ..ClientOptions::default()
            },
        );

        let err = client
            .get_json("list applications", &ApiRequest::new(["v1", "applications"]))
            .await
            .expect_err("slow transport should time out");
        assert!(matches!(err, ClientError::Timeout { .. }), "{err}");
        assert_eq!(err.code(), "timeout");
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_status_is_retried_then_succeeds() {
        let transport = MockTransport::new()
            .with_response(503, json!({"message": "try later"}))
            .with_response(429, json!({}))
            .with_response(200, json!({"ok": true}));
        let client = VendorClient::new(
            transport,
            ClientOptions {
                rate_limit: None,
                ..ClientOptions::default()
            },
        );

        let body = client
            .get_json("list applications", &ApiRequest::new(["v1", "applications"]))
            .await
            .unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(client.transport().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_never_retried() {
        let transport = MockTransport::new().with_response(404, json!({"message": "Not Found"}));
        let client = VendorClient::new(
            transport,
            ClientOptions {
                rate_limit: None,
                ..ClientOptions::default()
            },
        );

        let err = client
            .get_json("get application", &ApiRequest::new(["v1", "applications", "missing"]))
            .await
            .unwrap_err();
        assert_eq!(err.api_status(), Some(404));
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_transport_call() {
        let client = VendorClient::new(
            MockTransport::new(),
            ClientOptions {
                retry: RetryPolicy::none(),
                rate_limit: None,
                breaker: BreakerSettings {
                    failure_threshold: 2,
                    cooldown: Duration::from_secs(60),
                },
                ..ClientOptions::default()
            },
        );
        let request = ApiRequest::new(["v1", "applications"]);

        // Exhausted mock yields connect errors.
        for _ in 0..2 {
            let err = client.get_json("list applications", &request).await.unwrap_err();
            assert_eq!(err.code(), "transport_error");
        }
        let err = client.get_json("list applications", &request).await.unwrap_err();
        assert_eq!(err.code(), "circuit_open");
        assert_eq!(client.transport().calls(), 2);
    }

    #[tokio::test]
    async fn dropped_half_open_call_does_not_wedge_the_circuit() {
        let transport = MockTransport::always(json!({"ok": true}))
            .with_response(500, json!({"message": "boom"}))
            .with_delay(Duration::from_millis(20));
        let client = VendorClient::new(
            transport,
            ClientOptions {
                retry: RetryPolicy::none(),
                rate_limit: None,
                breaker: BreakerSettings {
                    failure_threshold: 1,
                    cooldown: Duration::from_millis(50),
                },
                ..ClientOptions::default()
            },
        );
        let request = ApiRequest::new(["v1", "applications"]);

        let err = client.get_json("list applications", &request).await.unwrap_err();
        assert_eq!(err.api_status(), Some(500));
        tokio::time::sleep(Duration::from_millis(80)).await;

        // The half-open call is abandoned mid-flight.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            client.get_json("list applications", &request),
        )
        .await;
        assert!(abandoned.is_err());

        let body = client.get_json("list applications", &request).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(client.transport().calls(), 3);
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let client = client(MockTransport::new().with_raw(RawResponse {
            status: 200,
            body: b"{not json".to_vec(),
            retry_after: None,
        }));
        let err = client
            .get_json("list applications", &ApiRequest::new(["v1", "applications"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "decode_error");
        assert!(err.to_string().starts_with("list applications: failed to decode response"));
    }
}
