//! HTTP exchange with a host-keyed CORS relay policy.
//!
//! A [`Transport`] turns an [`HttpRequest`] into an [`HttpResponse`]. A
//! completed exchange is always returned, whatever its status code; only a
//! failure to exchange at all (DNS, refused connection, blocked request,
//! timeout) is an error, and that error is [`EffigyError::Transport`].

use crate::error::{parse_retry_after, sanitize_error_message, EffigyError, Result};
use crate::observer::{NoopObserver, Observer, TaskEvent};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Public CORS relay used in browser execution.
pub const DEFAULT_CORS_RELAY: &str = "https://corsproxy.io/?";

/// Upper bound on one HTTP exchange, body included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Upper bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// An outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: String,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request carrying a JSON body.
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(body),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds `Authorization: Bearer {key}` and `Accept: application/json`.
    pub fn bearer(self, api_key: &str) -> Self {
        self.header("Authorization", format!("Bearer {api_key}"))
            .header("Accept", "application/json")
    }

    /// Returns the first header value with the given name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a JSON response.
    pub fn json_body(status: u16, body: &Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response.headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        response
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            EffigyError::Protocol(format!(
                "invalid JSON body ({e}): {}",
                sanitize_error_message(&self.body)
            ))
        })
    }

    /// Converts a non-2xx response into [`EffigyError::Http`].
    pub fn into_error(self) -> EffigyError {
        let retry_after = parse_retry_after(&self.headers).map(Duration::from_secs);
        let message = error_message(&self.body)
            .unwrap_or_else(|| format!("service returned HTTP {}", self.status));
        EffigyError::Http {
            status: self.status,
            message,
            retry_after,
        }
    }
}

/// Extracts a readable message from an error body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_html(trimmed) {
        return Some(summarize_html(trimmed).to_string());
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let found = ["/error/message", "/message", "/error"]
            .iter()
            .find_map(|p| value.pointer(p).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty());
        if let Some(msg) = found {
            return Some(sanitize_error_message(msg));
        }
    }
    Some(sanitize_error_message(trimmed))
}

fn is_html(body: &str) -> bool {
    let head: String = body.chars().take(256).collect::<String>().to_ascii_lowercase();
    head.contains("<!doctype html") || head.contains("<html")
}

/// Reduces an HTML error page (usually from a CDN) to a short marker.
fn summarize_html(body: &str) -> &'static str {
    if body.contains("Origin DNS error") {
        "HTML error page: origin DNS error"
    } else if body.to_ascii_lowercase().contains("cloudflare") {
        "HTML error page: Cloudflare"
    } else {
        "HTML error page"
    }
}

/// Sends HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one exchange. Non-2xx statuses are returned, not raised.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Where the client runs; browsers block some cross-origin requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Native process; requests always go direct.
    #[default]
    Native,
    /// Browser-hosted; cross-origin rules apply.
    Browser,
}

/// How requests to a host are routed in browser execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRule {
    /// Always use the relay.
    Always,
    /// Go direct, retry through the relay on a network error.
    OnNetworkError,
    /// Always go direct.
    Never,
}

/// Host-keyed relay routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPolicy {
    relay_prefix: String,
    rules: Vec<(String, ProxyRule)>,
    default_rule: ProxyRule,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            relay_prefix: DEFAULT_CORS_RELAY.to_string(),
            rules: vec![
                ("api.apimart.ai".into(), ProxyRule::Always),
                ("api-inference.modelscope.cn".into(), ProxyRule::Always),
            ],
            default_rule: ProxyRule::OnNetworkError,
        }
    }
}

impl ProxyPolicy {
    /// Creates a policy with no host rules.
    pub fn new(relay_prefix: impl Into<String>) -> Self {
        Self {
            relay_prefix: relay_prefix.into(),
            rules: Vec::new(),
            default_rule: ProxyRule::OnNetworkError,
        }
    }

    /// Adds or replaces the rule for a host.
    pub fn rule(mut self, host: impl Into<String>, rule: ProxyRule) -> Self {
        let host = host.into().to_ascii_lowercase();
        self.rules.retain(|(h, _)| *h != host);
        self.rules.push((host, rule));
        self
    }

    /// Sets the rule for hosts not in the table.
    pub fn default_rule(mut self, rule: ProxyRule) -> Self {
        self.default_rule = rule;
        self
    }

    /// Returns the rule for a target URL. Subdomains inherit their parent's rule.
    pub fn rule_for(&self, target: &str) -> ProxyRule {
        let Some(host) = url::Url::parse(target)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return self.default_rule;
        };
        self.rules
            .iter()
            .find(|(h, _)| host == *h || host.ends_with(&format!(".{h}")))
            .map(|(_, rule)| *rule)
            .unwrap_or(self.default_rule)
    }

    /// Returns the relay URL for a target.
    pub fn proxied_url(&self, target: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{}{}", self.relay_prefix, encoded)
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    let built = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
        .build();
    match built {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("failed to configure HTTP client timeouts ({e}), using reqwest defaults");
            reqwest::Client::new()
        }
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    context: ExecutionContext,
    policy: ProxyPolicy,
    observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("context", &self.context)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    /// Creates a native transport with the default relay policy and timeouts.
    pub fn new() -> Self {
        Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            context: ExecutionContext::default(),
            policy: ProxyPolicy::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets the per-request timeout. A stalled exchange then fails with
    /// [`EffigyError::Transport`], which pollers treat as transient.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Uses a preconfigured `reqwest` client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Sets the execution context.
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the relay policy.
    pub fn with_policy(mut self, policy: ProxyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the observer notified on relay fallbacks.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    async fn execute(&self, request: &HttpRequest, url: &str) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_proxied(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.observer.on_event(&TaskEvent::ProxyFallback {
            url: request.url.clone(),
        });
        let proxied = self.policy.proxied_url(&request.url);
        self.execute(request, &proxied).await
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        if self.context == ExecutionContext::Native {
            return self.execute(&request, &request.url).await;
        }

        match self.policy.rule_for(&request.url) {
            ProxyRule::Never => self.execute(&request, &request.url).await,
            ProxyRule::Always => self.execute_proxied(&request).await,
            ProxyRule::OnNetworkError => match self.execute(&request, &request.url).await {
                Err(EffigyError::Transport { message, .. }) => {
                    tracing::warn!(url = %request.url, "direct request failed ({message}), retrying through relay");
                    self.execute_proxied(&request).await
                }
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_policy_table() {
        let policy = ProxyPolicy::default();
        assert_eq!(
            policy.rule_for("https://api.apimart.ai/v1/tasks/abc"),
            ProxyRule::Always
        );
        assert_eq!(
            policy.rule_for("https://api-inference.modelscope.cn/v1/images/generations"),
            ProxyRule::Always
        );
        assert_eq!(
            policy.rule_for("https://gw.example.com/v1/video/create"),
            ProxyRule::OnNetworkError
        );
        assert_eq!(policy.rule_for("not a url"), ProxyRule::OnNetworkError);
    }

    #[test]
    fn test_policy_rules_are_data() {
        let policy = ProxyPolicy::new("https://relay.test/?url=")
            .rule("Example.com", ProxyRule::Never)
            .default_rule(ProxyRule::Always);

        assert_eq!(policy.rule_for("https://example.com/x"), ProxyRule::Never);
        assert_eq!(policy.rule_for("https://cdn.example.com/x"), ProxyRule::Never);
        assert_eq!(policy.rule_for("https://notexample.com/x"), ProxyRule::Always);
    }

    #[test]
    fn test_proxied_url_encodes_target() {
        let policy = ProxyPolicy::default();
        assert_eq!(
            policy.proxied_url("https://api.apimart.ai/v1/tasks/a?language=zh"),
            "https://corsproxy.io/?https%3A%2F%2Fapi.apimart.ai%2Fv1%2Ftasks%2Fa%3Flanguage%3Dzh"
        );
    }

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::post_json("https://x/v1/video/create", json!({"a": 1}))
            .bearer("secret");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.header_value("authorization"), Some("Bearer secret"));
        assert_eq!(req.header_value("Content-Type"), Some("application/json"));
        assert_eq!(req.header_value("Accept"), Some("application/json"));
        assert_eq!(req.body, Some(json!({"a": 1})));
    }

    #[test]
    fn test_into_error_prefers_json_fields() {
        let resp = HttpResponse::json_body(400, &json!({"error": {"message": "bad model"}}));
        match resp.into_error() {
            EffigyError::Http {
                status, message, ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad model");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let resp = HttpResponse::json_body(401, &json!({"message": "invalid token"}));
        assert!(resp.into_error().to_string().contains("invalid token"));

        let resp = HttpResponse::json_body(403, &json!({"error": "forbidden"}));
        assert!(resp.into_error().to_string().contains("forbidden"));
    }

    #[test]
    fn test_into_error_summarizes_html() {
        let page = "<!DOCTYPE html><html><head><title>api.x | 530: Origin DNS error</title></head></html>";
        let err = HttpResponse::new(530, page).into_error();
        assert_eq!(
            err.to_string(),
            "API error: 530 - HTML error page: origin DNS error"
        );

        let err = HttpResponse::new(502, "<html><body>Bad gateway</body></html>").into_error();
        assert_eq!(err.to_string(), "API error: 502 - HTML error page");
    }

    #[test]
    fn test_into_error_plain_and_empty_bodies() {
        let err = HttpResponse::new(500, "  upstream exploded ").into_error();
        assert_eq!(err.to_string(), "API error: 500 - upstream exploded");

        let err = HttpResponse::new(504, "").into_error();
        assert_eq!(err.to_string(), "API error: 504 - service returned HTTP 504");
    }

    #[test]
    fn test_into_error_reads_retry_after() {
        let mut resp = HttpResponse::new(429, "slow down");
        resp.headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("12"),
        );
        assert_eq!(resp.into_error().retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_json_parse_failure_is_protocol_error() {
        let resp = HttpResponse::new(200, "not json");
        let err = resp.json::<Value>().unwrap_err();
        assert!(matches!(err, EffigyError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_native_transport_reports_connection_failure_as_transport_error() {
        let transport = ReqwestTransport::new();
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let err = transport
            .send(HttpRequest::get("http://127.0.0.1:9/v1/video/query?id=x"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
