//! One-shot HTTP transport behind the request queue.
//!
//! A [`Transport`] performs exactly one HTTP exchange and settles with the
//! raw response or an error. It owns per-call timeout policy; the queue
//! above it owns ordering and never retries. [`HttpTransport`] is the
//! `reqwest`-backed production implementation; tests substitute their own.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Request header carrying the session auth token, when one is held.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Response header carrying the server-assigned subscription token.
pub const SUBSCRIPTION_TOKEN_HEADER: &str = "X-Subscription-Token";

/// HTTP verbs the protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// GET: login, subscription polls, type descriptors.
    Get,
    /// POST: api calls.
    Post,
    /// DELETE: subscription cancellation.
    Delete,
}

impl Verb {
    /// Method name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved outbound request.
///
/// Immutable from the caller's point of view once enqueued; the queue adds
/// the session token header at dispatch time.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP verb.
    pub verb: Verb,
    /// Absolute URL.
    pub url: String,
    /// Query parameters, appended in order.
    pub query: Vec<(String, String)>,
    /// Request headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl TransportRequest {
    /// Creates a bodiless request for `url`.
    pub fn new(verb: Verb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a request header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (2xx) response as the transport saw it.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keyed by lowercased name.
    pub headers: HashMap<String, String>,
    /// Response body text; JSON for api calls, plain text for login.
    pub body: String,
}

impl RawResponse {
    /// Looks up a response header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Decodes the body as JSON; an empty body decodes to `null`.
    pub fn json_body(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
            .map_err(|e| ClientError::protocol(format!("undecodable response body: {}", e)))
    }
}

/// Performs one HTTP call.
///
/// Implementations map unreachable-server failures to
/// [`ClientError::Network`] and non-success statuses to
/// [`ClientError::Http`]; only 2xx responses produce a [`RawResponse`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Executes `request` and settles exactly once.
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse>;
}

/// Production transport over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport whose every request times out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::config(format!("could not build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse> {
        let method = match request.verb {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(verb = %request.verb, url = %request.url, "executing HTTP request");

        // No status at all means the server was unreachable; that is the
        // one case with a fixed caller-facing message.
        let response = builder.send().await.map_err(|_| ClientError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                text
            };
            return Err(ClientError::Http {
                status: status.as_u16(),
                text,
            });
        }

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), text.to_string());
            }
        }

        let body = response.text().await.map_err(|_| ClientError::Network)?;
        Ok(RawResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
