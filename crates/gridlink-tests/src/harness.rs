//! Test harness: an in-process stand-in for the remote service.
//!
//! [`FakeHub`] implements the client's `Transport` seam and answers the same
//! HTTP surface the real service exposes: `/login`, `/api/{request}`,
//! `/subscribe/{token}` and `/convert/{type}`. Every request is recorded in
//! arrival order, which is what the ordering assertions read back.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use gridlink_client::{
    ClientConfig, ClientError, RawResponse, Result, Transport, TransportRequest, Verb,
    SUBSCRIPTION_TOKEN_HEADER,
};

/// Initializes test logging once; later calls are no-ops. Controlled via
/// `RUST_LOG`, e.g. `RUST_LOG=gridlink_client=debug`.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Token the hub issues on login.
pub const HUB_AUTH_TOKEN: &str = "hub-auth-token";

/// Feed token the hub assigns to subscribe-style calls.
pub const HUB_FEED_TOKEN: &str = "hub-feed-1";

/// An in-process fake of the remote service.
pub struct FakeHub {
    requests: Mutex<Vec<TransportRequest>>,
    api_results: Mutex<HashMap<String, Vec<Value>>>,
    poll_bodies: Mutex<VecDeque<Vec<Value>>>,
    fail_requests: Mutex<Vec<String>>,
    fail_polls: Mutex<bool>,
    delete_count: AtomicUsize,
    poll_count: AtomicUsize,
}

impl FakeHub {
    /// A hub with empty result sets for every call.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            api_results: Mutex::new(HashMap::new()),
            poll_bodies: Mutex::new(VecDeque::new()),
            fail_requests: Mutex::new(Vec::new()),
            fail_polls: Mutex::new(false),
            delete_count: AtomicUsize::new(0),
            poll_count: AtomicUsize::new(0),
        })
    }

    /// Sets the `results` set an api request answers with.
    pub fn set_results(&self, request: &str, results: Vec<Value>) {
        self.api_results
            .lock()
            .unwrap()
            .insert(request.to_string(), results);
    }

    /// Queues the `results` sets successive polls answer with; once the
    /// script runs out, polls answer with an empty set.
    pub fn queue_poll_results(&self, bodies: Vec<Vec<Value>>) {
        self.poll_bodies.lock().unwrap().extend(bodies);
    }

    /// Makes the named api request fail with a network error.
    pub fn fail_request(&self, request: &str) {
        self.fail_requests.lock().unwrap().push(request.to_string());
    }

    /// Makes every subsequent poll fail with a network error.
    pub fn fail_polls(&self) {
        *self.fail_polls.lock().unwrap() = true;
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `VERB path` for every request seen, in arrival order.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.verb, r.url))
            .collect()
    }

    /// Auth header of each request seen, in arrival order.
    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|r| r.header("X-Auth-Token").map(str::to_string))
            .collect()
    }

    /// Subscription DELETEs received.
    pub fn deletes(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Subscription poll GETs received.
    pub fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    fn ok(body: String) -> Result<RawResponse> {
        Ok(RawResponse {
            status: 200,
            headers: HashMap::new(),
            body,
        })
    }

    fn answer(&self, request: &TransportRequest) -> Result<RawResponse> {
        let path = request
            .url
            .strip_prefix("http://hub")
            .unwrap_or(&request.url);

        if path == "/login" {
            return Self::ok(HUB_AUTH_TOKEN.to_string());
        }

        if path.strip_prefix("/subscribe/").is_some() {
            return match request.verb {
                Verb::Get => {
                    self.poll_count.fetch_add(1, Ordering::SeqCst);
                    if *self.fail_polls.lock().unwrap() {
                        return Err(ClientError::Network);
                    }
                    let results = self
                        .poll_bodies
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_default();
                    Self::ok(json!({ "results": results }).to_string())
                }
                Verb::Delete => {
                    self.delete_count.fetch_add(1, Ordering::SeqCst);
                    Self::ok("{}".to_string())
                }
                Verb::Post => Err(ClientError::Http {
                    status: 405,
                    text: "method not allowed".to_string(),
                }),
            };
        }

        if let Some(type_name) = path.strip_prefix("/convert/") {
            return Self::ok(json!({ "type": type_name, "fields": [] }).to_string());
        }

        if let Some(name) = path.strip_prefix("/api/") {
            if self.fail_requests.lock().unwrap().iter().any(|r| r == name) {
                return Err(ClientError::Network);
            }
            let results = self
                .api_results
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default();
            let body = json!({ "results": results }).to_string();
            if name.starts_with("subscribe") {
                return Ok(RawResponse {
                    status: 200,
                    headers: HashMap::from([(
                        SUBSCRIPTION_TOKEN_HEADER.to_ascii_lowercase(),
                        HUB_FEED_TOKEN.to_string(),
                    )]),
                    body,
                });
            }
            return Self::ok(body);
        }

        Err(ClientError::Http {
            status: 404,
            text: format!("no such endpoint: {}", path),
        })
    }
}

#[async_trait]
impl Transport for FakeHub {
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse> {
        let answer = self.answer(&request);
        self.requests.lock().unwrap().push(request);
        answer
    }
}

/// Configuration pointed at the fake hub with a short poll period.
pub fn hub_config() -> ClientConfig {
    ClientConfig {
        base_url: "http://hub".to_string(),
        service_lists: vec!["core".to_string()],
        ..ClientConfig::default()
    }
}

/// A client wired to `hub` with the core service list registered.
pub fn hub_client(hub: Arc<FakeHub>) -> gridlink_client::Client {
    gridlink_client::Client::builder(hub_config())
        .transport(hub)
        .services(&[gridlink_services::CORE_SERVICE_LIST])
        .build()
        .expect("fake hub client must build")
}
