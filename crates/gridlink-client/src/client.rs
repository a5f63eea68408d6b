//! Client facade used by the generated call bindings.
//!
//! Composes the request queue, session manager, response shaper and
//! subscription poller behind the small surface the bindings call:
//! `api_request`, `subscribe_api_request`, `login`, `logout`, `describe`.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::queue::{QueueWorker, RequestQueue};
use crate::registry::{ServiceList, ServiceRegistry};
use crate::session::{AuthToken, SessionManager};
use crate::shape::{shape, ResponseStyle, Shaped};
use crate::subscription::{Subscription, SubscriptionToken};
use crate::transport::{
    HttpTransport, Transport, TransportRequest, Verb, SUBSCRIPTION_TOKEN_HEADER,
};

/// One remote call as the bindings describe it: the request name, how to
/// send it and how to read the answer. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    /// Request name, the `{request}` part of `POST /api/{request}`.
    pub request: String,
    /// HTTP verb; API calls default to POST.
    pub verb: Verb,
    /// JSON parameters sent as the request body.
    pub payload: Option<Value>,
    /// Declared shape of the response.
    pub style: ResponseStyle,
    /// Wire type the call returns, resolvable via [`Client::describe`].
    pub result_type: Option<&'static str>,
}

impl CallDescriptor {
    /// Describes a POST call with no parameters.
    pub fn new(request: impl Into<String>, style: ResponseStyle) -> Self {
        Self {
            request: request.into(),
            verb: Verb::Post,
            payload: None,
            style,
            result_type: None,
        }
    }

    /// Sets the JSON parameters.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Overrides the HTTP verb.
    pub fn with_verb(mut self, verb: Verb) -> Self {
        self.verb = verb;
        self
    }

    /// Declares the wire type of the result.
    pub fn with_result_type(mut self, result_type: &'static str) -> Self {
        self.result_type = Some(result_type);
        self
    }
}

/// Answer to a subscribe-style call: the initial query result plus the
/// handle to the server-side change feed.
#[derive(Debug)]
pub struct SubscribeResponse {
    /// Initial result, shaped per the call's style.
    pub result: Shaped,
    /// Feed handle; poll delivery begins on `start`.
    pub subscription: Subscription,
}

/// Builds a [`Client`], optionally swapping the transport or registering
/// service lists.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    services: &'static [ServiceList],
}

impl ClientBuilder {
    /// Starts a builder over a validated-later configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            services: &[],
        }
    }

    /// Replaces the HTTP transport, the seam tests inject a mock through.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers the service lists the configuration may name.
    pub fn services(mut self, lists: &'static [ServiceList]) -> Self {
        self.services = lists;
        self
    }

    /// Validates the configuration, resolves service lists and spawns the
    /// dispatch worker.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        let registry = ServiceRegistry::new(self.services);
        registry.resolve(&self.config.service_lists)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.request_timeout())?),
        };
        let session = Arc::new(SessionManager::new());
        let queue = QueueWorker::start(transport, session.clone());

        info!(server = self.config.server_url(), "client ready");
        Ok(Client {
            config: Arc::new(self.config),
            session,
            queue,
        })
    }

    /// Builds the client and performs the configured auto-login, if any.
    pub async fn connect(self) -> Result<Client> {
        let auto_login = self.config.auto_login.clone();
        let client = self.build()?;
        if let Some(credentials) = auto_login {
            client
                .login(&credentials.name, &credentials.password)
                .await?;
        }
        Ok(client)
    }
}

/// Handle to one remote service endpoint.
///
/// Cheap to clone; clones share the session and the request queue, so the
/// one-in-flight ordering discipline spans all of them.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    session: Arc<SessionManager>,
    queue: RequestQueue,
}

impl Client {
    /// Builder entry point.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Builds a client over the real HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Builds a client and performs the configured auto-login.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::builder(config).connect().await
    }

    /// The configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Read access to the session (logged-in state, user name).
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Requests enqueued or in flight.
    pub fn pending_requests(&self) -> usize {
        self.queue.pending()
    }

    /// Issues one API call and shapes the response per its declared style.
    pub async fn api_request(&self, call: &CallDescriptor) -> Result<Shaped> {
        let response = self.queue.submit(self.api_transport_request(call)).await?;
        shape(call.style, response.json_body()?)
    }

    /// Issues a subscribe-style API call.
    ///
    /// The shaped initial result comes back together with a [`Subscription`]
    /// keyed by the feed token the server returns in the
    /// `X-Subscription-Token` response header; a missing header is a
    /// protocol error.
    pub async fn subscribe_api_request(&self, call: &CallDescriptor) -> Result<SubscribeResponse> {
        let response = self.queue.submit(self.api_transport_request(call)).await?;

        let result = shape(call.style, response.json_body()?)?;
        let token = response
            .header(SUBSCRIPTION_TOKEN_HEADER)
            .map(SubscriptionToken::new)
            .ok_or_else(|| {
                ClientError::protocol("subscribe response carries no subscription token header")
            })?;

        let subscription = Subscription::new(
            self.queue.clone(),
            self.config.server_url(),
            token,
            self.config.poll_interval(),
            self.config.subscription_polling.enabled,
        );
        Ok(SubscribeResponse {
            result,
            subscription,
        })
    }

    /// Logs in and returns the server-issued token.
    ///
    /// Fails with a session-state error before any network traffic when a
    /// session is already held. The token is stored before the next queued
    /// request dispatches, so calls enqueued behind the login already carry
    /// it.
    pub async fn login(&self, name: &str, password: &str) -> Result<AuthToken> {
        self.session.ensure_logged_out()?;

        let request = TransportRequest::new(
            Verb::Get,
            format!("{}/login", self.config.server_url()),
        )
        .with_query("name", name)
        .with_query("password", password);

        let session = self.session.clone();
        let user = name.to_string();
        let response = self
            .queue
            .submit_with_hook(
                request,
                Box::new(move |outcome| {
                    if let Ok(response) = outcome {
                        if !response.body.is_empty() {
                            session.store(AuthToken::new(response.body.clone()), user);
                        }
                    }
                }),
            )
            .await?;

        if response.body.is_empty() {
            return Err(ClientError::NoData);
        }
        Ok(AuthToken::new(response.body))
    }

    /// Drops the session and resolves with the status `"OK"`.
    ///
    /// Local only; the service holds no logout endpoint. Fails with a
    /// session-state error when no session is held.
    pub async fn logout(&self) -> Result<String> {
        self.session.clear()?;
        Ok("OK".to_string())
    }

    /// Fetches the wire-type descriptor for `type_name`, unshaped.
    pub async fn describe(&self, type_name: &str) -> Result<Value> {
        let request = TransportRequest::new(
            Verb::Get,
            format!("{}/convert/{}", self.config.server_url(), type_name),
        );
        let response = self.queue.submit(request).await?;
        let body = response.json_body()?;
        if body.is_null() {
            return Err(ClientError::NoData);
        }
        Ok(body)
    }

    /// Fetches the descriptor for the type a call returns.
    pub async fn describe_result_type(&self, call: &CallDescriptor) -> Result<Value> {
        let type_name = call.result_type.ok_or_else(|| {
            ClientError::config(format!("call {} declares no result type", call.request))
        })?;
        self.describe(type_name).await
    }

    fn api_transport_request(&self, call: &CallDescriptor) -> TransportRequest {
        let url = format!("{}/api/{}", self.config.server_url(), call.request);
        let mut request = TransportRequest::new(call.verb, url);
        if let Some(payload) = &call.payload {
            request = request.with_body(payload.clone());
        }
        request
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.config.server_url())
            .field("user", &self.session.user_name())
            .field("pending_requests", &self.queue.pending())
            .finish()
    }
}

impl std::fmt::Display for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.session.user_name() {
            Some(user) => write!(f, "{}@{}", user, self.config.server_url()),
            None => f.write_str(self.config.server_url()),
        }
    }
}
