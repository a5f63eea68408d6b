#![warn(missing_docs)]

//! Gridlink client core: serialized request dispatch, response shaping, session
//! management and polling subscriptions over a stateless HTTP SCADA service.
//!
//! Call path: bindings → [`Client`] → [`queue::RequestQueue`] (attaches the
//! session token) → [`Transport`] → [`shape::shape`] → caller future.

pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod session;
pub mod shape;
pub mod subscription;
pub mod transport;

pub use client::{CallDescriptor, Client, ClientBuilder, SubscribeResponse};
pub use config::{ClientConfig, Credentials, PollingConfig};
pub use error::{ClientError, Result};
pub use queue::RequestQueue;
pub use registry::{ServiceList, ServiceRegistry};
pub use session::{AuthToken, Session, SessionManager};
pub use shape::{shape, ResponseStyle, Shaped};
pub use subscription::{
    CancelReason, EventKind, FailureSignal, Subscription, SubscriptionEvent, SubscriptionState,
    SubscriptionToken,
};
pub use transport::{
    HttpTransport, RawResponse, Transport, TransportRequest, Verb, AUTH_TOKEN_HEADER,
    SUBSCRIPTION_TOKEN_HEADER,
};
