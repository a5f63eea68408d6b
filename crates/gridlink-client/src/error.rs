//! Error taxonomy shared by every part of the client core.

use thiserror::Error;

/// Errors surfaced by the client core.
///
/// Every failure is reported exactly once, as the `Err` of the affected
/// call's future. The request queue passes errors through untouched and
/// always advances to the next queued call regardless of outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The server could not be reached at all (no HTTP status available).
    #[error("couldn't connect to server")]
    Network,

    /// The server answered with a non-success status.
    #[error("HTTP {status} {text}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Server-supplied status text or error body.
        text: String,
    },

    /// A SINGLE-style call received an empty or null body.
    #[error("no data returned")]
    NoData,

    /// The response body did not match the declared shape contract.
    #[error("protocol error: {reason}")]
    Protocol {
        /// What was wrong with the body.
        reason: String,
    },

    /// Login while a session is held, or logout while none is held.
    #[error("session state error: {reason}")]
    SessionState {
        /// Which guard rejected the call.
        reason: String,
    },

    /// Invalid client configuration (bad base URL, unknown service list).
    #[error("configuration error: {reason}")]
    Config {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// Subscription misuse or an abnormally terminated poller.
    #[error("subscription error: {reason}")]
    Subscription {
        /// What went wrong with the subscription lifecycle.
        reason: String,
    },

    /// The client was shut down while the call was pending.
    #[error("client closed")]
    Closed,
}

impl ClientError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        ClientError::Protocol {
            reason: reason.into(),
        }
    }

    pub(crate) fn session_state(reason: impl Into<String>) -> Self {
        ClientError::SessionState {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        ClientError::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn subscription(reason: impl Into<String>) -> Self {
        ClientError::Subscription {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
