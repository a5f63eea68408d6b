//! Serialized request dispatch.
//!
//! Every call made through the client goes through one queue drained by a
//! single worker task, so requests reach the server strictly in enqueue
//! order with at most one in flight. Settle hooks run on the worker after a
//! response arrives and before the reply is delivered or the next request
//! dispatched, which is how a login stores its token before any request
//! queued behind it goes out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::session::SessionManager;
use crate::transport::{RawResponse, Transport, TransportRequest, AUTH_TOKEN_HEADER};

/// Backlog allowed before enqueue applies backpressure.
const QUEUE_DEPTH: usize = 256;

/// Runs on the worker once a request settles, before its reply is sent and
/// before the next request is dispatched.
pub(crate) type SettleHook = Box<dyn FnOnce(&Result<RawResponse>) + Send + 'static>;

/// A request waiting its turn on the worker.
struct QueuedCall {
    request: TransportRequest,
    reply: oneshot::Sender<Result<RawResponse>>,
    on_settle: Option<SettleHook>,
}

/// Handle for submitting requests to the dispatch worker.
///
/// Cheap to clone; all clones feed the same worker.
#[derive(Clone)]
pub struct RequestQueue {
    sender: mpsc::Sender<QueuedCall>,
    pending: Arc<AtomicUsize>,
}

impl RequestQueue {
    /// Sends a request and waits for its response.
    pub async fn submit(&self, request: TransportRequest) -> Result<RawResponse> {
        self.send_call(request, None).await
    }

    /// Sends a request with a settle hook attached.
    pub(crate) async fn submit_with_hook(
        &self,
        request: TransportRequest,
        on_settle: SettleHook,
    ) -> Result<RawResponse> {
        self.send_call(request, Some(on_settle)).await
    }

    async fn send_call(
        &self,
        request: TransportRequest,
        on_settle: Option<SettleHook>,
    ) -> Result<RawResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let call = QueuedCall {
            request,
            reply: reply_tx,
            on_settle,
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(call).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::Closed);
        }
        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Closed),
        }
    }

    /// Requests enqueued or in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether nothing is enqueued or in flight.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Whether the worker is still accepting requests.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Single-task dispatcher behind a [`RequestQueue`].
pub(crate) struct QueueWorker {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    pending: Arc<AtomicUsize>,
}

impl QueueWorker {
    /// Spawns the worker task and returns the handle feeding it.
    pub(crate) fn start(
        transport: Arc<dyn Transport>,
        session: Arc<SessionManager>,
    ) -> RequestQueue {
        let (call_tx, call_rx) = mpsc::channel(QUEUE_DEPTH);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = QueueWorker {
            transport,
            session,
            pending: pending.clone(),
        };

        tokio::spawn(worker.run(call_rx));

        RequestQueue {
            sender: call_tx,
            pending,
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<QueuedCall>) {
        while let Some(call) = rx.recv().await {
            self.dispatch(call).await;
        }
        debug!("request queue worker stopped");
    }

    async fn dispatch(&self, call: QueuedCall) {
        let QueuedCall {
            mut request,
            reply,
            on_settle,
        } = call;

        // Token attaches at dispatch time, so requests queued behind a login
        // pick up the session it establishes.
        if let Some(token) = self.session.token() {
            request = request.with_header(AUTH_TOKEN_HEADER, token.as_str());
        }

        debug!(verb = %request.verb, url = %request.url, "dispatching request");
        let outcome = self.transport.execute(request).await;
        if let Err(err) = &outcome {
            warn!(error = %err, "request failed");
        }

        if let Some(hook) = on_settle {
            hook(&outcome);
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
        let _ = reply.send(outcome);
    }
}
