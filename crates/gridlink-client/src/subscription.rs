//! Polling subscriptions over a server-assigned feed token.
//!
//! The server has no push channel, so a subscription is emulated by polling
//! `GET /subscribe/{token}` on a fixed interval and delivering each returned
//! delta to a listener. Cancellation clears the scheduled poll, then sends a
//! single `DELETE /subscribe/{token}` after a grace tick so an in-flight
//! poll can settle first. Termination is reported exactly once through a
//! dedicated failure signal, distinct from the future that created the
//! subscription.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::queue::RequestQueue;
use crate::shape::{shape, ResponseStyle};
use crate::transport::{TransportRequest, Verb};

/// Delay between a cancel request and the DELETE entering the queue, giving
/// a poll dispatched before the cancel time to settle its continuation.
const CANCEL_DISPATCH_DELAY: Duration = Duration::from_millis(1);

/// Opaque server-assigned token correlating polls and cancellation to one
/// server-side change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text as it appears in poll and cancel URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a subscription.
///
/// `Created → Polling → CancelPending → Canceled` is the clean path;
/// `Failed` is terminal and reachable from `Polling` or `CancelPending` on a
/// transport or protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Built, not yet started.
    Created,
    /// Poll cycles are scheduled.
    Polling,
    /// Cancel requested; the DELETE has not settled yet.
    CancelPending,
    /// Server acknowledged the cancel.
    Canceled,
    /// A poll or the cancel DELETE failed.
    Failed,
}

/// Kind of change reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new object entered the subscribed set.
    Added,
    /// An object in the subscribed set changed.
    Modified,
    /// An object left the subscribed set.
    Removed,
}

impl EventKind {
    /// Wire-style name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Removed => "REMOVED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One update delivered to a subscription listener.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    /// What happened to the object.
    pub kind: EventKind,
    /// The object payload as returned by the feed.
    pub value: serde_json::Value,
}

/// Why a subscription terminated cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called and the server acknowledged the DELETE.
    UserRequested,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("canceled")
    }
}

/// Future reporting how a subscription terminated.
///
/// Resolves with a [`CancelReason`] after a clean cancel and with an error
/// after a poll or cancel failure. Settles exactly once.
#[derive(Debug)]
pub struct FailureSignal {
    rx: oneshot::Receiver<Result<CancelReason>>,
}

impl FailureSignal {
    fn new(rx: oneshot::Receiver<Result<CancelReason>>) -> Self {
        Self { rx }
    }

    /// A signal that is already settled with `outcome`.
    fn settled(outcome: Result<CancelReason>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for FailureSignal {
    type Output = Result<CancelReason>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::subscription(
                "subscription ended without reporting a result",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

type UpdateListener = Box<dyn Fn(SubscriptionEvent) + Send + Sync + 'static>;

/// Handle to one server-side change feed.
///
/// Cheap to clone; all clones share the same lifecycle.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    token: SubscriptionToken,
    poll_url: String,
    interval: Duration,
    poll_enabled: bool,
    queue: RequestQueue,
    state: Mutex<SubscriptionState>,
    signal_tx: Mutex<Option<oneshot::Sender<Result<CancelReason>>>>,
    signal_rx: Mutex<Option<oneshot::Receiver<Result<CancelReason>>>>,
    cancel_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.inner.token)
            .field("state", &self.state())
            .field("interval", &self.inner.interval)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        queue: RequestQueue,
        server_url: &str,
        token: SubscriptionToken,
        interval: Duration,
        poll_enabled: bool,
    ) -> Self {
        let (signal_tx, signal_rx) = oneshot::channel();
        let (cancel_tx, _) = watch::channel(false);
        let poll_url = format!("{}/subscribe/{}", server_url, token.as_str());
        Self {
            inner: Arc::new(SubscriptionInner {
                token,
                poll_url,
                interval,
                poll_enabled,
                queue,
                state: Mutex::new(SubscriptionState::Created),
                signal_tx: Mutex::new(Some(signal_tx)),
                signal_rx: Mutex::new(Some(signal_rx)),
                cancel_tx,
            }),
        }
    }

    /// The server-assigned feed token.
    pub fn token(&self) -> &SubscriptionToken {
        &self.inner.token
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.inner.state()
    }

    /// Begins polling and returns the termination signal.
    ///
    /// The first poll fires one interval after this call. Calling `start` a
    /// second time returns an already-failed signal; the signal handed out
    /// first remains the one that reports termination. Starting after
    /// `cancel` issues no polls but still returns the real signal, which
    /// settles when the cancel completes.
    pub fn start<F>(&self, listener: F) -> FailureSignal
    where
        F: Fn(SubscriptionEvent) + Send + Sync + 'static,
    {
        let startable = match self.inner.state.lock() {
            Ok(mut state) => {
                if *state == SubscriptionState::Created {
                    *state = SubscriptionState::Polling;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        };

        let signal_rx = self
            .inner
            .signal_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let Some(signal_rx) = signal_rx else {
            return FailureSignal::settled(Err(ClientError::subscription(
                "subscription already started",
            )));
        };

        if startable {
            info!(
                token = %self.inner.token,
                interval_ms = self.inner.interval.as_millis() as u64,
                "subscription started"
            );
            if self.inner.poll_enabled {
                let cancel_rx = self.inner.cancel_tx.subscribe();
                tokio::spawn(poll_loop(
                    self.inner.clone(),
                    Box::new(listener),
                    cancel_rx,
                ));
            }
        }

        FailureSignal::new(signal_rx)
    }

    /// Requests cancellation of the feed.
    ///
    /// Idempotent; later calls and calls on a terminated subscription do
    /// nothing. The scheduled poll is cleared before this returns, so no
    /// further poll is issued, and exactly one DELETE is sent afterward. The
    /// outcome arrives on the failure signal.
    pub fn cancel(&self) {
        let proceed = match self.inner.state.lock() {
            Ok(mut state) => match *state {
                SubscriptionState::CancelPending
                | SubscriptionState::Canceled
                | SubscriptionState::Failed => false,
                SubscriptionState::Created | SubscriptionState::Polling => {
                    *state = SubscriptionState::CancelPending;
                    true
                }
            },
            Err(_) => false,
        };
        if !proceed {
            return;
        }

        // Wake the poll timer now; the state change above already keeps any
        // scheduled poll from dispatching.
        let _ = self.inner.cancel_tx.send(true);
        info!(token = %self.inner.token, "subscription cancel requested");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CANCEL_DISPATCH_DELAY).await;
            let request = TransportRequest::new(Verb::Delete, &inner.poll_url);
            let outcome = inner.queue.submit(request).await;
            inner.finish_cancel(outcome.map(|_| CancelReason::UserRequested));
        });
    }
}

impl SubscriptionInner {
    fn state(&self) -> SubscriptionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(SubscriptionState::Failed)
    }

    /// One poll cycle. `Ok(true)` means keep polling, `Ok(false)` means the
    /// subscription left `Polling` while the request was in flight.
    async fn poll_once(&self, listener: &UpdateListener) -> Result<bool> {
        let request = TransportRequest::new(Verb::Get, &self.poll_url);
        let response = self.queue.submit(request).await?;

        // The state may have changed while the poll was in flight; stale
        // data must not be delivered and no further poll scheduled.
        if self.state() != SubscriptionState::Polling {
            return Ok(false);
        }

        let events = shape(ResponseStyle::Multi, response.json_body()?)?.into_multi()?;
        if !events.is_empty() {
            debug!(
                token = %self.token,
                count = events.len(),
                "delivering subscription updates"
            );
        }
        for value in events {
            // TODO: surface the server's event kind once the feed body
            // carries one; every delta is reported as MODIFIED today.
            listener(SubscriptionEvent {
                kind: EventKind::Modified,
                value,
            });
        }
        Ok(true)
    }

    /// Terminal transition out of `CancelPending` once the DELETE settles.
    /// A no-op when a poll failure already terminated the subscription.
    fn finish_cancel(&self, outcome: Result<CancelReason>) {
        let next = match &outcome {
            Ok(_) => SubscriptionState::Canceled,
            Err(_) => SubscriptionState::Failed,
        };
        let advanced = match self.state.lock() {
            Ok(mut state) => {
                if *state == SubscriptionState::CancelPending {
                    *state = next;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        };
        if !advanced {
            return;
        }

        match &outcome {
            Ok(_) => info!(token = %self.token, "subscription canceled"),
            Err(err) => {
                warn!(token = %self.token, error = %err, "subscription cancel failed")
            }
        }
        self.settle_signal(outcome);
    }

    /// Terminal transition on a poll failure. First settle wins: a failure
    /// landing while a cancel is pending reports the failure, and the later
    /// DELETE outcome is dropped.
    fn fail(&self, err: ClientError) {
        let advanced = match self.state.lock() {
            Ok(mut state) => match *state {
                SubscriptionState::Canceled | SubscriptionState::Failed => false,
                _ => {
                    *state = SubscriptionState::Failed;
                    true
                }
            },
            Err(_) => false,
        };
        if !advanced {
            return;
        }

        warn!(token = %self.token, error = %err, "subscription failed");
        self.settle_signal(Err(err));
    }

    fn settle_signal(&self, outcome: Result<CancelReason>) {
        let tx = self
            .signal_tx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
    }
}

async fn poll_loop(
    inner: Arc<SubscriptionInner>,
    listener: UpdateListener,
    mut cancel_rx: watch::Receiver<bool>,
) {
    debug!(token = %inner.token, "poll loop started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(inner.interval) => {}
            _ = cancel_rx.changed() => break,
        }
        if inner.state() != SubscriptionState::Polling {
            break;
        }
        match inner.poll_once(&listener).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                inner.fail(err);
                break;
            }
        }
    }
    debug!(token = %inner.token, "poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueWorker;
    use crate::session::SessionManager;
    use crate::transport::{RawResponse, Transport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts polls and cancels; answers polls with one-element result sets.
    struct FeedTransport {
        gets: AtomicUsize,
        deletes: AtomicUsize,
        fail_gets: bool,
        fail_deletes: bool,
    }

    impl FeedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gets: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                fail_gets: false,
                fail_deletes: false,
            })
        }

        fn failing_gets() -> Arc<Self> {
            Arc::new(Self {
                gets: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                fail_gets: true,
                fail_deletes: false,
            })
        }

        fn failing_deletes() -> Arc<Self> {
            Arc::new(Self {
                gets: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                fail_gets: false,
                fail_deletes: true,
            })
        }
    }

    #[async_trait]
    impl Transport for FeedTransport {
        async fn execute(&self, request: TransportRequest) -> Result<RawResponse> {
            match request.verb {
                Verb::Get => {
                    let n = self.gets.fetch_add(1, Ordering::SeqCst);
                    if self.fail_gets {
                        return Err(ClientError::Network);
                    }
                    Ok(RawResponse {
                        status: 200,
                        headers: Default::default(),
                        body: format!("{{\"results\":[{{\"seq\":{}}}]}}", n),
                    })
                }
                Verb::Delete => {
                    self.deletes.fetch_add(1, Ordering::SeqCst);
                    if self.fail_deletes {
                        return Err(ClientError::Network);
                    }
                    Ok(RawResponse {
                        status: 200,
                        headers: Default::default(),
                        body: "{}".to_string(),
                    })
                }
                Verb::Post => Err(ClientError::protocol("unexpected POST in feed test")),
            }
        }
    }

    fn subscription(transport: Arc<FeedTransport>) -> Subscription {
        let queue = QueueWorker::start(transport, Arc::new(SessionManager::new()));
        Subscription::new(
            queue,
            "http://hub",
            SubscriptionToken::new("feed-1"),
            Duration::from_millis(500),
            true,
        )
    }

    fn collecting_listener() -> (
        Arc<Mutex<Vec<SubscriptionEvent>>>,
        impl Fn(SubscriptionEvent) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |event| sink.lock().unwrap().push(event))
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EventKind::Added.as_str(), "ADDED");
        assert_eq!(EventKind::Modified.as_str(), "MODIFIED");
        assert_eq!(EventKind::Removed.as_str(), "REMOVED");
    }

    #[tokio::test]
    async fn test_new_subscription_is_created() {
        let sub = subscription(FeedTransport::new());
        assert_eq!(sub.state(), SubscriptionState::Created);
        assert_eq!(sub.token().as_str(), "feed-1");
    }

    #[tokio::test]
    async fn test_subscription_debug_shows_token_and_state() {
        let sub = subscription(FeedTransport::new());
        let rendered = format!("{:?}", sub);
        assert!(rendered.contains("feed-1"));
        assert!(rendered.contains("Created"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_transitions_to_polling() {
        let sub = subscription(FeedTransport::new());
        let (_seen, listener) = collecting_listener();
        let _signal = sub.start(listener);
        assert_eq!(sub.state(), SubscriptionState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_gets_failed_signal() {
        let sub = subscription(FeedTransport::new());
        let (_seen, listener) = collecting_listener();
        let _signal = sub.start(listener);

        let (_seen2, listener2) = collecting_listener();
        let err = sub.start(listener2).await.unwrap_err();
        assert!(matches!(err, ClientError::Subscription { .. }));
        assert_eq!(sub.state(), SubscriptionState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cycle_delivers_modified_events() {
        let transport = FeedTransport::new();
        let sub = subscription(transport.clone());
        let (seen, listener) = collecting_listener();
        let _signal = sub.start(listener);

        tokio::time::sleep(Duration::from_millis(510)).await;

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Modified);
        assert_eq!(events[0].value["seq"], 0);
        assert_eq!(transport.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_sends_one_delete() {
        let transport = FeedTransport::new();
        let sub = subscription(transport.clone());
        let (_seen, listener) = collecting_listener();
        let signal = sub.start(listener);

        sub.cancel();
        sub.cancel();
        sub.cancel();

        let reason = signal.await.unwrap();
        assert_eq!(reason, CancelReason::UserRequested);
        assert_eq!(sub.state(), SubscriptionState::Canceled);
        assert_eq!(transport.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_poll_after_cancel() {
        let transport = FeedTransport::new();
        let sub = subscription(transport.clone());
        let (seen, listener) = collecting_listener();
        let signal = sub.start(listener);

        // Cancel before the first interval elapses, then let several
        // intervals pass.
        sub.cancel();
        signal.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(transport.gets.load(Ordering::SeqCst), 0);
        assert_eq!(transport.deletes.load(Ordering::SeqCst), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_fails_subscription() {
        let transport = FeedTransport::failing_gets();
        let sub = subscription(transport.clone());
        let (_seen, listener) = collecting_listener();
        let signal = sub.start(listener);

        let err = signal.await.unwrap_err();
        assert_eq!(err, ClientError::Network);
        assert_eq!(sub.state(), SubscriptionState::Failed);

        // Terminal; no further polls even as time passes.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_rejects_signal() {
        let transport = FeedTransport::failing_deletes();
        let sub = subscription(transport.clone());
        let (_seen, listener) = collecting_listener();
        let signal = sub.start(listener);

        sub.cancel();
        let err = signal.await.unwrap_err();
        assert_eq!(err, ClientError::Network);
        assert_eq!(sub.state(), SubscriptionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_still_reports_on_signal() {
        let transport = FeedTransport::new();
        let sub = subscription(transport.clone());

        sub.cancel();
        let (seen, listener) = collecting_listener();
        let signal = sub.start(listener);

        let reason = signal.await.unwrap();
        assert_eq!(reason, CancelReason::UserRequested);
        assert_eq!(transport.gets.load(Ordering::SeqCst), 0);
        assert_eq!(transport.deletes.load(Ordering::SeqCst), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_disabled_issues_no_polls() {
        let transport = FeedTransport::new();
        let queue = QueueWorker::start(transport.clone(), Arc::new(SessionManager::new()));
        let sub = Subscription::new(
            queue,
            "http://hub",
            SubscriptionToken::new("feed-2"),
            Duration::from_millis(500),
            false,
        );
        let (_seen, listener) = collecting_listener();
        let signal = sub.start(listener);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.gets.load(Ordering::SeqCst), 0);

        // Cancel still works without a poll task.
        sub.cancel();
        signal.await.unwrap();
        assert_eq!(transport.deletes.load(Ordering::SeqCst), 1);
    }
}
