//! Single-flight handling of 401 responses in exempt areas.
//!
//! The first exempt 401 opens a recovery cycle. Every exempt 401 that
//! arrives while the cycle is open is parked as a [`PendingRequest`] and
//! settled, in arrival order, when the cycle closes. The user sees one
//! notification per cycle no matter how many requests failed.
//!
//! ```text
//!   Idle ──401──► Refreshing ──outcome──► Settled ──window over──► Idle
//!                   │  ▲       (drain)      │  ▲
//!                   └──┘ 401: enqueue       └──┘ 401: reuse outcome
//! ```
//!
//! A closed cycle's outcome is kept for the settle window. 401s landing in
//! that window were in flight alongside the cycle, so they take the same
//! outcome instead of calling the refresher and notifying again. Nobody
//! waits on the window itself.
//!
//! No backend refresh endpoint exists yet, so the default refresher reports
//! [`RefreshOutcome::Unavailable`]: the cycle warns that the session
//! expired and rejects everything.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Method;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ApiRequest;
use crate::auth::TokenStore;
use crate::notify::{Notification, Notifier};

pub const SESSION_EXPIRED_MESSAGE: &str =
    "Your session has expired. Save your work and sign in again to continue.";
pub const SESSION_EXPIRED_KEY: &str = "session-expired";

pub const REFRESH_FAILED_MESSAGE: &str = "Could not renew your session. Please sign in again.";
pub const REFRESH_FAILED_KEY: &str = "session-refresh-failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new token was issued.
    Refreshed(String),
    /// There is no way to refresh; the session is simply gone.
    Unavailable,
    Failed(String),
}

pub trait TokenRefresher: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, RefreshOutcome>;
}

/// Refresher used until the backend grows a refresh endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRefreshEndpoint;

impl TokenRefresher for NoRefreshEndpoint {
    fn refresh(&self) -> BoxFuture<'_, RefreshOutcome> {
        Box::pin(async { RefreshOutcome::Unavailable })
    }
}

/// How a request caught in a recovery cycle has to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Fail with the request's own original 401 error.
    Reject,
    /// Fail with the refresher's error.
    RefreshFailed(String),
    /// Send the request once more with this token.
    Replay(String),
}

/// A 401 parked while a cycle was already running.
#[derive(Debug)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    settle: oneshot::Sender<Settlement>,
}

#[derive(Debug)]
struct SettledCycle {
    settlement: Settlement,
    until: Instant,
}

#[derive(Debug, Default)]
struct CycleState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
    last: Option<SettledCycle>,
}

pub struct AuthFailureCoordinator {
    state: Mutex<CycleState>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    refresher: Arc<dyn TokenRefresher>,
    settle_window: Duration,
}

impl AuthFailureCoordinator {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        settle_window: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(CycleState::default()),
            tokens,
            notifier,
            refresher: Arc::new(NoRefreshEndpoint),
            settle_window,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of requests parked behind the running cycle.
    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Paths of the parked requests, in the order they will be settled.
    pub fn pending_paths(&self) -> Vec<String> {
        self.lock().queue.iter().map(|p| p.path.clone()).collect()
    }

    /// Route an exempt-area 401 through the current cycle, starting one if idle.
    ///
    /// Requests that are already replays never enter the machine: they get
    /// [`Settlement::Reject`] straight away so one request cannot loop.
    pub async fn handle_auth_failure(&self, request: &ApiRequest) -> Settlement {
        if request.is_retried() {
            debug!(
                method = %request.method,
                path = %request.path,
                "Replayed request failed auth again"
            );
            return Settlement::Reject;
        }

        let waiter = {
            let mut state = self.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(PendingRequest {
                    method: request.method.clone(),
                    path: request.path.clone(),
                    settle: tx,
                });
                debug!(
                    method = %request.method,
                    path = %request.path,
                    queued = state.queue.len(),
                    "Auth failure queued behind running cycle"
                );
                Waiter::Queued(rx)
            } else if let Some(last) = state.last.as_ref().filter(|c| Instant::now() < c.until) {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    "Auth failure joined just-settled cycle"
                );
                Waiter::Settled(last.settlement.clone())
            } else {
                state.refreshing = true;
                state.last = None;
                Waiter::Leader
            }
        };

        match waiter {
            Waiter::Queued(rx) => rx.await.unwrap_or(Settlement::Reject),
            Waiter::Settled(settlement) => settlement,
            Waiter::Leader => self.run_cycle(request).await,
        }
    }

    async fn run_cycle(&self, request: &ApiRequest) -> Settlement {
        info!(method = %request.method, path = %request.path, "Starting auth recovery cycle");
        let mut guard = CycleGuard {
            coordinator: self,
            closed: false,
        };

        let settlement = match self.refresher.refresh().await {
            RefreshOutcome::Unavailable => {
                self.notifier
                    .notify(Notification::warn(SESSION_EXPIRED_MESSAGE, SESSION_EXPIRED_KEY));
                Settlement::Reject
            }
            RefreshOutcome::Failed(reason) => {
                warn!(error = %reason, "Session refresh failed");
                self.notifier
                    .notify(Notification::error(REFRESH_FAILED_MESSAGE, REFRESH_FAILED_KEY));
                Settlement::RefreshFailed(reason)
            }
            RefreshOutcome::Refreshed(token) => {
                if let Err(e) = self.tokens.set_token(token.clone()) {
                    warn!(error = %e, "Failed to persist refreshed token");
                }
                Settlement::Replay(token)
            }
        };

        guard.close(settlement.clone());
        settlement
    }

    /// Go back to idle, then settle every parked request in FIFO order.
    ///
    /// With `remember`, the outcome is reused by 401s arriving within the
    /// settle window.
    fn finish(&self, settlement: Settlement, remember: bool) {
        let drained = {
            let mut state = self.lock();
            state.refreshing = false;
            state.last = remember.then(|| SettledCycle {
                settlement: settlement.clone(),
                until: Instant::now() + self.settle_window,
            });
            std::mem::take(&mut state.queue)
        };

        info!(settled = drained.len(), outcome = ?settlement, "Auth recovery cycle closed");
        for pending in drained {
            debug!(method = %pending.method, path = %pending.path, "Settling queued request");
            // The caller may have given up waiting; nothing to deliver then.
            let _ = pending.settle.send(settlement.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum Waiter {
    Leader,
    Queued(oneshot::Receiver<Settlement>),
    Settled(Settlement),
}

/// Closes the cycle even if the leading request's future is dropped mid-cycle.
struct CycleGuard<'a> {
    coordinator: &'a AuthFailureCoordinator,
    closed: bool,
}

impl CycleGuard<'_> {
    fn close(&mut self, settlement: Settlement) {
        self.closed = true;
        self.coordinator.finish(settlement, true);
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            // Nothing was decided; the next 401 starts a fresh cycle.
            self.coordinator.finish(Settlement::Reject, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::notify::{NotificationLevel, NotificationLog};
    use futures::future::join_all;
    use tokio::sync::Notify;

    const WINDOW: Duration = Duration::from_millis(1_000);

    struct Fixture {
        coordinator: Arc<AuthFailureCoordinator>,
        notifications: Arc<NotificationLog>,
        tokens: Arc<MemoryTokenStore>,
    }

    fn fixture(refresher: Option<Arc<dyn TokenRefresher>>) -> Fixture {
        let notifications = Arc::new(NotificationLog::new());
        let tokens = Arc::new(MemoryTokenStore::with_token("stale"));
        let mut coordinator =
            AuthFailureCoordinator::new(tokens.clone(), notifications.clone(), WINDOW);
        if let Some(refresher) = refresher {
            coordinator = coordinator.with_refresher(refresher);
        }
        Fixture {
            coordinator: Arc::new(coordinator),
            notifications,
            tokens,
        }
    }

    struct FixedRefresher(RefreshOutcome);

    impl TokenRefresher for FixedRefresher {
        fn refresh(&self) -> BoxFuture<'_, RefreshOutcome> {
            let outcome = self.0.clone();
            Box::pin(async move { outcome })
        }
    }

    /// Holds the cycle open until the test releases it.
    struct GatedRefresher {
        gate: Arc<Notify>,
        outcome: RefreshOutcome,
    }

    impl TokenRefresher for GatedRefresher {
        fn refresh(&self) -> BoxFuture<'_, RefreshOutcome> {
            Box::pin(async move {
                self.gate.notified().await;
                self.outcome.clone()
            })
        }
    }

    fn invoices() -> ApiRequest {
        ApiRequest::get("/billing/invoices")
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_warns_and_rejects() {
        let f = fixture(None);

        let settlement = f.coordinator.handle_auth_failure(&invoices()).await;

        assert_eq!(settlement, Settlement::Reject);
        assert!(!f.coordinator.is_refreshing());
        let notes = f.notifications.snapshot();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Warn);
        assert_eq!(notes[0].dedupe_key, SESSION_EXPIRED_KEY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_share_one_cycle() {
        let f = fixture(None);

        let requests: Vec<ApiRequest> = (0..5).map(|_| invoices()).collect();
        let settlements =
            join_all(requests.iter().map(|r| f.coordinator.handle_auth_failure(r))).await;

        assert!(settlements.iter().all(|s| *s == Settlement::Reject));
        assert_eq!(f.notifications.len(), 1);
        assert!(!f.coordinator.is_refreshing());
        assert_eq!(f.coordinator.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_failure_settles_without_waiting() {
        let f = fixture(None);
        let started = Instant::now();

        f.coordinator.handle_auth_failure(&invoices()).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_within_window_reuses_outcome() {
        let f = fixture(None);

        f.coordinator.handle_auth_failure(&invoices()).await;
        tokio::time::advance(WINDOW / 2).await;
        let late = f
            .coordinator
            .handle_auth_failure(&ApiRequest::get("/billing/claims"))
            .await;

        assert_eq!(late, Settlement::Reject);
        assert_eq!(f.notifications.len(), 1);
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_cycles_each_notify_once() {
        let f = fixture(None);

        f.coordinator.handle_auth_failure(&invoices()).await;
        tokio::time::advance(WINDOW + Duration::from_millis(1)).await;
        f.coordinator.handle_auth_failure(&invoices()).await;

        assert_eq!(f.notifications.len(), 2);
    }

    #[tokio::test]
    async fn test_retried_request_bypasses_cycle() {
        let f = fixture(None);
        let mut request = invoices();
        request.mark_retried();

        let settlement = f.coordinator.handle_auth_failure(&request).await;

        assert_eq!(settlement, Settlement::Reject);
        assert!(f.notifications.is_empty());
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_queue_while_refreshing() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Some(Arc::new(GatedRefresher {
            gate: gate.clone(),
            outcome: RefreshOutcome::Unavailable,
        })));

        let leader = tokio::spawn({
            let c = f.coordinator.clone();
            async move { c.handle_auth_failure(&invoices()).await }
        });
        while !f.coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let follower = tokio::spawn({
            let c = f.coordinator.clone();
            async move { c.handle_auth_failure(&ApiRequest::post("/billing/payments")).await }
        });
        while f.coordinator.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(f.notifications.is_empty());

        gate.notify_one();
        assert_eq!(leader.await.unwrap(), Settlement::Reject);
        assert_eq!(follower.await.unwrap(), Settlement::Reject);
        assert_eq!(f.notifications.len(), 1);
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_requests_settle_in_arrival_order() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Some(Arc::new(GatedRefresher {
            gate: gate.clone(),
            outcome: RefreshOutcome::Unavailable,
        })));

        let leader = tokio::spawn({
            let c = f.coordinator.clone();
            async move { c.handle_auth_failure(&invoices()).await }
        });
        while !f.coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut followers = Vec::new();
        for i in 0..3 {
            followers.push(tokio::spawn({
                let c = f.coordinator.clone();
                let order = order.clone();
                async move {
                    let request = ApiRequest::get(format!("/billing/queue/{}", i));
                    let settlement = c.handle_auth_failure(&request).await;
                    order.lock().unwrap().push(i);
                    settlement
                }
            }));
            while f.coordinator.pending_len() <= i {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(
            f.coordinator.pending_paths(),
            vec!["/billing/queue/0", "/billing/queue/1", "/billing/queue/2"]
        );

        gate.notify_one();
        assert_eq!(leader.await.unwrap(), Settlement::Reject);
        for follower in followers {
            assert_eq!(follower.await.unwrap(), Settlement::Reject);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(f.notifications.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_rejects_with_reason() {
        let f = fixture(Some(Arc::new(FixedRefresher(RefreshOutcome::Failed(
            "refresh endpoint returned 500".into(),
        )))));

        let requests = [invoices(), invoices()];
        let settlements =
            join_all(requests.iter().map(|r| f.coordinator.handle_auth_failure(r))).await;

        for s in settlements {
            assert_eq!(
                s,
                Settlement::RefreshFailed("refresh endpoint returned 500".into())
            );
        }
        let notes = f.notifications.snapshot();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].dedupe_key, REFRESH_FAILED_KEY);
        assert_ne!(notes[0].message, SESSION_EXPIRED_MESSAGE);
    }

    #[tokio::test]
    async fn test_refreshed_token_is_stored_and_replayed() {
        let f = fixture(Some(Arc::new(FixedRefresher(RefreshOutcome::Refreshed(
            "fresh".into(),
        )))));

        let settlement = f.coordinator.handle_auth_failure(&invoices()).await;

        assert_eq!(settlement, Settlement::Replay("fresh".into()));
        assert_eq!(f.tokens.token().as_deref(), Some("fresh"));
        assert!(f.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_leader_reopens_coordinator() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Some(Arc::new(GatedRefresher {
            gate,
            outcome: RefreshOutcome::Unavailable,
        })));

        let leader = tokio::spawn({
            let c = f.coordinator.clone();
            async move { c.handle_auth_failure(&invoices()).await }
        });
        while !f.coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let follower = tokio::spawn({
            let c = f.coordinator.clone();
            async move { c.handle_auth_failure(&invoices()).await }
        });
        while f.coordinator.pending_len() == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        assert_eq!(follower.await.unwrap(), Settlement::Reject);
        assert!(!f.coordinator.is_refreshing());
    }
}
