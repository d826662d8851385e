//! # Refresh Coordinator
//!
//! Single-flight renewal of the access token.
//!
//! ## Overview
//!
//! When a request fails authorization, its caller asks the coordinator for a
//! new access token. The first caller to arrive while the coordinator is
//! `Idle` starts a refresh cycle; everyone arriving while it is `Refreshing`
//! waits in a FIFO queue. However many requests failed, the refresh endpoint
//! is called once per cycle.
//!
//! ```text
//!  caller A ──401──┐
//!  caller B ──401──┼──> queue [A, B, C] ──> one refresh call ──> T2 ──> A, B, C replay
//!  caller C ──401──┘
//! ```
//!
//! ## Cycle outcome
//!
//! - **Success**: the new pair is written to the credential store while the
//!   coordinator lock is held, the state returns to `Idle`, and every waiter
//!   receives the new access token in queue order.
//! - **Failure**: the store is cleared, the state returns to `Idle`, every
//!   waiter receives the failure, then the session terminator runs.
//!
//! The cycle runs on its own task so a caller that gives up (its future is
//! dropped) cannot leave the coordinator stuck in `Refreshing`.
//!
//! ## Session generation
//!
//! `start_session` and `logout` advance a generation counter. A cycle that
//! finishes under a newer generation neither writes nor clears credentials;
//! its waiters receive `RefreshFailure::SessionEnded`.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, RefreshFailure, Result};
use crate::refresh::TokenRefresher;
use crate::terminator::SessionTerminator;
use crate::types::{CoordinatorState, CredentialPair, RequestId, TerminationReason, Token};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, RequestEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

type RefreshOutcome = std::result::Result<Token, RefreshFailure>;

/// A caller suspended until the in-flight refresh settles.
struct PendingRequest {
    id: RequestId,
    enqueued_at: Instant,
    resume: oneshot::Sender<RefreshOutcome>,
}

impl PendingRequest {
    fn resume(self, outcome: RefreshOutcome) {
        let waited_ms = self.enqueued_at.elapsed().as_millis() as u64;
        if self.resume.send(outcome).is_err() {
            debug!(request_id = %self.id, waited_ms, "Caller went away before refresh settled");
        } else {
            debug!(request_id = %self.id, waited_ms, "Caller resumed");
        }
    }
}

struct CoordinatorShared {
    state: CoordinatorState,
    pending: VecDeque<PendingRequest>,
    generation: u64,
}

impl CoordinatorShared {
    /// Return to `Idle` and hand over the whole queue.
    fn settle(&mut self) -> VecDeque<PendingRequest> {
        self.state = CoordinatorState::Idle;
        std::mem::take(&mut self.pending)
    }
}

struct CoordinatorInner {
    shared: Mutex<CoordinatorShared>,
    store: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    terminator: Arc<SessionTerminator>,
    event_bus: EventBus,
    refresh_timeout: Duration,
    max_pending: usize,
}

/// Owns the refresh state machine of one client.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: CredentialStore,
        refresher: Arc<dyn TokenRefresher>,
        terminator: Arc<SessionTerminator>,
        event_bus: EventBus,
        refresh_timeout: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                shared: Mutex::new(CoordinatorShared {
                    state: CoordinatorState::Idle,
                    pending: VecDeque::new(),
                    generation: 0,
                }),
                store,
                refresher,
                terminator,
                event_bus,
                refresh_timeout,
                max_pending,
            }),
        }
    }

    /// Wait for a renewed access token after `stale_token` was rejected.
    ///
    /// Starts a refresh cycle when none is running. If the store already holds
    /// a different access token and no cycle is running, that token is
    /// returned right away.
    ///
    /// # Errors
    ///
    /// - `RefreshQueueFull` when `max_pending` callers are already waiting
    /// - `RefreshFailed` with the cycle's failure, shared by every waiter
    #[instrument(skip(self, request_id, stale_token), fields(request_id = %request_id))]
    pub async fn await_refresh(
        &self,
        request_id: RequestId,
        stale_token: Option<&Token>,
    ) -> Result<Token> {
        let waiter = {
            let mut shared = self.inner.shared.lock().await;

            if shared.state == CoordinatorState::Idle {
                if let Some(current) = self.inner.store.access_token().await? {
                    if stale_token != Some(&current) {
                        debug!("Access token was renewed meanwhile, skipping refresh");
                        return Ok(current);
                    }
                }
            }

            if shared.pending.len() >= self.inner.max_pending {
                warn!(
                    capacity = self.inner.max_pending,
                    "Refresh queue full, rejecting request"
                );
                return Err(AuthError::RefreshQueueFull {
                    capacity: self.inner.max_pending,
                });
            }

            let (resume, waiter) = oneshot::channel();
            shared.pending.push_back(PendingRequest {
                id: request_id,
                enqueued_at: Instant::now(),
                resume,
            });
            let position = shared.pending.len();

            let _ = self
                .inner
                .event_bus
                .emit(CoreEvent::Request(RequestEvent::Queued {
                    request_id: request_id.to_string(),
                    position,
                }));

            if shared.state == CoordinatorState::Idle {
                shared.state = CoordinatorState::Refreshing;
                let generation = shared.generation;
                info!(generation, "Starting token refresh");
                tokio::spawn(self.clone().run_cycle(generation));
            } else {
                debug!(position, "Waiting on in-flight token refresh");
            }

            waiter
        };

        match waiter.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(failure)) => Err(AuthError::RefreshFailed(failure)),
            Err(_) => Err(AuthError::RefreshFailed(RefreshFailure::Abandoned)),
        }
    }

    /// Current state of the state machine.
    pub async fn state(&self) -> CoordinatorState {
        self.inner.shared.lock().await.state
    }

    /// Number of callers waiting on the in-flight refresh.
    pub async fn pending_requests(&self) -> usize {
        self.inner.shared.lock().await.pending.len()
    }

    /// Invalidate any refresh cycle in flight.
    ///
    /// Returns the new generation.
    pub async fn advance_generation(&self) -> u64 {
        let mut shared = self.inner.shared.lock().await;
        shared.generation += 1;
        debug!(generation = shared.generation, "Session generation advanced");
        shared.generation
    }

    #[instrument(name = "refresh_cycle", skip(self))]
    async fn run_cycle(self, generation: u64) {
        let started = Instant::now();
        let _ = self
            .inner
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

        match self.fetch_credentials().await {
            Ok((pair, rotated)) => self.settle_success(generation, pair, rotated).await,
            Err(failure) => self.settle_failure(generation, failure).await,
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh cycle settled"
        );
    }

    async fn fetch_credentials(
        &self,
    ) -> std::result::Result<(CredentialPair, bool), RefreshFailure> {
        let refresh_token = self
            .inner
            .store
            .refresh_token()
            .await
            .map_err(|e| RefreshFailure::Storage(e.to_string()))?
            .ok_or(RefreshFailure::NoRefreshToken)?;

        // The refresher runs on its own task so a panic in it still settles
        // the queue.
        let refresher = Arc::clone(&self.inner.refresher);
        let presented = refresh_token.clone();
        let mut call = tokio::spawn(async move { refresher.refresh(&presented).await });

        let timeout = self.inner.refresh_timeout;
        let refreshed = match tokio::time::timeout(timeout, &mut call).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(e)) => {
                warn!(error = %e, "Token refresher did not complete");
                return Err(RefreshFailure::Abandoned);
            }
            Err(_) => {
                call.abort();
                return Err(RefreshFailure::Timeout {
                    after_ms: timeout.as_millis() as u64,
                });
            }
        };

        let rotated = refreshed.rotated();
        Ok((refreshed.into_pair(refresh_token), rotated))
    }

    async fn settle_success(&self, generation: u64, pair: CredentialPair, rotated: bool) {
        let mut shared = self.inner.shared.lock().await;

        if shared.generation != generation {
            info!("Session changed during refresh, discarding new credentials");
            let waiters = shared.settle();
            drop(shared);
            for waiter in waiters {
                waiter.resume(Err(RefreshFailure::SessionEnded));
            }
            return;
        }

        if let Err(e) = self.inner.store.set(&pair).await {
            drop(shared);
            self.settle_failure(generation, RefreshFailure::Storage(e.to_string()))
                .await;
            return;
        }

        let waiters = shared.settle();
        drop(shared);

        let released = waiters.len();
        for waiter in waiters {
            waiter.resume(Ok(pair.access.clone()));
        }

        info!(rotated, released, "Token refreshed");
        let _ = self
            .inner
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed { rotated, released }));
    }

    async fn settle_failure(&self, generation: u64, failure: RefreshFailure) {
        let mut shared = self.inner.shared.lock().await;
        let current_session = shared.generation == generation;

        if current_session {
            if let Err(e) = self.inner.store.clear().await {
                warn!(error = %e, "Failed to clear credentials after refresh failure");
            }
        }

        let waiters = shared.settle();
        drop(shared);

        warn!(
            error = %failure,
            waiting = waiters.len(),
            current_session,
            "Token refresh failed"
        );

        let outcome = if current_session {
            failure.clone()
        } else {
            RefreshFailure::SessionEnded
        };
        for waiter in waiters {
            waiter.resume(Err(outcome.clone()));
        }

        if !current_session {
            return;
        }

        let _ = self
            .inner
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::AuthError {
                message: failure.to_string(),
                recoverable: failure.is_recoverable(),
            }));

        if let Err(e) = self
            .inner
            .terminator
            .terminate(TerminationReason::RefreshFailed)
            .await
        {
            warn!(error = %e, "Session termination did not complete");
        }
    }
}
