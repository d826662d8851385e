//! # Authenticated Client
//!
//! Entry point the rest of the application sends its API calls through.
//!
//! ## Overview
//!
//! `send` dispatches a request with the current access token. When the answer
//! is an authorization failure, the caller is suspended on the
//! [`RefreshCoordinator`] until a renewed token is available and the request is
//! replayed once with it. Whatever the replay returns, including a second
//! authorization failure, goes back to the caller unchanged.
//!
//! ```text
//! send ──> dispatcher ──> 2xx/4xx/5xx ─────────────────────────────> caller
//!                    └──> 401 ──> coordinator ──> T2 ──> replay ───> caller
//!                                            └──> failure ─────────> caller (Err)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{AuthenticatedClient, CredentialPair};
//! use bridge_traits::http::HttpRequest;
//!
//! let client = AuthenticatedClient::new(config, EventBus::default());
//! client.start_session(CredentialPair::new(access, refresh)).await?;
//!
//! let lessons = client.send(HttpRequest::get("/api/lessons/")).await?;
//! ```

use crate::coordinator::RefreshCoordinator;
use crate::credential_store::CredentialStore;
use crate::dispatcher::RequestDispatcher;
use crate::error::{AuthError, RefreshFailure, Result};
use crate::refresh::{HttpTokenRefresher, TokenRefresher};
use crate::terminator::SessionTerminator;
use crate::types::{CoordinatorState, CredentialPair, RequestId, TerminationReason};
use bridge_traits::http::{HttpRequest, HttpResponse};
use core_runtime::config::ClientConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, RequestEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// HTTP client with transparent single-flight token refresh.
pub struct AuthenticatedClient {
    dispatcher: Arc<RequestDispatcher>,
    coordinator: RefreshCoordinator,
    terminator: Arc<SessionTerminator>,
    store: CredentialStore,
    event_bus: EventBus,
    config: ClientConfig,
}

impl AuthenticatedClient {
    /// Wire a client that refreshes through the configured refresh endpoint.
    pub fn new(config: ClientConfig, event_bus: EventBus) -> Self {
        let store = CredentialStore::new(
            Arc::clone(&config.secure_store),
            config.storage_keys.clone(),
        );
        let dispatcher = Arc::new(RequestDispatcher::new(&config, store.clone()));
        let refresher = Arc::new(HttpTokenRefresher::new(
            Arc::clone(&dispatcher),
            config.refresh_url.clone(),
        ));

        Self::assemble(config, event_bus, store, dispatcher, refresher)
    }

    /// Wire a client around a custom [`TokenRefresher`].
    pub fn with_refresher(
        config: ClientConfig,
        event_bus: EventBus,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let store = CredentialStore::new(
            Arc::clone(&config.secure_store),
            config.storage_keys.clone(),
        );
        let dispatcher = Arc::new(RequestDispatcher::new(&config, store.clone()));

        Self::assemble(config, event_bus, store, dispatcher, refresher)
    }

    fn assemble(
        config: ClientConfig,
        event_bus: EventBus,
        store: CredentialStore,
        dispatcher: Arc<RequestDispatcher>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let terminator = Arc::new(SessionTerminator::new(
            store.clone(),
            Arc::clone(&config.navigator),
            config.login_route.clone(),
            event_bus.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            refresher,
            Arc::clone(&terminator),
            event_bus.clone(),
            config.refresh_timeout,
            config.max_pending_requests,
        );

        debug!(?config, "Authenticated client ready");

        Self {
            dispatcher,
            coordinator,
            terminator,
            store,
            event_bus,
            config,
        }
    }

    /// Send `request`, renewing the access token and replaying once if the
    /// server rejects it.
    ///
    /// # Errors
    ///
    /// - `Transport` when no response was received
    /// - `RefreshFailed` when the token could not be renewed; the session has
    ///   been terminated by then
    /// - `RefreshQueueFull` when too many requests already wait on a refresh
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request_id = RequestId::new();
        let token = self.store.access_token().await?;

        let response = self
            .dispatcher
            .send_with_token(request.clone(), token.as_ref())
            .await?;

        if !self.config.is_auth_failure(response.status) {
            return Ok(response);
        }

        if self.dispatcher.is_refresh_call(&request) {
            return Err(self.refresh_call_unauthorized(response.status).await);
        }

        debug!(%request_id, status = response.status, "Authorization rejected, awaiting refresh");
        let renewed = self.coordinator.await_refresh(request_id, token.as_ref()).await?;

        // Replayed once; a second rejection is the caller's answer.
        let replay = self
            .dispatcher
            .send_with_token(request, Some(&renewed))
            .await?;

        if self.config.is_auth_failure(replay.status) {
            warn!(%request_id, status = replay.status, "Replay rejected again, giving up");
        }

        let _ = self
            .event_bus
            .emit(CoreEvent::Request(RequestEvent::Replayed {
                request_id: request_id.to_string(),
                status: replay.status,
            }));

        Ok(replay)
    }

    /// Persist a freshly issued credential pair and begin a new session.
    ///
    /// Any refresh still in flight from the previous session is discarded.
    #[instrument(skip(self, pair))]
    pub async fn start_session(&self, pair: CredentialPair) -> Result<()> {
        let generation = self.coordinator.advance_generation().await;
        self.store.set(&pair).await?;
        self.terminator.rearm();

        info!(generation, "Session started");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SessionStarted));
        Ok(())
    }

    /// End the session: clear credentials and navigate to the login route.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.advance_generation().await;
        self.terminator.terminate(TerminationReason::Logout).await
    }

    pub async fn is_authenticated(&self) -> Result<bool> {
        self.store.has_credentials().await
    }

    pub async fn coordinator_state(&self) -> CoordinatorState {
        self.coordinator.state().await
    }

    pub async fn pending_requests(&self) -> usize {
        self.coordinator.pending_requests().await
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    /// The refresh endpoint itself rejected authorization. No further refresh
    /// is attempted, and a cycle already in flight is invalidated so it
    /// cannot write credentials back; its waiters get `SessionEnded`.
    async fn refresh_call_unauthorized(&self, status: u16) -> AuthError {
        let failure = RefreshFailure::RefreshCallUnauthorized { status };
        warn!(status, "Refresh endpoint rejected authorization");

        self.coordinator.advance_generation().await;

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::AuthError {
                message: failure.to_string(),
                recoverable: false,
            }));

        if let Err(e) = self
            .terminator
            .terminate(TerminationReason::RefreshCallUnauthorized)
            .await
        {
            warn!(error = %e, "Session termination did not complete");
        }

        AuthError::RefreshFailed(failure)
    }
}
