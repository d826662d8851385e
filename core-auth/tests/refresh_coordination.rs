//! Integration tests for transparent token refresh
//!
//! These tests drive `AuthenticatedClient` against a scripted API fake and
//! verify:
//! - One refresh call for any number of concurrent authorization failures
//! - Replay of every waiting request with the renewed token
//! - Session termination when the refresh endpoint itself is rejected
//! - A direct refresh call rejected mid-cycle ends the session for good
//! - Bounded retry, queue bound and refresh timeout
//! - Logout while a refresh is in flight

use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult, HttpClient, HttpRequest, HttpResponse, Navigator, SecureStore,
};
use core_auth::{
    AuthError, AuthenticatedClient, CoordinatorState, CredentialPair, RefreshFailure, Token,
};
use core_runtime::config::{ClientConfig, ClientConfigBuilder};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, RequestEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Clone)]
enum RefreshBehaviour {
    Issue {
        access: &'static str,
        refresh: Option<&'static str>,
    },
    Reject(u16),
    Hang,
}

/// Scripted API: protected endpoints accept only the currently valid access
/// token, the refresh endpoint answers per `RefreshBehaviour`.
struct FakeApi {
    valid_access: Mutex<String>,
    refresh_behaviour: Mutex<RefreshBehaviour>,
    refresh_gate: Semaphore,
    refresh_calls: AtomicUsize,
    refresh_bodies: Mutex<Vec<serde_json::Value>>,
    protected_calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeApi {
    fn new(valid_access: &str, behaviour: RefreshBehaviour) -> Arc<Self> {
        Self::with_gate(valid_access, behaviour, 1_000)
    }

    /// Like `new`, but refresh calls block until `open_gate`.
    fn gated(valid_access: &str, behaviour: RefreshBehaviour) -> Arc<Self> {
        Self::with_gate(valid_access, behaviour, 0)
    }

    fn with_gate(valid_access: &str, behaviour: RefreshBehaviour, permits: usize) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(valid_access.to_string()),
            refresh_behaviour: Mutex::new(behaviour),
            refresh_gate: Semaphore::new(permits),
            refresh_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            protected_calls: Mutex::new(Vec::new()),
        })
    }

    fn open_gate(&self) {
        self.refresh_gate.add_permits(1_000);
    }

    fn set_valid_access(&self, token: &str) {
        *self.valid_access.lock().unwrap() = token.to_string();
    }

    fn set_refresh_behaviour(&self, behaviour: RefreshBehaviour) {
        *self.refresh_behaviour.lock().unwrap() = behaviour;
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.refresh_bodies.lock().unwrap().clone()
    }

    fn protected_calls(&self) -> Vec<(String, Option<String>)> {
        self.protected_calls.lock().unwrap().clone()
    }

    fn bearers_for(&self, path: &str) -> Vec<Option<String>> {
        self.protected_calls()
            .into_iter()
            .filter(|(url, _)| url.ends_with(path))
            .map(|(_, bearer)| bearer)
            .collect()
    }

    async fn refresh(&self, request: &HttpRequest) -> BridgeResult<HttpResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(body) = request.body.as_deref() {
            if let Ok(json) = serde_json::from_slice(body) {
                self.refresh_bodies.lock().unwrap().push(json);
            }
        }

        let _permit = self.refresh_gate.acquire().await;

        let behaviour = self.refresh_behaviour.lock().unwrap().clone();
        match behaviour {
            RefreshBehaviour::Issue { access, refresh } => {
                self.set_valid_access(access);
                let body = match refresh {
                    Some(refresh) => serde_json::json!({ "access": access, "refresh": refresh }),
                    None => serde_json::json!({ "access": access }),
                };
                Ok(HttpResponse::new(200, body.to_string()))
            }
            RefreshBehaviour::Reject(status) => Ok(HttpResponse::new(
                status,
                r#"{"detail": "Token is invalid or expired"}"#,
            )),
            RefreshBehaviour::Hang => std::future::pending().await,
        }
    }

    fn protected(&self, request: &HttpRequest) -> HttpResponse {
        let bearer = request.bearer().map(str::to_string);
        self.protected_calls
            .lock()
            .unwrap()
            .push((request.url.clone(), bearer.clone()));

        let valid = self.valid_access.lock().unwrap().clone();
        let rejected = request.url.ends_with("/api/always-unauthorized/")
            || bearer.as_deref() != Some(valid.as_str());
        if rejected {
            HttpResponse::new(401, r#"{"detail": "Given token not valid"}"#)
        } else {
            HttpResponse::new(200, request.url.clone())
        }
    }
}

struct FakeHttpClient(Arc<FakeApi>);

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        if request.url.ends_with("/api/token/refresh/") {
            self.0.refresh(&request).await
        } else {
            Ok(self.0.protected(&request))
        }
    }
}

#[derive(Default)]
struct InMemorySecureStore {
    secrets: tokio::sync::Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.secrets
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.secrets.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.secrets.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }

    async fn wait_for(&self, count: usize) {
        while self.routes.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate_to(&self, route: &str) -> BridgeResult<()> {
        self.routes.lock().unwrap().push(route.to_string());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    client: Arc<AuthenticatedClient>,
    navigator: Arc<RecordingNavigator>,
    event_bus: EventBus,
}

async fn signed_in(
    api: &Arc<FakeApi>,
    configure: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
) -> Harness {
    let navigator = Arc::new(RecordingNavigator::default());
    let builder = ClientConfig::builder()
        .base_url("https://tutoring.example.com")
        .http_client(Arc::new(FakeHttpClient(Arc::clone(api))))
        .secure_store(Arc::new(InMemorySecureStore::default()))
        .navigator(navigator.clone());
    let config = configure(builder).build().unwrap();

    let event_bus = EventBus::new(64);
    let client = AuthenticatedClient::new(config, event_bus.clone());
    client
        .start_session(CredentialPair::new("T1", "F1"))
        .await
        .unwrap();

    Harness {
        client: Arc::new(client),
        navigator,
        event_bus,
    }
}

fn spawn_get(
    client: &Arc<AuthenticatedClient>,
    path: &str,
) -> tokio::task::JoinHandle<core_auth::Result<HttpResponse>> {
    let client = Arc::clone(client);
    let request = HttpRequest::get(path);
    tokio::spawn(async move { client.send(request).await })
}

async fn wait_for_pending(client: &AuthenticatedClient, count: usize) {
    while client.pending_requests().await < count {
        tokio::task::yield_now().await;
    }
}

fn issue(access: &'static str, refresh: Option<&'static str>) -> RefreshBehaviour {
    RefreshBehaviour::Issue { access, refresh }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_three_expired_requests_share_one_refresh() {
    let api = FakeApi::gated("T2", issue("T2", Some("F2")));
    let h = signed_in(&api, |b| b).await;

    let paths = ["/api/lessons/", "/api/students/", "/api/invoices/"];
    let handles: Vec<_> = paths.iter().map(|p| spawn_get(&h.client, p)).collect();

    wait_for_pending(&h.client, 3).await;
    assert_eq!(
        h.client.coordinator_state().await,
        CoordinatorState::Refreshing
    );
    api.open_gate();

    for (handle, path) in handles.into_iter().zip(paths) {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert!(response.text().unwrap().ends_with(path));
        assert_eq!(
            api.bearers_for(path),
            vec![Some("T1".to_string()), Some("T2".to_string())]
        );
    }

    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(
        api.refresh_bodies(),
        vec![serde_json::json!({ "refresh": "F1" })]
    );
    assert_eq!(
        h.client.credential_store().get().await.unwrap(),
        Some(CredentialPair::new("T2", "F2"))
    );
    assert_eq!(h.client.coordinator_state().await, CoordinatorState::Idle);
    assert_eq!(h.client.pending_requests().await, 0);
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_failures_single_refresh() {
    let api = FakeApi::new("T2", issue("T2", None));
    let h = signed_in(&api, |b| b).await;

    let handles: Vec<_> = (0..25)
        .map(|i| spawn_get(&h.client, &format!("/api/lessons/{}/", i)))
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, 200);
    }

    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(
        h.client.credential_store().get().await.unwrap(),
        Some(CredentialPair::new("T2", "F1"))
    );
}

#[tokio::test]
async fn test_rejected_refresh_fails_everyone_and_terminates_once() {
    let api = FakeApi::gated("T2", RefreshBehaviour::Reject(401));
    let h = signed_in(&api, |b| b).await;

    let handles: Vec<_> = ["/api/lessons/", "/api/students/"]
        .iter()
        .map(|p| spawn_get(&h.client, p))
        .collect();
    wait_for_pending(&h.client, 2).await;
    api.open_gate();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            AuthError::RefreshFailed(RefreshFailure::Rejected { status: 401 })
        ));
    }

    h.navigator.wait_for(1).await;
    tokio::task::yield_now().await;

    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(h.navigator.routes(), vec!["/login".to_string()]);
    assert!(!h.client.is_authenticated().await.unwrap());
    assert_eq!(h.client.coordinator_state().await, CoordinatorState::Idle);
}

#[tokio::test]
async fn test_request_rejected_after_refresh_is_not_retried_again() {
    let api = FakeApi::new("T2", issue("T2", Some("F2")));
    let h = signed_in(&api, |b| b).await;

    let response = h
        .client
        .send(HttpRequest::get("/api/always-unauthorized/"))
        .await
        .unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(api.bearers_for("/api/always-unauthorized/").len(), 2);
    assert!(h.client.is_authenticated().await.unwrap());
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test]
async fn test_next_expiry_starts_a_new_cycle() {
    let api = FakeApi::new("T2", issue("T2", Some("F2")));
    let h = signed_in(&api, |b| b).await;

    h.client
        .send(HttpRequest::get("/api/lessons/"))
        .await
        .unwrap();
    assert_eq!(h.client.coordinator_state().await, CoordinatorState::Idle);

    // T2 expires server side
    api.set_valid_access("T3");
    api.set_refresh_behaviour(issue("T3", Some("F3")));

    let response = h
        .client
        .send(HttpRequest::get("/api/lessons/"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(api.refresh_calls(), 2);
    assert_eq!(
        api.refresh_bodies(),
        vec![
            serde_json::json!({ "refresh": "F1" }),
            serde_json::json!({ "refresh": "F2" }),
        ]
    );
    assert_eq!(
        h.client.credential_store().get().await.unwrap(),
        Some(CredentialPair::new("T3", "F3"))
    );
}

#[tokio::test]
async fn test_queue_bound_rejects_overflow() {
    let api = FakeApi::gated("T2", issue("T2", None));
    let h = signed_in(&api, |b| b.max_pending_requests(2)).await;

    let handles: Vec<_> = ["/api/lessons/", "/api/students/"]
        .iter()
        .map(|p| spawn_get(&h.client, p))
        .collect();
    wait_for_pending(&h.client, 2).await;

    let err = h
        .client
        .send(HttpRequest::get("/api/invoices/"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RefreshQueueFull { capacity: 2 }));

    api.open_gate();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, 200);
    }
    assert_eq!(api.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_refresh_times_out() {
    let api = FakeApi::new("T2", RefreshBehaviour::Hang);
    let h = signed_in(&api, |b| b.refresh_timeout(Duration::from_secs(5))).await;

    let err = h
        .client
        .send(HttpRequest::get("/api/lessons/"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::RefreshFailed(RefreshFailure::Timeout { after_ms: 5_000 })
    ));
    assert_eq!(h.client.coordinator_state().await, CoordinatorState::Idle);
    assert!(!h.client.is_authenticated().await.unwrap());
    h.navigator.wait_for(1).await;
}

#[tokio::test]
async fn test_logout_during_refresh_discards_new_credentials() {
    let api = FakeApi::gated("T2", issue("T2", Some("F2")));
    let h = signed_in(&api, |b| b).await;

    let handle = spawn_get(&h.client, "/api/lessons/");
    wait_for_pending(&h.client, 1).await;

    h.client.logout().await.unwrap();
    api.open_gate();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        AuthError::RefreshFailed(RefreshFailure::SessionEnded)
    ));

    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(h.client.credential_store().get().await.unwrap(), None);
    assert_eq!(h.navigator.routes(), vec!["/login".to_string()]);
    assert_eq!(h.client.coordinator_state().await, CoordinatorState::Idle);
}

#[tokio::test]
async fn test_unauthorized_refresh_call_invalidates_in_flight_refresh() {
    let api = FakeApi::gated("T2", issue("T2", Some("F2")));
    let h = signed_in(&api, |b| b).await;

    let in_flight = spawn_get(&h.client, "/api/lessons/");
    wait_for_pending(&h.client, 1).await;

    // Same endpoint without the trailing slash: the fake answers it like a
    // protected route, so the stale T1 gets a 401 without touching the gate.
    let err = h
        .client
        .send(HttpRequest::post("/api/token/refresh"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::RefreshFailed(RefreshFailure::RefreshCallUnauthorized { status: 401 })
    ));
    assert!(!h.client.is_authenticated().await.unwrap());

    api.open_gate();

    let err = in_flight.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        AuthError::RefreshFailed(RefreshFailure::SessionEnded)
    ));

    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(h.client.credential_store().get().await.unwrap(), None);
    assert_eq!(h.navigator.routes(), vec!["/login".to_string()]);
    assert_eq!(h.client.coordinator_state().await, CoordinatorState::Idle);
    assert_eq!(api.bearers_for("/api/lessons/"), vec![Some("T1".to_string())]);
}

#[tokio::test]
async fn test_refresh_emits_lifecycle_events() {
    let api = FakeApi::new("T2", issue("T2", Some("F2")));
    let h = signed_in(&api, |b| b).await;
    let mut events = h.event_bus.subscribe();

    h.client
        .send(HttpRequest::get("/api/lessons/"))
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(received.len(), 4);
    assert!(matches!(
        received[0],
        CoreEvent::Request(RequestEvent::Queued { position: 1, .. })
    ));
    assert_eq!(received[1], CoreEvent::Auth(AuthEvent::TokenRefreshing));
    assert_eq!(
        received[2],
        CoreEvent::Auth(AuthEvent::TokenRefreshed {
            rotated: true,
            released: 1,
        })
    );
    assert!(matches!(
        received[3],
        CoreEvent::Request(RequestEvent::Replayed { status: 200, .. })
    ));
}

#[tokio::test]
async fn test_unauthenticated_request_ends_without_refresh_call() {
    let api = FakeApi::new("T2", issue("T2", None));
    let h = signed_in(&api, |b| b).await;
    h.client.credential_store().clear().await.unwrap();

    let err = h
        .client
        .send(HttpRequest::get("/api/lessons/"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::RefreshFailed(RefreshFailure::NoRefreshToken)
    ));
    assert_eq!(api.refresh_calls(), 0);
    assert_eq!(api.bearers_for("/api/lessons/"), vec![None]);
    h.navigator.wait_for(1).await;
}

#[tokio::test]
async fn test_stored_token_is_used_for_every_request() {
    let api = FakeApi::new("T1", issue("T2", None));
    let h = signed_in(&api, |b| b).await;

    for _ in 0..3 {
        h.client
            .send(HttpRequest::get("/api/lessons/"))
            .await
            .unwrap();
    }

    assert_eq!(api.refresh_calls(), 0);
    assert_eq!(
        h.client.credential_store().access_token().await.unwrap(),
        Some(Token::new("T1"))
    );
    assert_eq!(api.bearers_for("/api/lessons/").len(), 3);
}
