//! Session Terminator
//!
//! Ends the session once credentials can no longer be renewed: clears the
//! credential store, sends the user to the login route and tells the host
//! through the event bus.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::types::TerminationReason;
use bridge_traits::navigation::Navigator;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct SessionTerminator {
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    event_bus: EventBus,
    terminated: AtomicBool,
}

impl SessionTerminator {
    pub fn new(
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            navigator,
            login_route: login_route.into(),
            event_bus,
            terminated: AtomicBool::new(false),
        }
    }

    /// Terminate the session.
    ///
    /// The store is cleared on every call. Navigation and the
    /// `SessionTerminated` event happen once until [`rearm`](Self::rearm).
    #[instrument(skip(self), fields(reason = %reason))]
    pub async fn terminate(&self, reason: TerminationReason) -> Result<()> {
        let cleared = self.store.clear().await;
        if let Err(e) = &cleared {
            warn!(error = %e, "Failed to clear credentials while terminating session");
        }

        if self.terminated.swap(true, Ordering::SeqCst) {
            debug!("Session already terminated");
            return cleared;
        }

        warn!(route = %self.login_route, "Terminating session");

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SessionTerminated {
                reason: reason.as_str().to_string(),
                redirect_to: self.login_route.clone(),
            }));

        self.navigator
            .navigate_to(&self.login_route)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to navigate to login route");
                AuthError::NavigationFailed {
                    route: self.login_route.clone(),
                    reason: e.to_string(),
                }
            })?;

        cleared
    }

    /// Allow the next [`terminate`](Self::terminate) to navigate again.
    pub fn rearm(&self) {
        self.terminated.store(false, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }
}
