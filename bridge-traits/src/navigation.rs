//! Client-side navigation abstraction.
//!
//! The core never renders anything; when the session ends it asks the host to
//! move the user to an entry route (typically the login screen).

use async_trait::async_trait;

use crate::error::Result;

/// Host router trait
///
/// - Web: history push / location replace
/// - Desktop: switch the active view
///
/// Implementations should make repeated navigation to the current route a
/// no-op.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Transfer control to `route` (e.g. `/login`).
    async fn navigate_to(&self, route: &str) -> Result<()>;

    /// The route currently displayed, if the host tracks it.
    fn current_route(&self) -> Option<String> {
        None
    }
}
