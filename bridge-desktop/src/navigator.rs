//! Navigation backed by a watch channel.

use async_trait::async_trait;
use bridge_traits::{error::Result, navigation::Navigator};
use tokio::sync::watch;
use tracing::info;

/// Navigator for desktop shells.
///
/// The core publishes route changes into a `watch` channel; the UI layer keeps
/// a receiver and swaps the active view whenever the route changes.
pub struct WatchNavigator {
    sender: watch::Sender<String>,
}

impl WatchNavigator {
    pub fn new(initial_route: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(initial_route.into());
        Self { sender }
    }

    /// Receiver that observes every route change.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for WatchNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

#[async_trait]
impl Navigator for WatchNavigator {
    async fn navigate_to(&self, route: &str) -> Result<()> {
        let changed = self.sender.send_if_modified(|current| {
            if current == route {
                false
            } else {
                *current = route.to_string();
                true
            }
        });

        if changed {
            info!(route, "Navigated");
        }
        Ok(())
    }

    fn current_route(&self) -> Option<String> {
        Some(self.sender.borrow().clone())
    }
}
