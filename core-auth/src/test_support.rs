use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{Navigator, SecureStore};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-memory SecureStore
#[derive(Default)]
pub(crate) struct MockSecureStore {
    storage: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for MockSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.storage
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.storage.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage.lock().await.remove(key);
        Ok(())
    }
}

/// Navigator that records every route it is sent to.
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    routes: std::sync::Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }

    /// Wait until `count` navigations happened.
    pub(crate) async fn wait_for(&self, count: usize) {
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
