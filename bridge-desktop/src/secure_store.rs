//! Credential storage in the OS keychain.
//!
//! Each secret is one keychain entry: the service is shared by the whole
//! client, the account is the storage key (`access_token`, `refresh_token`).
//! Keychain calls block, so they run on the blocking pool.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tracing::debug;

/// Keychain service the session credentials are filed under.
pub const DEFAULT_SERVICE: &str = "tutor-http-client";

/// [`SecureStore`] backed by macOS Keychain, Windows Credential Manager or
/// the Secret Service on Linux.
pub struct KeyringSecureStore {
    service: String,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    /// Separate service, e.g. per backend environment.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Entry) -> keyring::Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let account = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &account)?;
            op(&entry)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Keychain task failed: {}", e)))?
        .map_err(map_keyring_error)
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let encoded = encode_secret(value);
        self.with_entry(key, move |entry| entry.set_password(&encoded))
            .await?;

        debug!(key, "Credential written to keychain");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let stored = self
            .with_entry(key, |entry| match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            })
            .await?;

        stored.map(|value| decode_secret(&value)).transpose()
    }

    /// A missing entry counts as deleted.
    async fn delete_secret(&self, key: &str) -> Result<()> {
        let existed = self
            .with_entry(key, |entry| match entry.delete_credential() {
                Ok(()) => Ok(true),
                Err(keyring::Error::NoEntry) => Ok(false),
                Err(e) => Err(e),
            })
            .await?;

        debug!(key, existed, "Credential removed from keychain");
        Ok(())
    }
}

// Keychain entries hold text; secrets are arbitrary bytes.
fn encode_secret(value: &[u8]) -> String {
    STANDARD.encode(value)
}

fn decode_secret(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| BridgeError::OperationFailed(format!("Keychain entry is not base64: {}", e)))
}

/// Locked or missing keychains are reported as unavailable, not as failures.
fn map_keyring_error(e: keyring::Error) -> BridgeError {
    match &e {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            BridgeError::NotAvailable(format!("Keychain unavailable: {}", e))
        }
        _ => BridgeError::OperationFailed(format!("Keychain error: {}", e)),
    }
}
