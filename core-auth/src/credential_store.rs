//! Credential Storage
//!
//! Persists the session's credential pair through the platform `SecureStore`
//! so a reload of the host application keeps the user signed in.
//!
//! ## Layout
//!
//! Two UTF-8 values under the configured keys (default `access_token` and
//! `refresh_token`). A pair with only one half present reads as logged out.
//!
//! ## Security Features
//!
//! - Token values are never logged or placed in error messages
//! - Values that are not valid UTF-8 are deleted and reported as corrupted
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{CredentialPair, CredentialStore};
//! use core_runtime::config::StorageKeys;
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store, StorageKeys::default());
//!
//! store.set(&CredentialPair::new("access", "refresh")).await?;
//! assert!(store.get().await?.is_some());
//!
//! store.clear().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{CredentialPair, Token};
use bridge_traits::storage::SecureStore;
use core_runtime::config::StorageKeys;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key/value persistence of the current credential pair.
#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    keys: StorageKeys,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, keys: StorageKeys) -> Self {
        debug!(
            access_key = %keys.access,
            refresh_key = %keys.refresh,
            "Initializing CredentialStore"
        );
        Self { secure_store, keys }
    }

    /// Read the stored pair.
    ///
    /// Returns:
    /// - `Ok(Some(pair))` if both tokens are present
    /// - `Ok(None)` if either one is missing
    /// - `Err` if the secure store is unavailable or a value is corrupted
    pub async fn get(&self) -> Result<Option<CredentialPair>> {
        let access = self.read_token(&self.keys.access).await?;
        let refresh = self.read_token(&self.keys.refresh).await?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(CredentialPair { access, refresh })),
            (None, None) => Ok(None),
            (access, refresh) => {
                debug!(
                    has_access = access.is_some(),
                    has_refresh = refresh.is_some(),
                    "Partial credential pair treated as logged out"
                );
                Ok(None)
            }
        }
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Result<Option<Token>> {
        self.read_token(&self.keys.access).await
    }

    /// Current refresh token, if any.
    pub async fn refresh_token(&self) -> Result<Option<Token>> {
        self.read_token(&self.keys.refresh).await
    }

    /// Persist `pair`, replacing the stored one.
    pub async fn set(&self, pair: &CredentialPair) -> Result<()> {
        self.write_token(&self.keys.access, &pair.access).await?;
        self.write_token(&self.keys.refresh, &pair.refresh).await?;

        info!("Credentials stored securely");
        Ok(())
    }

    /// Erase both tokens.
    ///
    /// Idempotent. Both deletions are attempted even if the first fails.
    pub async fn clear(&self) -> Result<()> {
        let access = self.delete_token(&self.keys.access).await;
        let refresh = self.delete_token(&self.keys.refresh).await;
        access.and(refresh)?;

        info!("Credentials cleared");
        Ok(())
    }

    /// Whether a complete pair is stored.
    pub async fn has_credentials(&self) -> Result<bool> {
        let access = self.has_token(&self.keys.access).await?;
        Ok(access && self.has_token(&self.keys.refresh).await?)
    }

    async fn read_token(&self, key: &str) -> Result<Option<Token>> {
        let data = self.secure_store.get_secret(key).await.map_err(|e| {
            warn!(key, error = %e, "Failed to read credential from secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            return Ok(None);
        };

        match String::from_utf8(data) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(Token::new(value))),
            Err(e) => {
                warn!(key, error = %e, "Stored credential is not valid UTF-8, deleting it");

                if let Err(delete_err) = self.secure_store.delete_secret(key).await {
                    warn!(key, error = %delete_err, "Failed to delete corrupted credential");
                }

                Err(AuthError::CredentialCorrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn write_token(&self, key: &str, token: &Token) -> Result<()> {
        self.secure_store
            .set_secret(key, token.as_str().as_bytes())
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Failed to store credential in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })
    }

    async fn delete_token(&self, key: &str) -> Result<()> {
        self.secure_store.delete_secret(key).await.map_err(|e| {
            warn!(key, error = %e, "Failed to delete credential from secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })
    }

    async fn has_token(&self, key: &str) -> Result<bool> {
        self.secure_store.has_secret(key).await.map_err(|e| {
            warn!(key, error = %e, "Failed to check credential in secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })
    }
}
