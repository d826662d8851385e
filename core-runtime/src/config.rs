//! # Client Configuration Module
//!
//! Provides configuration management for the authenticated HTTP client.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `ClientConfig` instance that holds the API endpoints, timeouts, refresh
//! policy and the host bridges the client needs. It enforces fail-fast
//! validation so a misconfigured client never reaches the network.
//!
//! ## Required Dependencies
//!
//! - `Navigator` - Required to send the user back to the login screen
//!
//! ## Dependencies with platform defaults
//!
//! - `HttpClient` - HTTP transport (desktop default: reqwest)
//! - `SecureStore` - Credential persistence (desktop default: OS keychain)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient` and `SecureStore` are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ClientConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .base_url("https://tutoring.example.com")
//!     .refresh_path("/api/token/refresh/")
//!     .login_route("/login")
//!     .request_timeout(Duration::from_secs(15))
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .navigator(Arc::new(MyNavigator))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, Navigator, SecureStore};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Path of the token refresh endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/api/token/refresh/";

/// Unauthenticated entry point the user is sent to when the session ends.
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Request-level timeout applied to every call, the refresh call included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of callers suspended behind one refresh.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 256;

const MAX_PENDING_REQUESTS_LIMIT: usize = 10_000;

/// Statuses that mean "the access credential was rejected".
pub const DEFAULT_AUTH_FAILURE_STATUSES: &[u16] = &[401];

/// Keys under which the credential pair is persisted in the secure store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub access: String,
    pub refresh: String,
}

impl StorageKeys {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("access_token", "refresh_token")
    }
}

/// Configuration for the authenticated HTTP client.
///
/// Use [`ClientConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL relative request paths are resolved against
    pub base_url: Url,

    /// Absolute URL of the token refresh endpoint
    pub refresh_url: Url,

    /// Route the navigator is sent to when the session terminates
    pub login_route: String,

    /// Timeout applied to requests that don't carry their own
    pub request_timeout: Duration,

    /// Upper bound for one refresh attempt
    pub refresh_timeout: Duration,

    /// Maximum number of callers waiting on an in-flight refresh
    pub max_pending_requests: usize,

    /// Response statuses that trigger the refresh protocol
    pub auth_failure_statuses: Vec<u16>,

    /// Secure store keys for the access and refresh tokens
    pub storage_keys: StorageKeys,

    /// HTTP transport
    pub http_client: Arc<dyn HttpClient>,

    /// Credential persistence
    pub secure_store: Arc<dyn SecureStore>,

    /// Host router
    pub navigator: Arc<dyn Navigator>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("refresh_url", &self.refresh_url.as_str())
            .field("login_route", &self.login_route)
            .field("request_timeout", &self.request_timeout)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("max_pending_requests", &self.max_pending_requests)
            .field("auth_failure_statuses", &self.auth_failure_statuses)
            .field("storage_keys", &self.storage_keys)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("navigator", &"Navigator { ... }")
            .finish()
    }
}

impl ClientConfig {
    /// Creates a new builder for constructing a `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Whether `status` means the access credential was rejected.
    pub fn is_auth_failure(&self, status: u16) -> bool {
        self.auth_failure_statuses.contains(&status)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Base and refresh URLs use http(s)
    /// - Timeouts are non-zero
    /// - The pending-request bound is within limits
    /// - Auth failure statuses are client errors
    /// - The login route is an absolute path
    /// - Storage keys are non-empty and distinct
    pub fn validate(&self) -> Result<()> {
        for url in [&self.base_url, &self.refresh_url] {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::InvalidUrl {
                    url: url.to_string(),
                    reason: "only http and https are supported".to_string(),
                });
            }
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.refresh_timeout.is_zero() {
            return Err(Error::Config(
                "Refresh timeout must be greater than zero".to_string(),
            ));
        }

        if self.max_pending_requests == 0 {
            return Err(Error::Config(
                "Pending request limit must be greater than 0".to_string(),
            ));
        }

        if self.max_pending_requests > MAX_PENDING_REQUESTS_LIMIT {
            return Err(Error::Config(format!(
                "Pending request limit exceeds maximum of {}",
                MAX_PENDING_REQUESTS_LIMIT
            )));
        }

        if self.auth_failure_statuses.is_empty() {
            return Err(Error::Config(
                "At least one auth failure status is required (usually 401)".to_string(),
            ));
        }

        if let Some(status) = self
            .auth_failure_statuses
            .iter()
            .find(|status| !(400..500).contains(*status))
        {
            return Err(Error::Config(format!(
                "Auth failure status {} is not a 4xx client error",
                status
            )));
        }

        if !self.login_route.starts_with('/') {
            return Err(Error::Config(format!(
                "Login route '{}' must start with '/'",
                self.login_route
            )));
        }

        if self.storage_keys.access.is_empty() || self.storage_keys.refresh.is_empty() {
            return Err(Error::Config("Storage keys cannot be empty".to_string()));
        }

        if self.storage_keys.access == self.storage_keys.refresh {
            return Err(Error::Config(
                "Access and refresh tokens must use different storage keys".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the API. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Web: inject a fetch-based client."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
                 Web: inject session-storage backed secure storage."
            .to_string(),
    }
}

fn navigator_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "Navigator".to_string(),
        message: "Navigator implementation is required to return the user to the login screen \
                 when the session ends. Inject the host router."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }

    // A base without a trailing slash would drop its last segment on join
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Resolve `raw` against `base` without losing the base path.
///
/// A leading `/` is read as "under the API base", so `/lessons/` under
/// `https://host/api/` gives `https://host/api/lessons/`. Absolute and
/// protocol-relative (`//host/...`) URLs are taken as they are.
pub fn join_url(base: &Url, raw: &str) -> std::result::Result<Url, url::ParseError> {
    let relative = match raw.strip_prefix('/') {
        Some(rest) if !rest.starts_with('/') => rest,
        _ => raw,
    };
    base.join(relative)
}

/// Builder for constructing [`ClientConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](ClientConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    refresh_path: Option<String>,
    login_route: Option<String>,
    request_timeout: Option<Duration>,
    refresh_timeout: Option<Duration>,
    max_pending_requests: Option<usize>,
    auth_failure_statuses: Option<Vec<u16>>,
    storage_keys: Option<StorageKeys>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ClientConfigBuilder {
    /// Sets the API base URL (e.g. `https://tutoring.example.com`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the refresh endpoint, either a path relative to the base URL or an
    /// absolute URL.
    ///
    /// Default: `/api/token/refresh/`
    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    /// Sets the route used when the session terminates.
    ///
    /// Default: `/login`
    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = Some(route.into());
        self
    }

    /// Sets the request-level timeout.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the upper bound of one refresh attempt.
    ///
    /// Default: the request timeout
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Sets how many callers may wait on one in-flight refresh.
    ///
    /// Default: 256
    pub fn max_pending_requests(mut self, limit: usize) -> Self {
        self.max_pending_requests = Some(limit);
        self
    }

    /// Sets the response statuses that trigger a refresh.
    ///
    /// Default: `[401]`
    pub fn auth_failure_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.auth_failure_statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Sets the secure store keys of the credential pair.
    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.storage_keys = Some(keys);
        self
    }

    /// Sets the HTTP transport.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the credential persistence backend.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the host router.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Builds the final `ClientConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The base URL is missing or invalid
    /// - Required bridges are missing (Navigator; HttpClient and SecureStore
    ///   without `desktop-shims`)
    /// - Configuration values are invalid
    pub fn build(self) -> Result<ClientConfig> {
        let raw_base = self.base_url.ok_or_else(|| {
            Error::Config("Base URL is required. Use .base_url() to set it.".to_string())
        })?;
        let base_url = parse_base_url(&raw_base)?;

        let refresh_path = self
            .refresh_path
            .unwrap_or_else(|| DEFAULT_REFRESH_PATH.to_string());
        let refresh_url = join_url(&base_url, &refresh_path)
            .map_err(|e| Error::InvalidUrl {
                url: refresh_path.clone(),
                reason: e.to_string(),
            })?;

        let navigator = self.navigator.ok_or_else(navigator_missing_error)?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let config = ClientConfig {
            base_url,
            refresh_url,
            login_route: self
                .login_route
                .unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.to_string()),
            request_timeout,
            refresh_timeout: self.refresh_timeout.unwrap_or(request_timeout),
            max_pending_requests: self
                .max_pending_requests
                .unwrap_or(DEFAULT_MAX_PENDING_REQUESTS),
            auth_failure_statuses: self
                .auth_failure_statuses
                .unwrap_or_else(|| DEFAULT_AUTH_FAILURE_STATUSES.to_vec()),
            storage_keys: self.storage_keys.unwrap_or_default(),
            http_client,
            secure_store,
            navigator,
        };

        config.validate()?;

        Ok(config)
    }
}
