//! Refresh Client
//!
//! Wire adapter for the token refresh endpoint:
//!
//! ```text
//! POST <refresh_url>
//! {"refresh": "<refresh token>"}
//!
//! 2xx  {"access": "...", "refresh": "..."}   refresh is optional
//! ```
//!
//! Any non-2xx answer is a rejection. The call goes through the
//! [`RequestDispatcher`] so it carries the request-level timeout, but never an
//! access token.

use crate::dispatcher::RequestDispatcher;
use crate::error::{AuthError, RefreshFailure};
use crate::types::{RefreshedCredentials, Token};
use async_trait::async_trait;
use bridge_traits::http::HttpRequest;
use bridge_traits::BridgeError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Exchanges a refresh token for new credentials.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        refresh_token: &Token,
    ) -> std::result::Result<RefreshedCredentials, RefreshFailure>;
}

#[derive(Serialize)]
struct RefreshRequestBody<'a> {
    refresh: &'a str,
}

/// [`TokenRefresher`] that calls the configured refresh endpoint.
pub struct HttpTokenRefresher {
    dispatcher: Arc<RequestDispatcher>,
    refresh_url: Url,
}

impl HttpTokenRefresher {
    pub fn new(dispatcher: Arc<RequestDispatcher>, refresh_url: Url) -> Self {
        Self {
            dispatcher,
            refresh_url,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[instrument(skip(self, refresh_token), fields(url = %self.refresh_url))]
    async fn refresh(
        &self,
        refresh_token: &Token,
    ) -> std::result::Result<RefreshedCredentials, RefreshFailure> {
        let body = RefreshRequestBody {
            refresh: refresh_token.as_str(),
        };
        let request = HttpRequest::post(self.refresh_url.as_str())
            .json(&body)
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let response = self
            .dispatcher
            .send_with_token(request, None)
            .await
            .map_err(transport_failure)?;

        if !response.is_success() {
            warn!(status = response.status, "Refresh endpoint rejected the refresh token");
            return Err(RefreshFailure::Rejected {
                status: response.status,
            });
        }

        let refreshed: RefreshedCredentials = response.json().map_err(|e| {
            warn!(error = %e, "Failed to parse refresh response");
            RefreshFailure::InvalidResponse(e.to_string())
        })?;

        if refreshed.access.is_empty() {
            return Err(RefreshFailure::InvalidResponse(
                "empty access token".to_string(),
            ));
        }

        debug!(rotated = refreshed.rotated(), "Refresh endpoint issued new credentials");
        Ok(refreshed)
    }
}

fn transport_failure(error: AuthError) -> RefreshFailure {
    match error {
        AuthError::Transport(BridgeError::Timeout(message)) => {
            RefreshFailure::Transport(format!("timed out: {}", message))
        }
        other => RefreshFailure::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::CredentialStore;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpResponse};
    use bridge_traits::{Navigator, SecureStore};
    use core_runtime::config::{ClientConfig, StorageKeys};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    mock! {
        SecureStore {}

        #[async_trait]
        impl SecureStore for SecureStore {
            async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()>;
            async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>>;
            async fn delete_secret(&self, key: &str) -> BridgeResult<()>;
        }
    }

    mock! {
        Navigator {}

        #[async_trait]
        impl Navigator for Navigator {
            async fn navigate_to(&self, route: &str) -> BridgeResult<()>;
        }
    }

    fn refresher(http: MockHttpClient) -> HttpTokenRefresher {
        let secure_store: Arc<dyn SecureStore> = Arc::new(MockSecureStore::new());
        let config = ClientConfig::builder()
            .base_url("https://tutoring.example.com")
            .http_client(Arc::new(http))
            .secure_store(Arc::clone(&secure_store))
            .navigator(Arc::new(MockNavigator::new()))
            .build()
            .unwrap();

        let store = CredentialStore::new(secure_store, StorageKeys::default());
        let dispatcher = Arc::new(RequestDispatcher::new(&config, store));
        HttpTokenRefresher::new(dispatcher, config.refresh_url.clone())
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://tutoring.example.com/api/token/refresh/");
            assert!(req.bearer().is_none());

            let body: serde_json::Value =
                serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(body, serde_json::json!({ "refresh": "F1" }));

            Ok(HttpResponse::new(200, r#"{"access": "T2", "refresh": "F2"}"#))
        });

        let refreshed = refresher(http).refresh(&Token::new("F1")).await.unwrap();

        assert_eq!(refreshed.access, Token::new("T2"));
        assert_eq!(refreshed.refresh, Some(Token::new("F2")));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, r#"{"detail": "Token is invalid"}"#)));

        let failure = refresher(http)
            .refresh(&Token::new("F1"))
            .await
            .unwrap_err();

        assert_eq!(failure, RefreshFailure::Rejected { status: 401 });
    }

    #[tokio::test]
    async fn test_refresh_malformed_body() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "<html>maintenance</html>")));

        let failure = refresher(http)
            .refresh(&Token::new("F1"))
            .await
            .unwrap_err();

        assert!(matches!(failure, RefreshFailure::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_refresh_empty_access_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"access": ""}"#)));

        let failure = refresher(http)
            .refresh(&Token::new("F1"))
            .await
            .unwrap_err();

        assert!(matches!(failure, RefreshFailure::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_refresh_transport_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Timeout("after 30s".to_string())));

        let failure = refresher(http)
            .refresh(&Token::new("F1"))
            .await
            .unwrap_err();

        assert!(matches!(failure, RefreshFailure::Transport(ref msg) if msg.contains("timed out")));
    }
}
