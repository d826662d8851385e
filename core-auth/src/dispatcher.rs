//! Request Dispatcher
//!
//! Sends one HTTP request with the current access token attached as an
//! `Authorization: Bearer` header. The response comes back unmodified for any
//! status; only transport failures are errors. There is no retry logic here.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::types::Token;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::config::{join_url, ClientConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

pub struct RequestDispatcher {
    http_client: Arc<dyn HttpClient>,
    store: CredentialStore,
    base_url: Url,
    refresh_url: Url,
    request_timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(config: &ClientConfig, store: CredentialStore) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            store,
            base_url: config.base_url.clone(),
            refresh_url: config.refresh_url.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// Send `request` with the stored access token.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.store.access_token().await?;
        self.send_with_token(request, token.as_ref()).await
    }

    /// Send `request` with an explicit access token.
    ///
    /// `None` leaves the request's own headers untouched.
    #[instrument(skip(self, request, token), fields(method = %request.method, url = %request.url))]
    pub async fn send_with_token(
        &self,
        request: HttpRequest,
        token: Option<&Token>,
    ) -> Result<HttpResponse> {
        let request = self.prepare(request, token)?;

        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(error = %e, "Request failed before a response was received");
            AuthError::Transport(e)
        })?;

        debug!(status = response.status, "Response received");
        Ok(response)
    }

    /// Whether `request` targets the refresh endpoint.
    ///
    /// Compares origin and path, ignoring a trailing slash and the query.
    pub fn is_refresh_call(&self, request: &HttpRequest) -> bool {
        let Ok(url) = self.resolve(&request.url) else {
            return false;
        };

        url.origin() == self.refresh_url.origin()
            && url.path().trim_end_matches('/') == self.refresh_url.path().trim_end_matches('/')
    }

    /// Resolve a possibly relative request URL against the base URL.
    ///
    /// Paths starting with `/` stay under the base path.
    pub fn resolve(&self, raw: &str) -> Result<Url> {
        join_url(&self.base_url, raw).map_err(|e| AuthError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }

    fn prepare(&self, mut request: HttpRequest, token: Option<&Token>) -> Result<HttpRequest> {
        request.url = self.resolve(&request.url)?.to_string();

        if request.timeout.is_none() {
            request.timeout = Some(self.request_timeout);
        }

        Ok(match token {
            Some(token) => request.bearer_token(token.as_str()),
            None => request,
        })
    }
}
