//! # Authentication Module
//!
//! Authenticated HTTP access with single-flight token refresh.
//!
//! ## Overview
//!
//! Every API call of the application goes through [`AuthenticatedClient`].
//! It attaches the stored access token, and when the server answers with an
//! authorization failure it renews the token through the refresh endpoint and
//! replays the request. However many requests fail at once, only one refresh
//! call is made; if renewal fails the session is terminated and the user is
//! sent to the login route.
//!
//! ## Components
//!
//! - [`CredentialStore`]: access/refresh pair persisted in the secure store
//! - [`RequestDispatcher`]: one request, bearer token attached, no retries
//! - [`RefreshCoordinator`]: `Idle`/`Refreshing` state machine and waiter queue
//! - [`HttpTokenRefresher`]: wire adapter for the refresh endpoint
//! - [`SessionTerminator`]: clears credentials and navigates to login
//!
//! ## Events
//!
//! Session changes are published on the [`EventBus`](core_runtime::events::EventBus)
//! as `CoreEvent::Auth` and `CoreEvent::Request` events.

pub mod client;
pub mod coordinator;
pub mod credential_store;
pub mod dispatcher;
pub mod error;
pub mod refresh;
pub mod terminator;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::AuthenticatedClient;
pub use coordinator::RefreshCoordinator;
pub use credential_store::CredentialStore;
pub use dispatcher::RequestDispatcher;
pub use error::{AuthError, RefreshFailure, Result};
pub use refresh::{HttpTokenRefresher, TokenRefresher};
pub use terminator::SessionTerminator;
pub use types::{
    CoordinatorState, CredentialPair, RefreshedCredentials, RequestId, TerminationReason, Token,
};
