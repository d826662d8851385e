//! Workspace façade crate.
//!
//! Re-exports the authenticated HTTP client and its configuration so host
//! applications can depend on `tutor-http-workspace` alone. The
//! `desktop-shims` feature (default) turns on the reqwest transport and OS
//! keychain store as configuration defaults.

pub use bridge_traits::{HttpMethod, HttpRequest, HttpResponse, Navigator};
pub use core_auth::{
    AuthError, AuthenticatedClient, CoordinatorState, CredentialPair, RefreshFailure, Token,
};
pub use core_runtime::config::{ClientConfig, StorageKeys};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventBus, EventStream, RequestEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
