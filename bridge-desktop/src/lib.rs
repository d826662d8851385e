//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate
//! - `Navigator` backed by a `tokio::sync::watch` channel the UI layer observes
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, WatchNavigator};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let navigator = WatchNavigator::new("/dashboard");
//!     let mut routes = navigator.subscribe();
//!     // Hand both to the client configuration
//!     Ok(())
//! }
//! ```

mod http;
mod navigator;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use http::ReqwestHttpClient;
pub use navigator::WatchNavigator;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
