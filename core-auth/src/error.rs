use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshFailure),

    #[error("Too many requests waiting on token refresh (capacity {capacity})")]
    RefreshQueueFull { capacity: usize },

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored credential '{key}' is corrupted: {reason}")]
    CredentialCorrupted { key: String, reason: String },

    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Navigation to '{route}' failed: {reason}")]
    NavigationFailed { route: String, reason: String },
}

impl AuthError {
    /// Whether the session was ended because of this error.
    pub fn ends_session(&self) -> bool {
        matches!(self, AuthError::RefreshFailed(failure) if failure.ends_session())
    }
}

/// Outcome of a failed refresh cycle.
///
/// Every caller waiting on the cycle receives its own copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("no refresh token is stored")]
    NoRefreshToken,

    #[error("refresh token rejected with status {status}")]
    Rejected { status: u16 },

    #[error("refresh endpoint answered {status} to a direct call")]
    RefreshCallUnauthorized { status: u16 },

    #[error("refresh call failed: {0}")]
    Transport(String),

    #[error("refresh timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("session ended while the refresh was in flight")]
    SessionEnded,

    #[error("refresh cycle died before settling")]
    Abandoned,
}

impl RefreshFailure {
    /// Whether retrying later with the same refresh token could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RefreshFailure::Transport(_) | RefreshFailure::Timeout { .. } | RefreshFailure::Abandoned
        )
    }

    /// Whether the failure terminated the session.
    ///
    /// `SessionEnded` means the session was already gone (logout or a new
    /// login) before the cycle finished.
    pub fn ends_session(&self) -> bool {
        !matches!(self, RefreshFailure::SessionEnded)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
