use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque bearer credential.
///
/// The value is never printed: `Debug` is redacted and there is no `Display`.
///
/// # Examples
///
/// ```
/// use core_auth::Token;
///
/// let token = Token::new("eyJhbGciOi...");
/// assert_eq!(format!("{:?}", token), "Token([REDACTED])");
/// assert_eq!(token.as_str(), "eyJhbGciOi...");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The (access, refresh) tuple of one authenticated session.
///
/// Both halves are always present together; a session with only one of them
/// is treated as logged out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: Token,
    pub refresh: Token,
}

impl CredentialPair {
    pub fn new(access: impl Into<Token>, refresh: impl Into<Token>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

/// Refresh endpoint response body.
///
/// Servers that don't rotate refresh tokens omit `refresh`; the current one
/// then stays valid.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedCredentials {
    #[serde(alias = "access_token")]
    pub access: Token,
    #[serde(default, alias = "refresh_token")]
    pub refresh: Option<Token>,
}

impl RefreshedCredentials {
    /// Whether the server issued a new refresh token.
    pub fn rotated(&self) -> bool {
        self.refresh.is_some()
    }

    /// Builds the pair to persist, keeping `current_refresh` unless rotated.
    pub fn into_pair(self, current_refresh: Token) -> CredentialPair {
        CredentialPair {
            access: self.access,
            refresh: self.refresh.unwrap_or(current_refresh),
        }
    }
}

/// Refresh coordinator state.
///
/// ```text
///  Idle ──(first auth failure)──> Refreshing
///   ^                                 │
///   └────(refresh settled, queue drained)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Refreshing,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Refreshing => "refreshing",
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation id of one `send` call, shared by its original dispatch and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The refresh cycle failed
    RefreshFailed,
    /// A direct call to the refresh endpoint was rejected
    RefreshCallUnauthorized,
    /// The user logged out
    Logout,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::RefreshFailed => "refresh_failed",
            TerminationReason::RefreshCallUnauthorized => "refresh_call_unauthorized",
            TerminationReason::Logout => "logout",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
