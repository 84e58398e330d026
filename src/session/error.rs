use crate::kv::KvError;

/// Errors from the login-session flow.
///
/// Only the `Display` text of these ever reaches an end user through the
/// login initiator; the callback endpoint answers with generic messages and
/// logs the detail instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No identity provider is configured.
    #[error("OIDC ID provider configuration not found")]
    NotConfigured,

    /// Transient coordination-store failure.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(String),

    /// The watch on a session record dropped. Retried internally, never
    /// returned from [`resolve`](super::Authenticator::resolve).
    #[error("error watching OIDC state token: {0}")]
    WatchTransport(String),

    /// The pending record vanished before the login completed.
    #[error("error during authorization: OIDC state token expired")]
    SessionExpired,

    /// Code exchange, token verification or nonce check failed.
    #[error("Authorization failed")]
    AuthorizationFailed,

    /// Fetching the user's identity with a valid credential failed.
    #[error("could not fetch user info: {0}")]
    IdentityFetch(#[source] crate::error::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether retrying the operation that produced this error can help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::WatchTransport(_))
    }
}

impl From<KvError> for SessionError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::NotFound(_) => Self::SessionExpired,
            KvError::Unavailable(detail) => Self::StoreUnavailable(detail),
            KvError::AlreadyExists(key) => {
                Self::StoreUnavailable(format!("session token collision on {key}"))
            }
        }
    }
}
