use serde::{Deserialize, Serialize};

use crate::types::{AccessToken, Nonce, SessionToken};

/// Session record stored under each state token.
///
/// Created pending by [`begin_login`](super::Authenticator::begin_login),
/// written at most once by the callback, read by
/// [`resolve`](super::Authenticator::resolve).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Nonce sent in the authorization request; the ID token must echo it.
    pub nonce: Nonce,
    /// Set once the code exchange succeeded and the nonce matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
    /// Set when the exchange, verification or nonce check failed.
    #[serde(default)]
    pub conversion_failed: bool,
}

/// Where a session record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState<'a> {
    Pending,
    Succeeded(&'a AccessToken),
    Failed,
}

impl SessionInfo {
    #[must_use]
    pub fn pending(nonce: Nonce) -> Self {
        Self {
            nonce,
            access_token: None,
            conversion_failed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState<'_> {
        if self.conversion_failed {
            return SessionState::Failed;
        }
        match &self.access_token {
            Some(token) if !token.is_empty() => SessionState::Succeeded(token),
            _ => SessionState::Pending,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self.state(), SessionState::Pending)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Authorization URL plus the state token needed to resolve the login later.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LoginRequest {
    /// Identity-provider URL the user's browser must visit.
    pub url: String,
    /// Pass to [`resolve`](super::Authenticator::resolve).
    pub state: SessionToken,
}
