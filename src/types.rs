use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// OIDC `state` parameter identifying one login attempt.
///
/// Doubles as the key of the session record in the coordination store, so the
/// process that started the login can later resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    /// Generates a fresh, unguessable session token.
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::random::generate_state())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Replay-protection value embedded in the authorization request and echoed
/// back inside the signed ID token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Nonce(pub String);

impl Nonce {
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::random::generate_nonce())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Bearer credential issued by the identity provider.
///
/// Deliberately has no `Display` impl and a redacting `Debug` impl, so it
/// cannot end up in a log line through `%` or `?` formatting.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw credential, for building an `Authorization` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}
