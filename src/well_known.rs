use serde::{Deserialize, Serialize};

/// Path appended to the issuer URL to find the discovery document.
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Subset of the OpenID Provider metadata document this crate relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Build metadata by hand, for providers without a discovery endpoint.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        jwks_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            jwks_uri: jwks_uri.into(),
            userinfo_endpoint: None,
            scopes_supported: Vec::new(),
            id_token_signing_alg_values_supported: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Requested scopes missing from `scopes_supported`.
    ///
    /// Providers that advertise no scopes are assumed to accept any.
    #[must_use]
    pub fn unadvertised_scopes<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        if self.scopes_supported.is_empty() {
            return Vec::new();
        }
        requested
            .iter()
            .filter(|scope| !self.scopes_supported.contains(scope))
            .map(String::as_str)
            .collect()
    }
}

/// Discovery URL for an issuer, tolerating a trailing slash.
#[must_use]
pub fn discovery_url(issuer: &str) -> String {
    format!("{}/{DISCOVERY_PATH}", issuer.trim_end_matches('/'))
}

/// Issuers compare equal modulo a trailing slash.
#[must_use]
pub fn issuer_matches(expected: &str, advertised: &str) -> bool {
    expected.trim_end_matches('/') == advertised.trim_end_matches('/')
}
