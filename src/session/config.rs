use std::time::Duration;

use url::Url;

use super::backoff::BackoffPolicy;
use super::error::SessionError;
use crate::oauth::OidcConfig;

/// How long an unfinished login stays in the coordination store.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3 * 60);

/// Path the identity provider redirects the browser to.
pub const DEFAULT_CALLBACK_PATH: &str = "/authorization-code/callback";

/// Runtime settings of the session flow.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub(crate) session_ttl: Duration,
    pub(crate) callback_path: String,
    pub(crate) backoff: BackoffPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            callback_path: DEFAULT_CALLBACK_PATH.into(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl SessionSettings {
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Route path of the callback endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the path is not one axum can
    /// mount: it must start with `/` and contain no query, fragment,
    /// whitespace or route parameters.
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Result<Self, SessionError> {
        let path = path.into();
        validate_callback_path(&path)?;
        self.callback_path = path;
        Ok(self)
    }

    /// Retry policy for re-establishing dropped watches in `resolve`.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    #[must_use]
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

fn validate_callback_path(path: &str) -> Result<(), SessionError> {
    if !path.starts_with('/') {
        return Err(SessionError::Config(format!(
            "callback path {path:?} must start with '/'"
        )));
    }
    if path.contains(['?', '#', '{', '}', '*']) || path.contains(char::is_whitespace) {
        return Err(SessionError::Config(format!(
            "callback path {path:?} must be a plain path"
        )));
    }
    if path.split('/').any(|segment| segment.starts_with(':')) {
        return Err(SessionError::Config(format!(
            "callback path {path:?} must not contain route parameters"
        )));
    }
    Ok(())
}

/// Identity-provider registration plus session settings.
///
/// Use [`from_env()`](OidcAuthConfig::from_env) for convention-based setup,
/// or [`new()`](OidcAuthConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct OidcAuthConfig {
    pub(super) oidc: OidcConfig,
    pub(super) settings: SessionSettings,
}

impl OidcAuthConfig {
    /// Create config with the required provider registration.
    #[must_use]
    pub fn new(oidc: OidcConfig) -> Self {
        Self {
            oidc,
            settings: SessionSettings::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_ISSUER`: issuer URL of the identity provider
    /// - `OIDC_CLIENT_ID`: client ID registered with the provider
    /// - `OIDC_CLIENT_SECRET`: shared secret for the code exchange
    /// - `OIDC_REDIRECT_URI`: callback URL the provider redirects to
    ///
    /// # Optional env vars
    /// - `OIDC_PROVIDER_NAME`: name used in logs
    /// - `OIDC_SCOPES`: comma-separated scopes
    /// - `OIDC_SESSION_TTL_SECS`: lifetime of an unfinished login
    /// - `OIDC_CALLBACK_PATH`: route path of the callback endpoint
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if required env vars are missing or invalid.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SessionError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SessionError::Config(format!("{key} is required")))
        };
        let parse_url = |key: &str, value: String| -> Result<Url, SessionError> {
            value
                .parse()
                .map_err(|e| SessionError::Config(format!("{key}: {e}")))
        };

        let issuer = parse_url("OIDC_ISSUER", required("OIDC_ISSUER")?)?;
        let client_id = required("OIDC_CLIENT_ID")?;
        let client_secret = required("OIDC_CLIENT_SECRET")?;
        let redirect_uri = parse_url("OIDC_REDIRECT_URI", required("OIDC_REDIRECT_URI")?)?;

        let mut oidc = OidcConfig::new(issuer, client_id, client_secret, redirect_uri);
        if let Some(name) = lookup("OIDC_PROVIDER_NAME") {
            oidc = oidc.with_name(name);
        }
        if let Some(scopes) = lookup("OIDC_SCOPES") {
            oidc = oidc.with_scopes(scopes.split(',').map(|s| s.trim().to_string()).collect());
        }

        let mut config = Self::new(oidc);
        if let Some(ttl) = lookup("OIDC_SESSION_TTL_SECS") {
            let secs: u64 = ttl
                .parse()
                .map_err(|e| SessionError::Config(format!("OIDC_SESSION_TTL_SECS: {e}")))?;
            config = config.with_session_ttl(Duration::from_secs(secs));
        }
        if let Some(path) = lookup("OIDC_CALLBACK_PATH") {
            config = config
                .with_callback_path(path)
                .map_err(|e| SessionError::Config(format!("OIDC_CALLBACK_PATH: {e}")))?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings = self.settings.with_session_ttl(ttl);
        self
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for a path that cannot be routed.
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Result<Self, SessionError> {
        self.settings = self.settings.with_callback_path(path)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.settings = self.settings.with_backoff(backoff);
        self
    }

    #[must_use]
    pub fn oidc(&self) -> &OidcConfig {
        &self.oidc
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings.clone()
    }

    /// Discover the configured provider over HTTP.
    ///
    /// # Errors
    ///
    /// Returns the discovery failure (network, bad document, issuer mismatch).
    #[cfg(feature = "oauth")]
    pub async fn discover(&self) -> Result<crate::oauth::HttpOidcProvider, crate::error::Error> {
        crate::oauth::HttpOidcProvider::discover(self.oidc.clone()).await
    }
}
