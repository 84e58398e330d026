use super::error::SessionError;
use super::state::Authenticator;
use super::types::LoginRequest;
use crate::kv::CoordinationStore;
use crate::oauth::OidcProvider;
use crate::types::{Nonce, SessionToken};

impl<P: OidcProvider, K: CoordinationStore> Authenticator<P, K> {
    /// Start a login: register a pending session and return the provider's
    /// authorization URL.
    ///
    /// The returned state token is what [`resolve`](Self::resolve) needs.
    /// An abandoned login disappears from the store after the configured
    /// session TTL.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConfigured`] if no provider is set.
    /// - [`SessionError::Config`] if the provider cannot build the URL.
    /// - [`SessionError::StoreUnavailable`] if the session cannot be stored.
    ///
    /// Nothing is left in the store on any of these failures.
    pub async fn begin_login(&self) -> Result<LoginRequest, SessionError> {
        let provider = self.provider().await?;

        let state = SessionToken::generate();
        let nonce = Nonce::generate();

        // Build the URL before storing, so a bad provider leaves no record
        let url = provider
            .authorization_url(&state, &nonce)
            .map_err(|e| SessionError::Config(e.to_string()))?;

        self.store
            .create_pending(&state, &nonce, self.settings.session_ttl)
            .await
            .inspect_err(|e| {
                tracing::error!(state = %state, error = %e, "could not create OIDC login session");
            })?;

        tracing::info!(
            provider = %provider.name(),
            state = %state,
            ttl_secs = self.settings.session_ttl.as_secs(),
            "created OIDC login session"
        );

        Ok(LoginRequest { url, state })
    }
}
