use super::backoff::{RetryError, retry_notify};
use super::error::SessionError;
use super::state::Authenticator;
use super::types::{SessionInfo, SessionState};
use crate::kv::{CoordinationStore, WatchEvent, Watcher};
use crate::oauth::{OidcProvider, UserInfo};
use crate::types::{AccessToken, SessionToken};

impl<P: OidcProvider, K: CoordinationStore> Authenticator<P, K> {
    /// Blocks until the login identified by `state` completes, then returns
    /// the user's identity.
    ///
    /// Dropped watches are re-established under the configured backoff
    /// policy. Dropping the returned future releases any open watch.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConfigured`] if no provider is set.
    /// - [`SessionError::SessionExpired`] if the record vanished first.
    /// - [`SessionError::AuthorizationFailed`] if the callback recorded a failure.
    /// - [`SessionError::StoreUnavailable`] if the retry budget ran out.
    /// - [`SessionError::IdentityFetch`] if the final userinfo lookup failed.
    pub async fn resolve(&self, state: &SessionToken) -> Result<UserInfo, SessionError> {
        let provider = self.provider().await?;

        let access_token = retry_notify(
            &self.settings.backoff,
            || self.await_outcome(state),
            |e, delay| {
                tracing::warn!(
                    state = %state,
                    error = %e,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying OIDC session watch"
                );
            },
        )
        .await
        .map_err(|e| match e {
            SessionError::WatchTransport(detail) => SessionError::StoreUnavailable(detail),
            other => other,
        })
        .inspect_err(|e| {
            tracing::warn!(state = %state, error = %e, "OIDC login did not complete");
        })?;

        if let Err(e) = self.store.delete(state).await {
            tracing::warn!(state = %state, error = %e, "could not delete consumed OIDC session");
        }

        let user = provider
            .user_info(&access_token)
            .await
            .map_err(SessionError::IdentityFetch)
            .inspect_err(|e| {
                tracing::error!(state = %state, error = %e, "OIDC user info lookup failed");
            })?;

        tracing::info!(
            provider = %provider.name(),
            state = %state,
            subject = %user.sub,
            email = user.email.as_deref().unwrap_or_default(),
            "OIDC login resolved"
        );
        Ok(user)
    }

    /// One watch attempt: consume events until the record turns terminal,
    /// vanishes or the watch breaks.
    async fn await_outcome(
        &self,
        state: &SessionToken,
    ) -> Result<AccessToken, RetryError<SessionError>> {
        let mut watcher = self
            .store
            .watch(state)
            .await
            .map_err(RetryError::Transient)?;
        let outcome = next_outcome(&mut watcher).await;
        watcher.close();
        outcome
    }
}

async fn next_outcome(watcher: &mut Watcher) -> Result<AccessToken, RetryError<SessionError>> {
    while let Some(event) = watcher.next().await {
        match event {
            WatchEvent::Put(bytes) => {
                let info = SessionInfo::decode(&bytes).map_err(|e| {
                    RetryError::Transient(SessionError::StoreUnavailable(format!(
                        "corrupt session record: {e}"
                    )))
                })?;
                match info.state() {
                    SessionState::Succeeded(token) => return Ok(token.clone()),
                    SessionState::Failed => {
                        return Err(RetryError::Permanent(SessionError::AuthorizationFailed));
                    }
                    SessionState::Pending => {}
                }
            }
            WatchEvent::Delete => return Err(RetryError::Permanent(SessionError::SessionExpired)),
            WatchEvent::Error(reason) => {
                return Err(RetryError::Transient(SessionError::WatchTransport(reason)));
            }
        }
    }
    Err(RetryError::Transient(SessionError::WatchTransport(
        format!("watch on {} closed", watcher.key()),
    )))
}
