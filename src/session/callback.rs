use std::convert::Infallible;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::error::SessionError;
use super::state::Authenticator;
use super::store::UpdateError;
use super::types::{SessionInfo, SessionState};
use crate::kv::CoordinationStore;
use crate::oauth::{CodeExchange, OidcProvider};
use crate::types::SessionToken;

/// The single response produced for one callback request.
///
/// Bodies are generic. The only request-specific detail they carry is the
/// state token, for correlation with operator logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResponse {
    Success { state: SessionToken },
    BadRequest,
    Unauthorized { state: SessionToken },
    NotConfigured,
    TemporaryError { state: SessionToken },
}

impl CallbackResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::NotConfigured => StatusCode::CONFLICT,
            Self::TemporaryError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable body text.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Success { .. } => {
                "You are now logged in. Go back to the terminal to use the CLI.".into()
            }
            Self::BadRequest => {
                "invalid OIDC callback request: missing OIDC state token or authorization code"
                    .into()
            }
            Self::Unauthorized { state } => format!(
                "authorization failed (OIDC state token: {:?}; \
                 server logs may contain more information)",
                state.as_str()
            ),
            Self::NotConfigured => SessionError::NotConfigured.to_string(),
            Self::TemporaryError { state } => format!(
                "temporary error during authorization (OIDC state token: {:?}; \
                 server logs may contain more information)",
                state.as_str()
            ),
        }
    }
}

impl IntoResponse for CallbackResponse {
    fn into_response(self) -> Response {
        (self.status(), self.message()).into_response()
    }
}

/// What the mutator saw on its last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    Credential,
    NonceMismatch,
    ExchangeFailed,
    AlreadyTerminal,
}

impl<P: OidcProvider, K: CoordinationStore> Authenticator<P, K> {
    /// Handles the identity provider's redirect carrying `code` and `state`.
    ///
    /// Exchanges the code, then checks the returned nonce against the
    /// session record and records the outcome in the same transaction. A
    /// record that is already terminal is left as is and the response
    /// reports its committed outcome, so duplicate redirects cannot flip it.
    ///
    /// Exactly one response is produced. Failure detail is logged with the
    /// state token; the authorization code and access token never are.
    pub async fn handle_callback(&self, code: &str, state: &str) -> CallbackResponse {
        let provider = match self.provider().await {
            Ok(provider) => provider,
            Err(_) => {
                tracing::warn!("OIDC callback received but no ID provider is configured");
                return CallbackResponse::NotConfigured;
            }
        };
        if code.is_empty() || state.is_empty() {
            tracing::warn!(
                has_code = !code.is_empty(),
                has_state = !state.is_empty(),
                "invalid OIDC callback request"
            );
            return CallbackResponse::BadRequest;
        }
        let state = SessionToken::from(state);

        let exchange = provider.exchange_code(code).await;
        if let Err(e) = &exchange {
            tracing::error!(
                provider = %provider.name(),
                state = %state,
                error = %e,
                "OIDC code exchange failed"
            );
        }
        let exchanged: Option<&CodeExchange> = exchange.as_ref().ok();

        let mut commit = Commit::ExchangeFailed;
        let result = self
            .store
            .transactional_update(&state, |info: &mut SessionInfo| {
                commit = record_outcome(info, exchanged);
                Ok::<_, Infallible>(())
            })
            .await;

        match result {
            Ok(committed) => respond_committed(state, &committed, commit, exchanged),
            Err(UpdateError::Rejected(never)) => match never {},
            Err(UpdateError::Session(SessionError::SessionExpired)) => {
                tracing::warn!(state = %state, "OIDC callback for unknown or expired state token");
                CallbackResponse::Unauthorized { state }
            }
            Err(UpdateError::Session(e)) => {
                tracing::error!(state = %state, error = %e, "could not record OIDC login outcome");
                if exchange.is_err() {
                    CallbackResponse::Unauthorized { state }
                } else {
                    CallbackResponse::TemporaryError { state }
                }
            }
        }
    }
}

fn respond_committed(
    state: SessionToken,
    committed: &SessionInfo,
    commit: Commit,
    exchanged: Option<&CodeExchange>,
) -> CallbackResponse {
    match commit {
        Commit::Credential => {
            tracing::info!(state = %state, nonce = %committed.nonce, "OIDC login succeeded");
        }
        Commit::NonceMismatch => {
            tracing::error!(
                state = %state,
                expected_nonce = %committed.nonce,
                received_nonce = %exchanged.map(|ex| ex.nonce.as_str()).unwrap_or_default(),
                "OIDC nonce mismatch"
            );
        }
        Commit::ExchangeFailed => {
            tracing::warn!(state = %state, "OIDC login marked failed");
        }
        Commit::AlreadyTerminal => {
            tracing::warn!(
                state = %state,
                exchange_ok = exchanged.is_some(),
                "duplicate OIDC callback; keeping committed outcome"
            );
        }
    }

    match committed.state() {
        SessionState::Succeeded(_) => CallbackResponse::Success { state },
        SessionState::Failed => CallbackResponse::Unauthorized { state },
        SessionState::Pending => {
            tracing::error!(state = %state, "OIDC session still pending after commit");
            CallbackResponse::TemporaryError { state }
        }
    }
}

/// Applies an exchange result to a session record.
///
/// Terminal records are never modified, so running this twice on the same
/// record yields the same outcome.
fn record_outcome(info: &mut SessionInfo, exchanged: Option<&CodeExchange>) -> Commit {
    if info.is_terminal() {
        return Commit::AlreadyTerminal;
    }
    match exchanged {
        Some(ex) if ex.nonce == info.nonce => {
            info.access_token = Some(ex.access_token.clone());
            Commit::Credential
        }
        Some(_) => {
            info.conversion_failed = true;
            Commit::NonceMismatch
        }
        None => {
            info.conversion_failed = true;
            Commit::ExchangeFailed
        }
    }
}
