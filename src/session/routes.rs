use axum::Router;
use axum::extract::{Query, State};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;

use super::callback::CallbackResponse;
use super::state::Authenticator;
use crate::kv::CoordinationStore;
use crate::oauth::OidcProvider;
use crate::types::SessionToken;

/// Router exposing the callback endpoint at the configured callback path.
pub fn callback_routes<P, K>(auth: Authenticator<P, K>) -> Router
where
    P: OidcProvider,
    K: CoordinationStore,
{
    let path = auth.settings().callback_path().to_string();
    Router::new()
        .route(&path, get(callback::<P, K>))
        .with_state(auth)
}

/// Serves `router` on `listener` until the listener fails.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "OIDC callback server listening");
    }
    axum::serve(listener, router).await
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

async fn callback<P: OidcProvider, K: CoordinationStore>(
    State(auth): State<Authenticator<P, K>>,
    Query(params): Query<CallbackParams>,
) -> CallbackResponse {
    let code = params.code.unwrap_or_default();
    let state = params.state.unwrap_or_default();
    let correlation = SessionToken::from(state.as_str());

    // Detached so a dropped browser connection cannot abort the commit
    let task = tokio::spawn(async move { auth.handle_callback(&code, &state).await });
    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(state = %correlation, error = %e, "OIDC callback task failed");
            CallbackResponse::TemporaryError { state: correlation }
        }
    }
}
