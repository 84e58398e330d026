//! Login-session coordination for the OIDC authorization-code flow.
//!
//! Three actors share nothing but a [`CoordinationStore`](crate::kv::CoordinationStore):
//!
//! 1. [`Authenticator::begin_login`] stores a pending record under a fresh
//!    state token and returns the provider's authorization URL.
//! 2. The provider redirects the browser to the endpoint mounted by
//!    [`callback_routes`], which exchanges the code and commits the outcome
//!    with [`Authenticator::handle_callback`].
//! 3. [`Authenticator::resolve`] watches the record until it turns terminal
//!    and returns the user's identity.
//!
//! ```rust,ignore
//! use oidc_handoff::kv::MemKv;
//! use oidc_handoff::session::{Authenticator, OidcAuthConfig, callback_routes, serve};
//!
//! let config = OidcAuthConfig::from_env()?;
//! let provider = config.discover().await?;
//! let auth = Authenticator::new(MemKv::new(), config.settings()).with_provider(provider);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! tokio::spawn(serve(listener, callback_routes(auth.clone())));
//!
//! let login = auth.begin_login().await?;
//! println!("Open {} to log in", login.url);
//! let user = auth.resolve(&login.state).await?;
//! ```

mod backoff;
mod callback;
mod config;
mod error;
mod login;
mod routes;
mod state;
mod store;
mod types;
mod waiter;

pub use backoff::{BackoffPolicy, RetryError, retry_notify};
pub use callback::CallbackResponse;
pub use config::{DEFAULT_CALLBACK_PATH, DEFAULT_SESSION_TTL, OidcAuthConfig, SessionSettings};
pub use error::SessionError;
pub use routes::{callback_routes, serve};
pub use state::Authenticator;
pub use store::{SESSION_PREFIX, SessionStore, UpdateError};
pub use types::{LoginRequest, SessionInfo, SessionState};
