//! Coordination core for OIDC authorization-code logins that are started in
//! one process and completed by a browser redirect handled in another.
//!
//! - [`session`]: login initiation, callback exchange and resolution.
//! - [`kv`]: the watchable, transactional store the actors share.
//! - [`oauth`]: the identity-provider capability and its HTTP implementation.

pub mod error;
pub mod kv;
pub mod oauth;
pub mod random;
pub mod session;
#[cfg(feature = "oauth")]
pub mod token;
pub mod types;
pub mod well_known;

// Re-exports for convenient access
pub use error::Error;
pub use kv::{CoordinationStore, MemKv};
#[cfg(feature = "oauth")]
pub use oauth::HttpOidcProvider;
pub use oauth::{CodeExchange, OidcConfig, OidcProvider, UserInfo};
pub use random::{crypto_string, generate_nonce, generate_state};
pub use session::{Authenticator, CallbackResponse, OidcAuthConfig, SessionError};
pub use types::{AccessToken, Nonce, SessionToken};
pub use well_known::ProviderMetadata;
