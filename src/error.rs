/// Errors talking to the OIDC identity provider.
///
/// These carry full diagnostic detail and are meant for operator logs; the
/// session layer maps them to generic outcomes before anything reaches a
/// network caller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("OAuth2 {operation} failed (status {status:?}): {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "oauth")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token verification error: {0}")]
    Token(String),
    #[error("Provider discovery error: {0}")]
    Discovery(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
