use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::types::{AccessToken, Nonce, SessionToken};

/// OIDC client registration with the identity provider.
///
/// Required fields are constructor parameters, so there are no runtime "missing field" errors.
///
/// ```rust,ignore
/// use oidc_handoff::OidcConfig;
///
/// let config = OidcConfig::new(
///     "https://idp.example.com".parse()?,
///     "my-client-id",
///     "my-client-secret",
///     "https://my-app.com/authorization-code/callback".parse()?,
/// )
/// .with_name("okta");
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct OidcConfig {
    pub(crate) name: String,
    pub(crate) issuer: Url,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
}

impl OidcConfig {
    /// Create a new OIDC client configuration.
    #[must_use]
    pub fn new(
        issuer: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            name: "oidc".into(),
            issuer,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            // "openid" is mandatory for OIDC; "profile" and "email" make the
            // email address available as the user identifier.
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
        }
    }

    /// Name under which this identity provider is known (log prefix).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the requested scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("name", &self.name)
            .field("issuer", &self.issuer.as_str())
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Result of a successful code exchange.
///
/// The ID token's signature, issuer and audience have been verified; the
/// nonce has not, because only the session record knows the expected value.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CodeExchange {
    /// Nonce embedded in the ID token (empty if the provider sent none).
    pub nonce: Nonce,
    pub access_token: AccessToken,
}

impl CodeExchange {
    #[must_use]
    pub fn new(nonce: Nonce, access_token: AccessToken) -> Self {
        Self {
            nonce,
            access_token,
        }
    }
}

/// User info from the provider's userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
}

impl UserInfo {
    /// Create a new `UserInfo` with only the required `sub` field.
    #[must_use]
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            email: None,
            email_verified: None,
            name: None,
        }
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the email_verified flag.
    #[must_use]
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = Some(verified);
        self
    }
}

/// The identity-provider operations the session flow consumes.
///
/// [`HttpOidcProvider`] talks to a real provider; tests substitute a fake.
pub trait OidcProvider: Send + Sync + 'static {
    /// Provider name, used as a log prefix.
    fn name(&self) -> &str;

    /// Authorization URL carrying `state` and `nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the provider's endpoint is not a valid URL.
    fn authorization_url(&self, state: &SessionToken, nonce: &Nonce) -> Result<String, Error>;

    /// Exchanges an authorization code and verifies the returned ID token.
    fn exchange_code(&self, code: &str) -> impl Future<Output = Result<CodeExchange, Error>> + Send;

    /// Fetches the user's profile with a bearer credential.
    fn user_info(
        &self,
        access_token: &AccessToken,
    ) -> impl Future<Output = Result<UserInfo, Error>> + Send;
}

#[cfg(feature = "oauth")]
pub use http::HttpOidcProvider;

#[cfg(feature = "oauth")]
mod http {
    use jsonwebtoken::jwk::JwkSet;
    use serde::Deserialize;
    use tokio::sync::RwLock;

    use super::{CodeExchange, OidcConfig, OidcProvider, UserInfo};
    use crate::error::Error;
    use crate::token;
    use crate::types::{AccessToken, Nonce, SessionToken};
    use crate::well_known::{self, ProviderMetadata};

    /// Token response from the provider's token endpoint.
    #[derive(Deserialize)]
    struct TokenResponse {
        access_token: String,
        #[serde(default)]
        id_token: Option<String>,
    }

    /// OIDC provider reached over HTTP.
    pub struct HttpOidcProvider {
        config: OidcConfig,
        metadata: ProviderMetadata,
        http: reqwest::Client,
        jwks: RwLock<Option<JwkSet>>,
    }

    impl HttpOidcProvider {
        /// Discover the provider's endpoints from its issuer URL.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Http`] on network failure, or [`Error::Discovery`]
        /// if the document is unavailable or advertises a different issuer.
        pub async fn discover(config: OidcConfig) -> Result<Self, Error> {
            let http = reqwest::Client::new();
            let url = well_known::discovery_url(config.issuer.as_str());
            let response = http.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(Error::Discovery(format!(
                    "{url} returned {}",
                    response.status().as_u16()
                )));
            }
            let metadata: ProviderMetadata = response
                .json()
                .await
                .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))?;
            if !well_known::issuer_matches(config.issuer.as_str(), &metadata.issuer) {
                return Err(Error::Discovery(format!(
                    "issuer mismatch: configured {}, advertised {}",
                    config.issuer, metadata.issuer
                )));
            }
            let unadvertised = metadata.unadvertised_scopes(&config.scopes);
            if !unadvertised.is_empty() {
                tracing::warn!(
                    provider = %config.name,
                    scopes = ?unadvertised,
                    "requested scopes are not advertised by the provider"
                );
            }
            Ok(Self::with_metadata(config, metadata).with_http_client(http))
        }

        /// Use known endpoints instead of discovery.
        #[must_use]
        pub fn with_metadata(config: OidcConfig, metadata: ProviderMetadata) -> Self {
            Self {
                config,
                metadata,
                http: reqwest::Client::new(),
                jwks: RwLock::new(None),
            }
        }

        /// Use a custom HTTP client (for connection pool reuse or testing).
        #[must_use]
        pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
            self.http = client;
            self
        }

        #[must_use]
        pub fn config(&self) -> &OidcConfig {
            &self.config
        }

        #[must_use]
        pub fn metadata(&self) -> &ProviderMetadata {
            &self.metadata
        }

        async fn request_tokens(&self, code: &str) -> Result<TokenResponse, Error> {
            let params = [
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ];

            let response = self
                .http
                .post(&self.metadata.token_endpoint)
                .form(&params)
                .send()
                .await?;

            let response = Self::ensure_success(response, "token exchange").await?;
            response.json::<TokenResponse>().await.map_err(Into::into)
        }

        /// Cached JWKS, refetched once when `kid` is unknown (key rotation).
        async fn verify(&self, id_token: &str) -> Result<token::IdTokenClaims, Error> {
            let kid = token::extract_kid(id_token)?;
            {
                let cached = self.jwks.read().await;
                let usable = cached
                    .as_ref()
                    .filter(|jwks| token::has_key(jwks, kid.as_deref()));
                if let Some(jwks) = usable {
                    return self.verify_with(jwks, id_token);
                }
            }

            tracing::debug!(
                provider = %self.config.name,
                kid = ?kid,
                "fetching OIDC signing keys"
            );
            let jwks = self.fetch_jwks().await?;
            let claims = self.verify_with(&jwks, id_token);
            *self.jwks.write().await = Some(jwks);
            claims
        }

        fn verify_with(
            &self,
            jwks: &JwkSet,
            id_token: &str,
        ) -> Result<token::IdTokenClaims, Error> {
            token::verify_id_token(
                jwks,
                id_token,
                &self.metadata.issuer,
                &self.config.client_id,
                &self.metadata.id_token_signing_alg_values_supported,
            )
        }

        async fn fetch_jwks(&self) -> Result<JwkSet, Error> {
            let response = self.http.get(&self.metadata.jwks_uri).send().await?;
            let response = Self::ensure_success(response, "jwks fetch").await?;
            response.json::<JwkSet>().await.map_err(Into::into)
        }

        /// Checks HTTP response status; returns the response on success or an error with details.
        async fn ensure_success(
            response: reqwest::Response,
            operation: &'static str,
        ) -> Result<reqwest::Response, Error> {
            if response.status().is_success() {
                return Ok(response);
            }
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(Error::OAuth {
                operation,
                status: Some(status),
                detail: body,
            })
        }
    }

    impl OidcProvider for HttpOidcProvider {
        fn name(&self) -> &str {
            &self.config.name
        }

        fn authorization_url(&self, state: &SessionToken, nonce: &Nonce) -> Result<String, Error> {
            let mut url = url::Url::parse(&self.metadata.authorization_endpoint)
                .map_err(|e| Error::Config(format!("authorization endpoint: {e}")))?;
            let scope = self.config.scopes.join(" ");
            url.query_pairs_mut()
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("scope", &scope)
                .append_pair("state", state.as_str())
                .append_pair("nonce", nonce.as_str());
            Ok(url.into())
        }

        async fn exchange_code(&self, code: &str) -> Result<CodeExchange, Error> {
            let tokens = self.request_tokens(code).await?;
            let id_token = tokens
                .id_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| Error::Token("missing id token".into()))?;
            let claims = self.verify(&id_token).await?;
            tracing::debug!(
                provider = %self.config.name,
                subject = claims.subject().unwrap_or_default(),
                "verified OIDC ID token"
            );
            let nonce = Nonce::from(claims.nonce().unwrap_or_default().to_string());
            Ok(CodeExchange::new(nonce, AccessToken::new(tokens.access_token)))
        }

        async fn user_info(&self, access_token: &AccessToken) -> Result<UserInfo, Error> {
            let endpoint = self.metadata.userinfo_endpoint.as_deref().ok_or_else(|| {
                Error::Discovery("provider advertises no userinfo endpoint".into())
            })?;
            let response = self
                .http
                .get(endpoint)
                .bearer_auth(access_token.secret())
                .send()
                .await?;

            let response = Self::ensure_success(response, "userinfo request").await?;
            response.json::<UserInfo>().await.map_err(Into::into)
        }
    }

}
