use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Verified claims from an OIDC ID token.
#[derive(Debug, Clone)]
pub struct IdTokenClaims {
    inner: JsonValue,
}

impl IdTokenClaims {
    /// Subject (`sub`) claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Nonce echoed back by the provider, if any.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get_str("nonce")
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(JsonValue::as_str)
    }
}

/// Extracts the key ID from an ID token header without verifying anything.
///
/// # Errors
///
/// Returns `Error::Token` if the header cannot be decoded.
pub fn extract_kid(id_token: &str) -> Result<Option<String>, Error> {
    let header =
        decode_header(id_token).map_err(|e| Error::Token(format!("invalid header: {e}")))?;
    Ok(header.kid)
}

/// Whether `jwks` can verify a token signed with `kid`.
#[must_use]
pub fn has_key(jwks: &JwkSet, kid: Option<&str>) -> bool {
    select_jwk(&jwks.keys, kid).is_ok()
}

/// Verifies an ID token's signature and standard claims.
///
/// Checks the signature against `jwks`, then `iss` against `expected_issuer`,
/// `aud` against `client_id`, and `exp`. When `advertised_algs` is not
/// empty, the header's algorithm must be one of them. The nonce is *not*
/// checked here: it can only be compared against the session record inside
/// the store transaction.
///
/// # Errors
///
/// Returns `Error::Token` if the token is malformed, signed with an
/// unsupported or unadvertised algorithm or unknown key, or fails claim
/// validation.
pub fn verify_id_token(
    jwks: &JwkSet,
    id_token: &str,
    expected_issuer: &str,
    client_id: &str,
    advertised_algs: &[String],
) -> Result<IdTokenClaims, Error> {
    let header =
        decode_header(id_token).map_err(|e| Error::Token(format!("invalid header: {e}")))?;
    if !is_supported_alg(header.alg) {
        return Err(Error::Token(format!(
            "unsupported signing algorithm: {:?}",
            header.alg
        )));
    }
    if !is_advertised_alg(advertised_algs, header.alg) {
        return Err(Error::Token(format!(
            "signing algorithm {:?} not advertised by the provider",
            header.alg
        )));
    }

    let jwk = select_jwk(&jwks.keys, header.kid.as_deref())?;
    let key = DecodingKey::from_jwk(jwk).map_err(|e| Error::Token(format!("invalid jwk: {e}")))?;

    let mut validation = Validation::new(header.alg);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    validation.set_issuer(&[expected_issuer]);
    validation.set_audience(&[client_id]);

    let data = decode::<JsonValue>(id_token, &key, &validation)
        .map_err(|e| Error::Token(format!("could not verify token: {e}")))?;

    Ok(IdTokenClaims {
        inner: data.claims,
    })
}

fn select_jwk<'a>(keys: &'a [Jwk], kid: Option<&str>) -> Result<&'a Jwk, Error> {
    match kid {
        Some(kid) => keys
            .iter()
            .find(|key| key.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| Error::Token(format!("no jwk with kid {kid}"))),
        None if keys.len() == 1 => Ok(&keys[0]),
        None => Err(Error::Token("token missing kid".into())),
    }
}

fn is_advertised_alg(advertised: &[String], alg: Algorithm) -> bool {
    advertised.is_empty()
        || advertised
            .iter()
            .any(|name| name.parse::<Algorithm>().is_ok_and(|a| a == alg))
}

fn is_supported_alg(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
            | Algorithm::EdDSA
    )
}
