use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Length used for both the OIDC state token and the nonce.
pub const TOKEN_LENGTH: usize = 30;

/// Returns a cryptographically random, URL-safe string of at least `min_len`
/// characters.
///
/// The string is the unpadded base64url encoding of the smallest number of
/// random bytes whose encoding reaches `min_len`.
///
/// # Panics
///
/// Panics if the operating system's secure random source fails. There is no
/// safe fallback for a broken entropy source.
#[must_use]
pub fn crypto_string(min_len: usize) -> String {
    let mut num_bytes = 0;
    while encoded_len(num_bytes) < min_len {
        num_bytes += 1;
    }
    let mut bytes = vec![0u8; num_bytes];
    OsRng
        .try_fill_bytes(&mut bytes)
        .unwrap_or_else(|e| panic!("could not generate secure random bytes: {e}"));
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates an OIDC `state` parameter, which doubles as the session token.
#[must_use]
pub fn generate_state() -> String {
    crypto_string(TOKEN_LENGTH)
}

/// Generates an OIDC `nonce` bound to a single login attempt.
#[must_use]
pub fn generate_nonce() -> String {
    crypto_string(TOKEN_LENGTH)
}

/// Unpadded base64 length of `n` bytes.
const fn encoded_len(n: usize) -> usize {
    (n * 4).div_ceil(3)
}
