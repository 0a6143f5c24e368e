//! PKCE (RFC 7636) verifier/challenge generation and anti-forgery state

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::{MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH};
use crate::{Error, Result};

/// Default verifier length in characters
pub const DEFAULT_VERIFIER_LENGTH: usize = 96;

/// Generate a code verifier of exactly `length` characters.
///
/// Draws `length` random bytes, base64url-encodes them (no padding) and
/// truncates, so the result only contains `A-Z a-z 0-9 - _`.
pub fn generate_verifier(length: usize) -> Result<String> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(Error::Config(format!(
            "PKCE verifier length must be within {MIN_VERIFIER_LENGTH}..={MAX_VERIFIER_LENGTH}, got {length}"
        )));
    }

    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);
    let mut verifier = URL_SAFE_NO_PAD.encode(&bytes);
    verifier.truncate(length);
    Ok(verifier)
}

/// S256 challenge: base64url(SHA-256(verifier)) without padding
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let digest = hasher.finalize();
    URL_SAFE_NO_PAD.encode(digest)
}

/// Fresh random state parameter for one login attempt
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
