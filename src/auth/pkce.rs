//! PKCE (Proof Key for Code Exchange) for the authorization request
//!
//! Implements the S256 method of RFC 7636: the challenge goes out with the
//! browser URL, the verifier with the code exchange.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the code verifier (must be 43-128 characters)
const CODE_VERIFIER_LENGTH: usize = 64;

/// Unreserved URI characters allowed in a verifier
const VERIFIER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const CHALLENGE_METHOD: &str = "S256";

/// Verifier kept locally and the challenge derived from it
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let verifier: String = (0..CODE_VERIFIER_LENGTH)
            .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
            .collect();
        Self::from_verifier(verifier)
    }

    /// Derive the challenge: BASE64URL(SHA256(verifier))
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

impl Default for PkcePair {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let pair = PkcePair::new();
        assert_eq!(pair.verifier.len(), CODE_VERIFIER_LENGTH);
        let charset = std::str::from_utf8(VERIFIER_CHARSET).unwrap();
        assert!(pair.verifier.chars().all(|c| charset.contains(c)));
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let pair = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_verifiers_are_unique() {
        assert_ne!(PkcePair::new().verifier, PkcePair::new().verifier);
    }
}
