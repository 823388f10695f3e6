//! PKCE (RFC 7636) S256 challenge verification and token entropy

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Compute the S256 code challenge for a verifier
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Verify a code verifier against a stored S256 challenge
pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    s256_challenge(verifier) == challenge
}

/// Generate `bytes` of entropy, base64url-encoded without padding.
/// Used for client secrets, authorization codes, and access tokens.
pub fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

        assert_eq!(s256_challenge(verifier), challenge);
        assert!(verify_s256(verifier, challenge));
    }

    #[test]
    fn test_single_character_mutation_fails() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = s256_challenge(verifier);

        let mutated = format!("e{}", &verifier[1..]);
        assert!(!verify_s256(&mutated, &challenge));
    }

    #[test]
    fn test_random_urlsafe_entropy() {
        let a = random_urlsafe(32);
        let b = random_urlsafe(32);

        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }
}
