//! PKCE (RFC 7636) verifier/challenge generation.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// PKCE code verifier and S256 challenge.
#[derive(Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl fmt::Debug for Pkce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"***")
            .field("challenge", &self.challenge)
            .finish()
    }
}

impl Pkce {
    pub const METHOD: &str = "S256";

    /// Builds the pair for a known verifier.
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Generates a fresh PKCE verifier and challenge.
pub fn generate_pkce() -> Pkce {
    // Two v4 UUIDs give 32 random bytes.
    let uuid1 = uuid::Uuid::new_v4();
    let uuid2 = uuid::Uuid::new_v4();
    let mut verifier_bytes = [0u8; 32];
    verifier_bytes[..16].copy_from_slice(uuid1.as_bytes());
    verifier_bytes[16..].copy_from_slice(uuid2.as_bytes());

    Pkce::from_verifier(URL_SAFE_NO_PAD.encode(verifier_bytes))
}

/// Generates the anti-forgery `state` value for one authorization attempt.
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
