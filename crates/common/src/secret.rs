//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate and adds
//! [`SharedSecret`], the verifier used for the process-wide ingest credential.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to log via `{:?}` or tracing fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{SecretString, SharedSecret};
//!
//! let secret = SharedSecret::new(&SecretString::from("dev-secret")).unwrap();
//!
//! assert!(secret.verify("dev-secret"));
//! assert!(!secret.verify("dev-secre"));
//! ```
//!
//! # Limitations
//!
//! `SharedSecret` answers only "does the caller know the shared secret". It
//! carries no per-user identity and no expiry.

use ring::error::Unspecified;
use ring::hmac;
use ring::rand::SystemRandom;
use std::fmt;

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretString};

/// A shared secret that can only be compared, never read back.
///
/// At construction a random per-process HMAC key is generated and the secret
/// is reduced to its tag. Verification signs the candidate with the same key
/// and checks the tags with `hmac::verify`, which compares in constant time.
/// The plaintext is not retained.
pub struct SharedSecret {
    key: hmac::Key,
    tag: hmac::Tag,
}

impl SharedSecret {
    /// Build a verifier for `secret`.
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source is unavailable.
    pub fn new(secret: &SecretString) -> Result<Self, Unspecified> {
        let rng = SystemRandom::new();
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &rng)?;
        let tag = hmac::sign(&key, secret.expose_secret().as_bytes());
        Ok(Self { key, tag })
    }

    /// Check whether `candidate` equals the configured secret.
    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        hmac::verify(&self.key, candidate.as_bytes(), self.tag.as_ref()).is_ok()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("tag", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct IngestCredentials {
            publisher: String,
            token: SecretString,
        }

        let json = r#"{"publisher": "p1", "token": "my-secret-value"}"#;
        let creds: IngestCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.token.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_shared_secret_accepts_exact_match() {
        let secret = SharedSecret::new(&SecretString::from("dev-secret")).unwrap();
        assert!(secret.verify("dev-secret"));
    }

    #[test]
    fn test_shared_secret_rejects_mismatch() {
        let secret = SharedSecret::new(&SecretString::from("dev-secret")).unwrap();

        assert!(!secret.verify(""));
        assert!(!secret.verify("dev-secret "));
        assert!(!secret.verify("DEV-SECRET"));
        assert!(!secret.verify("dev-secret-but-longer"));
        assert!(!secret.verify("dev"));
    }

    #[test]
    fn test_shared_secret_keys_are_per_instance() {
        // Two verifiers for the same secret agree on the answer even though
        // their internal keys differ.
        let a = SharedSecret::new(&SecretString::from("s3cret")).unwrap();
        let b = SharedSecret::new(&SecretString::from("s3cret")).unwrap();

        assert!(a.verify("s3cret"));
        assert!(b.verify("s3cret"));
        assert_ne!(a.tag.as_ref(), b.tag.as_ref());
    }

    #[test]
    fn test_shared_secret_debug_is_redacted() {
        let secret = SharedSecret::new(&SecretString::from("visible?")).unwrap();
        let debug = format!("{secret:?}");

        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("visible?"));
    }
}
