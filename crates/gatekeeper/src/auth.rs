//! Request authentication.
//!
//! The engine calls the [`Authenticator`] hook and acts on the outcome
//! only; the default implementation verifies H.235 password tokens with
//! HMAC-SHA256 over the canonical signing payload, compared in constant
//! time.

use common::secret::{ExposeSecret, SecretString};
use ras_protocol::{CryptoToken, SequenceNumber};
use ring::hmac;
use std::collections::HashMap;
use tracing::debug;

/// Authentication state of an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No verification attempted (none required).
    Unknown,
    Failed,
    Authenticated,
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// At least one token verified.
    Authenticated,
    /// Tokens were present but none verified.
    Rejected,
    /// The request carried no tokens.
    NoCredentials,
}

/// Verification hook for crypto tokens.
pub trait Authenticator: Send + Sync {
    fn verify(&self, seq: SequenceNumber, tokens: &[CryptoToken]) -> AuthDecision;
}

/// Verifies tokens against a per-alias password store.
pub struct PasswordAuthenticator {
    passwords: HashMap<String, SecretString>,
    /// Tolerated difference between the token timestamp and our clock.
    clock_skew_seconds: i64,
}

impl PasswordAuthenticator {
    #[must_use]
    pub fn new(passwords: HashMap<String, SecretString>, clock_skew_seconds: i64) -> Self {
        Self {
            passwords,
            clock_skew_seconds,
        }
    }

    /// Compute the token hash a sender with this password would produce.
    /// Exposed so test builders can mint valid tokens.
    #[must_use]
    pub fn compute_hash(
        password: &SecretString,
        alias: &ras_protocol::Alias,
        seq: SequenceNumber,
        timestamp: i64,
    ) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, password.expose_secret().as_bytes());
        let payload = CryptoToken::signing_payload(alias, seq, timestamp);
        hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref())
    }

    fn verify_one(&self, seq: SequenceNumber, token: &CryptoToken) -> bool {
        let Some(password) = self.passwords.get(token.alias.as_str()) else {
            debug!(
                target: "gk.auth",
                alias = %token.alias,
                "Token for alias with no configured password"
            );
            return false;
        };

        let now = chrono::Utc::now().timestamp();
        if (now - token.timestamp).abs() > self.clock_skew_seconds {
            debug!(
                target: "gk.auth",
                alias = %token.alias,
                "Token timestamp outside allowed skew"
            );
            return false;
        }

        let Ok(tag) = hex::decode(&token.hash) else {
            return false;
        };
        let key = hmac::Key::new(hmac::HMAC_SHA256, password.expose_secret().as_bytes());
        let payload = CryptoToken::signing_payload(&token.alias, seq, token.timestamp);
        hmac::verify(&key, payload.as_bytes(), &tag).is_ok()
    }
}

impl Authenticator for PasswordAuthenticator {
    fn verify(&self, seq: SequenceNumber, tokens: &[CryptoToken]) -> AuthDecision {
        if tokens.is_empty() {
            return AuthDecision::NoCredentials;
        }
        if tokens.iter().any(|token| self.verify_one(seq, token)) {
            AuthDecision::Authenticated
        } else {
            AuthDecision::Rejected
        }
    }
}
