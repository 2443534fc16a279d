//! H.235 crypto tokens carried in RAS requests.

use crate::addr::Alias;
use serde::{Deserialize, Serialize};

/// A password-based crypto token.
///
/// The token proves possession of the alias's password: the hash is an
/// HMAC-SHA256 (hex) over the canonical signing payload, keyed with the
/// password. Verification is the gatekeeper's `Authenticator`; this type
/// only carries the material and defines the payload canonicalization so
/// signer and verifier cannot drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoToken {
    /// Alias the token authenticates.
    pub alias: Alias,
    /// Sender's timestamp (unix seconds), bound into the hash to limit
    /// replay windows.
    pub timestamp: i64,
    /// Hex-encoded HMAC-SHA256 of [`CryptoToken::signing_payload`].
    pub hash: String,
}

impl CryptoToken {
    /// Canonical byte string the HMAC covers for a given sequence number.
    #[must_use]
    pub fn signing_payload(alias: &Alias, sequence: u32, timestamp: i64) -> String {
        format!("{}|{sequence}|{timestamp}", alias.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_payload_is_stable() {
        let payload = CryptoToken::signing_payload(&Alias::from("1001"), 7, 1700000000);
        assert_eq!(payload, "1001|7|1700000000");
    }
}
