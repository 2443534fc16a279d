//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with
//! Gatehouse-specific guidance. Use these types for all sensitive values,
//! in particular the per-alias H.235 passwords the gatekeeper verifies
//! registration and admission tokens against.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! code that derives `Debug` on a struct containing secrets automatically
//! gets safe logging behavior. A password map inside a config struct cannot
//! leak through `{:?}` or a tracing field.
//!
//! # Memory Safety
//!
//! Secrets are zeroized when dropped, so credential material does not linger
//! in memory after an endpoint unregisters.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct AliasCredential {
//!     alias: String,
//!     password: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let cred = AliasCredential {
//!     alias: "1001".to_string(),
//!     password: SecretString::from("hunter2"),
//! };
//!
//! // This is safe - the password is redacted
//! println!("{:?}", cred);
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let password: &str = cred.password.expose_secret();
//! # let _ = password;
//! ```
//!
//! # Gatehouse Usage Guidelines
//!
//! Use `SecretString` for:
//! - H.235 per-alias passwords
//! - Shared secrets for token verification
//!
//! Use `SecretBox<T>` for:
//! - Custom secret types (e.g., `SecretBox<Vec<u8>>` for raw HMAC keys)

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
