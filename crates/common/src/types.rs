//! Common data types for Gatehouse components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier assigned to a registered endpoint by the gatekeeper.
///
/// Opaque to clients; the generation scheme lives with the gatekeeper so a
/// registration record never embeds anything about the live signalling
/// endpoint it describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Globally unique identifier for a call, shared by both call legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Create a new random call ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_uniqueness() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_endpoint_id_display_roundtrip() {
        let id = EndpointId::from("1234:42");
        assert_eq!(id.to_string(), "1234:42");
        assert_eq!(id.as_str(), "1234:42");
    }

    #[test]
    fn test_call_id_serde() {
        let id = CallId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: CallId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
