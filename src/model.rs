use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Key/value state persisted for one session.
pub type SessionMap = HashMap<String, serde_json::Value>;

/// Opaque identifier for a session.
///
/// Identifiers minted by this crate are random v4 UUIDs. Identifiers read back
/// from a verified token are accepted as-is, so the type does not enforce the
/// UUID shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh identifier from a cryptographically strong random UUID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short stable digest safe to put in logs.
    ///
    /// The identifier itself is a bearer credential and must not be logged.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_uuids() {
        let id = SessionId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn stable_fingerprint() {
        let id = SessionId::from("3f1c0e9a-session");
        assert_eq!(id.fingerprint(), SessionId::from("3f1c0e9a-session").fingerprint());
        assert_ne!(id.fingerprint(), SessionId::from("other").fingerprint());
        assert_eq!(id.fingerprint().len(), 12);
        assert!(!id.fingerprint().contains("session"));
    }
}
