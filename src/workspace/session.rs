//! Session identifiers.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Unique token identifying one end-to-end verification run.
///
/// Session identifiers are only ever minted server-side; there is no way to
/// build one from caller-supplied text, so a session id is always safe to use
/// as a path component or container name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id (32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first eight characters, for log prefixes.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
