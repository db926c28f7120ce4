use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Encoded observation frame as delivered by the remote (base64 PNG).
///
/// The payload is opaque to envplay; render sinks decode it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation(String);

impl Observation {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The encoded payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Observation {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl From<&str> for Observation {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
