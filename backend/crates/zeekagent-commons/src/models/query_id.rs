//! Identifier type for tracked queries
//!
//! Generated identifiers are decimal sequence numbers (`"1"`, `"2"`, ...).
//! Identifiers handed in by a caller may be any non-empty string.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::StorageKey;

/// Unique identifier of a tracked query.
///
/// Also used as the job key in the projected schedule so results coming back
/// from the local scheduler can be correlated with the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    /// Create a new query ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for the given sequence number.
    pub fn from_sequence(seq: u64) -> Self {
        Self(seq.to_string())
    }

    /// Sequence number, if this identifier has the generated form.
    pub fn sequence(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse::<u64>().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for QueryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for QueryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for QueryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl StorageKey for QueryId {
    fn storage_key(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        String::from_storage_key(bytes).map(Self)
    }
}
