//! Storage key trait for type-safe key serialization.
//!
//! Keys written to the durable store are raw bytes. Identifiers that end up as
//! primary keys implement `StorageKey` so the conversion is an explicit
//! contract instead of an incidental `AsRef<[u8]>`.
//!
//! # Usage for Composite Keys
//!
//! Composite keys join their components with a NUL separator so that a prefix
//! scan over the first component returns every composite key under it:
//!
//! ```rust
//! use zeekagent_commons::storage_key::{composite_key, composite_prefix, split_composite};
//!
//! let key = composite_key("SELECT 1", "42");
//! assert!(key.starts_with(&composite_prefix("SELECT 1")));
//! assert_eq!(split_composite(&key).unwrap(), ("SELECT 1".to_string(), "42".to_string()));
//! ```

/// Separator between components of a composite key.
pub const KEY_SEPARATOR: u8 = 0x00;

/// Trait for keys that can be serialized for storage in an `EntityStore`.
pub trait StorageKey: Clone + Send + Sync + 'static {
    /// Serialize this key to bytes for storage.
    fn storage_key(&self) -> Vec<u8>;

    /// Deserialize this key from bytes
    fn from_storage_key(bytes: &[u8]) -> Result<Self, String>
    where
        Self: Sized;
}

impl StorageKey for String {
    fn storage_key(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid utf-8 key: {}", e))
    }
}

/// Build `{head}\0{tail}`.
pub fn composite_key(head: &str, tail: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(head.len() + 1 + tail.len());
    key.extend_from_slice(head.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(tail.as_bytes());
    key
}

/// Build the scan prefix `{head}\0` matching every `composite_key(head, _)`.
pub fn composite_prefix(head: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(head.len() + 1);
    prefix.extend_from_slice(head.as_bytes());
    prefix.push(KEY_SEPARATOR);
    prefix
}

/// Split a composite key back into `(head, tail)`.
pub fn split_composite(key: &[u8]) -> Result<(String, String), String> {
    let pos = key
        .iter()
        .position(|b| *b == KEY_SEPARATOR)
        .ok_or_else(|| "composite key has no separator".to_string())?;
    let head = std::str::from_utf8(&key[..pos]).map_err(|e| e.to_string())?;
    let tail = std::str::from_utf8(&key[pos + 1..]).map_err(|e| e.to_string())?;
    Ok((head.to_string(), tail.to_string()))
}
