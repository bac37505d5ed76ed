//! Type-safe entity storage with generic key types.
//!
//! ## Architecture
//!
//! ```text
//! EntityStore<K, V>        ← Typed full-partition reads with generic keys (this file)
//!     ↓
//! StorageBackend           ← Generic K/V operations (storage_trait.rs)
//!     ↓
//! RocksDB / in-memory      ← Actual storage implementation
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use zeekagent_store::{EntityStore, StorageBackend};
//! use zeekagent_commons::{QueryEntry, QueryId};
//! use std::sync::Arc;
//!
//! struct EntryStore {
//!     backend: Arc<dyn StorageBackend>,
//! }
//!
//! impl EntityStore<QueryId, QueryEntry> for EntryStore {
//!     fn backend(&self) -> &Arc<dyn StorageBackend> {
//!         &self.backend
//!     }
//!
//!     fn partition(&self) -> &str {
//!         "zeek_queries"
//!     }
//! }
//! ```

use crate::storage_trait::{Partition, Result, StorageBackend, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use zeekagent_commons::StorageKey;

/// Rows requested per backend scan by [`EntityStore::scan_all`].
pub const SCAN_PAGE_SIZE: usize = 4096;

/// Values that can be stored in an [`EntityStore`].
///
/// The default encoding is JSON so records stay readable with `ldb` dumps.
pub trait KSerializable: Serialize + DeserializeOwned + Send + Sync {
    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| StorageError::SerializationError(format!("json encode failed: {}", e)))
    }

    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized,
    {
        serde_json::from_slice(bytes)
            .map_err(|e| StorageError::SerializationError(format!("json decode failed: {}", e)))
    }
}

impl<T> KSerializable for T where T: Serialize + DeserializeOwned + Send + Sync {}

/// Trait for typed entity storage with type-safe keys and automatic serialization.
///
/// ## Type Parameters
/// - `K`: Key type that implements StorageKey (QueryId, String, ...)
/// - `V`: Value/entity type that implements `KSerializable`
pub trait EntityStore<K, V>
where
    K: StorageKey,
    V: KSerializable,
{
    /// Returns a reference to the storage backend.
    fn backend(&self) -> &Arc<dyn StorageBackend>;

    /// Returns the partition name for this entity type.
    fn partition(&self) -> &str;

    /// Scans all entities in the partition, decoding keys as `K`.
    ///
    /// **Warning**: This loads all entities into memory.
    fn scan_all(&self) -> Result<Vec<(K, V)>> {
        self.scan_all_paged(SCAN_PAGE_SIZE)
    }

    /// Same as [`EntityStore::scan_all`], reading `page_size` rows per
    /// backend scan.
    fn scan_all_paged(&self, page_size: usize) -> Result<Vec<(K, V)>> {
        let partition = Partition::new(self.partition());
        let page_size = page_size.max(1);

        let mut results = Vec::new();
        let mut resume_at: Option<Vec<u8>> = None;
        loop {
            let page: Vec<_> = self
                .backend()
                .scan(&partition, None, resume_at.as_deref(), Some(page_size))?
                .collect();
            let full = page.len() == page_size;

            for (key_bytes, value_bytes) in page {
                let key =
                    K::from_storage_key(&key_bytes).map_err(StorageError::SerializationError)?;
                results.push((key, V::decode(&value_bytes)?));
                resume_at = Some(key_bytes);
            }

            if !full {
                break;
            }
            // start_key is inclusive; the smallest key after `last` is `last\0`
            if let Some(last) = resume_at.as_mut() {
                last.push(0);
            }
        }

        log::debug!(
            "Scanned {} entries from partition '{}'",
            results.len(),
            self.partition()
        );
        Ok(results)
    }
}
