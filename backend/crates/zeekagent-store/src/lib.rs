//! # zeekagent-store
//!
//! Low-level key-value store abstraction used by the query tracker.
//! This crate isolates all direct RocksDB interactions so the tracker only
//! sees `get` / `put` / `delete` / `batch` / prefix `scan`.
//!
//! ## Architecture
//!
//! ```text
//! zeekagent-queries (registry, artifacts)
//!     ↓
//! IndexedEntityStore / EntityStore (typed entities + secondary indexes)
//!     ↓
//! StorageBackend (K/V operations)
//!     ↓
//! RocksDB | InMemoryBackend
//! ```

pub mod entity_store;
pub mod indexed_store;
pub mod rocksdb_impl;
pub mod rocksdb_init;
pub mod storage_trait;

pub use entity_store::{EntityStore, KSerializable};
pub use indexed_store::{IndexDefinition, IndexedEntityStore};
pub use rocksdb_impl::{RocksDBBackend, RocksDb};
pub use rocksdb_init::{RocksDbInit, RocksDbSettings};
pub use storage_trait::{KvIterator, Operation, Partition, Result, StorageBackend, StorageError};

pub use zeekagent_commons::StorageKey;

// Make test_utils available for testing in dependent crates
pub mod test_utils;
