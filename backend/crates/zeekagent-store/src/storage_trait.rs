//! Storage backend abstraction for pluggable storage implementations.
//!
//! The `StorageBackend` trait defines the operations the tracker needs from
//! its durable store:
//! - get/put/delete for key-value access
//! - batch for atomic multi-operation writes
//! - scan for prefix enumeration
//! - partition management (column families in RocksDB, namespaces in memory)
//!
//! ## Example Usage
//!
//! ```rust
//! use zeekagent_store::storage_trait::{Partition, StorageBackend};
//! use zeekagent_store::test_utils::InMemoryBackend;
//!
//! let backend = InMemoryBackend::new();
//! let partition = Partition::new("zeek_queries");
//! backend.create_partition(&partition).unwrap();
//! backend.put(&partition, b"1", b"{}").unwrap();
//! assert_eq!(backend.get(&partition, b"1").unwrap(), Some(b"{}".to_vec()));
//! ```

use std::fmt;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Iterator over `(key, value)` pairs returned by `scan`.
pub type KvIterator<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Partition (column family, namespace) not found
    PartitionNotFound(String),

    /// Generic I/O error from underlying storage
    IoError(String),

    /// Serialization/deserialization error
    SerializationError(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::PartitionNotFound(p) => write!(f, "Partition not found: {}", p),
            StorageError::IoError(msg) => write!(f, "I/O error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Represents a logical partition of data within a storage backend.
///
/// - RocksDB: Column Family
/// - In-memory: BTreeMap namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    name: String,
}

impl Partition {
    /// Creates a new partition with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the partition name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for Partition {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Represents a single operation in a batch transaction.
///
/// Used with `StorageBackend::batch()` for atomic multi-operation transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Insert or update a key-value pair
    Put {
        partition: Partition,
        key: Vec<u8>,
        value: Vec<u8>,
    },

    /// Delete a key
    Delete { partition: Partition, key: Vec<u8> },
}

/// Trait for pluggable storage backend implementations.
///
/// Implementations must be thread-safe (Send + Sync) to allow concurrent access.
///
/// ## Error Handling
///
/// Implementations should:
/// - Return `PartitionNotFound` if partition doesn't exist
/// - Return `IoError` for underlying storage failures
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key from the specified partition.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores a key-value pair in the specified partition.
    ///
    /// If the key already exists, its value is updated.
    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deletes a key from the specified partition.
    ///
    /// Returns `Ok(())` even if the key doesn't exist (idempotent).
    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()>;

    /// Executes multiple operations atomically in a batch.
    ///
    /// Either all operations succeed or none are applied.
    fn batch(&self, operations: Vec<Operation>) -> Result<()>;

    /// Scans keys in a partition in ascending key order.
    ///
    /// ## Parameters
    /// - `prefix`: If Some, only return keys starting with this prefix
    /// - `start_key`: If Some, start scanning from this key (inclusive)
    /// - `limit`: If Some, return at most this many entries
    fn scan(
        &self,
        partition: &Partition,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<KvIterator<'_>>;

    /// Checks if a partition exists.
    fn partition_exists(&self, partition: &Partition) -> bool;

    /// Creates a new partition.
    ///
    /// Returns `Ok(())` if the partition already exists (idempotent).
    fn create_partition(&self, partition: &Partition) -> Result<()>;
}
