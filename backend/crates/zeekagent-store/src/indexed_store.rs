//! Indexed Entity Store - Automatic secondary index management.
//!
//! `IndexedEntityStore<K, V>` extends `EntityStore` with secondary indexes that
//! are written in the same atomic batch as the entity itself.
//!
//! ## Architecture
//!
//! ```text
//! IndexedEntityStore<K, V>
//!     │
//!     ├── insert_ops(key, entity)      → [Put { entity }, Put { index.. }]
//!     ├── update_ops(key, old, new)    → [Delete { stale index.. }, Put { entity }, Put { new index.. }]
//!     └── delete_ops(key, entity)      → [Delete { entity }, Delete { index.. }]
//! ```
//!
//! The builders never write. The caller appends its own writes (counters,
//! bookkeeping) and hands the whole list to `StorageBackend::batch`.

use crate::entity_store::{EntityStore, KSerializable};
use crate::storage_trait::{Operation, Partition, Result, StorageBackend, StorageError};
use std::sync::Arc;
use zeekagent_commons::StorageKey;

/// Defines how to extract index keys from an entity.
///
/// ## Index Key Design Guidelines
///
/// - Put the filtered field first so a prefix scan can select it
/// - Append the primary key to keep index keys unique
/// - Return `None` from `extract_key()` to skip indexing an entity
pub trait IndexDefinition<K, V>: Send + Sync
where
    K: StorageKey,
    V: KSerializable,
{
    /// Returns the partition name for this index.
    ///
    /// Convention: `{main_partition}_{column}_idx`.
    fn partition(&self) -> &str;

    /// Extracts the index key from the entity.
    fn extract_key(&self, primary_key: &K, entity: &V) -> Option<Vec<u8>>;

    /// Returns the value to store in the index.
    ///
    /// Default: the primary key bytes for reverse lookup.
    fn index_value(&self, primary_key: &K, _entity: &V) -> Vec<u8> {
        primary_key.storage_key()
    }
}

/// An EntityStore that automatically manages secondary indexes.
///
/// This struct is `Send + Sync`; the backend handles concurrent access.
pub struct IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: KSerializable + 'static,
{
    backend: Arc<dyn StorageBackend>,
    partition: String,
    indexes: Vec<Arc<dyn IndexDefinition<K, V>>>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V> IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: KSerializable + 'static,
{
    /// Creates a new IndexedEntityStore, creating the entity and index
    /// partitions when missing.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        partition: impl Into<String>,
        indexes: Vec<Arc<dyn IndexDefinition<K, V>>>,
    ) -> Result<Self> {
        let partition = partition.into();

        backend.create_partition(&Partition::new(&partition))?;
        for index in &indexes {
            backend.create_partition(&Partition::new(index.partition()))?;
        }

        Ok(Self {
            backend,
            partition,
            indexes,
            _marker: std::marker::PhantomData,
        })
    }

    fn index(&self, index_idx: usize) -> Result<&Arc<dyn IndexDefinition<K, V>>> {
        self.indexes
            .get(index_idx)
            .ok_or_else(|| StorageError::Other(format!("Index {} not found", index_idx)))
    }

    // ========================================================================
    // Batch builders
    // ========================================================================

    /// Operations that insert `entity` and all of its index entries.
    pub fn insert_ops(&self, key: &K, entity: &V) -> Result<Vec<Operation>> {
        let mut operations = Vec::with_capacity(1 + self.indexes.len());

        operations.push(Operation::Put {
            partition: Partition::new(&self.partition),
            key: key.storage_key(),
            value: entity.encode()?,
        });

        for index in &self.indexes {
            if let Some(index_key) = index.extract_key(key, entity) {
                operations.push(Operation::Put {
                    partition: Partition::new(index.partition()),
                    key: index_key,
                    value: index.index_value(key, entity),
                });
            }
        }

        Ok(operations)
    }

    /// Operations that replace `old_entity` with `new_entity`.
    ///
    /// Index entries are only touched when their key changed.
    pub fn update_ops(
        &self,
        key: &K,
        old_entity: Option<&V>,
        new_entity: &V,
    ) -> Result<Vec<Operation>> {
        let mut operations = Vec::with_capacity(1 + self.indexes.len() * 2);

        for index in &self.indexes {
            let old_index_key = old_entity.and_then(|old| index.extract_key(key, old));
            let new_index_key = index.extract_key(key, new_entity);
            if old_index_key != new_index_key {
                if let Some(old_key) = old_index_key {
                    operations.push(Operation::Delete {
                        partition: Partition::new(index.partition()),
                        key: old_key,
                    });
                }
            }
        }

        operations.push(Operation::Put {
            partition: Partition::new(&self.partition),
            key: key.storage_key(),
            value: new_entity.encode()?,
        });

        for index in &self.indexes {
            let new_index_key = index.extract_key(key, new_entity);
            let old_index_key = old_entity.and_then(|old| index.extract_key(key, old));
            if new_index_key != old_index_key {
                if let Some(idx_key) = new_index_key {
                    operations.push(Operation::Put {
                        partition: Partition::new(index.partition()),
                        key: idx_key,
                        value: index.index_value(key, new_entity),
                    });
                }
            }
        }

        Ok(operations)
    }

    /// Operations that delete `entity` and all of its index entries.
    pub fn delete_ops(&self, key: &K, entity: &V) -> Vec<Operation> {
        let mut operations = Vec::with_capacity(1 + self.indexes.len());

        operations.push(Operation::Delete {
            partition: Partition::new(&self.partition),
            key: key.storage_key(),
        });

        for index in &self.indexes {
            if let Some(index_key) = index.extract_key(key, entity) {
                operations.push(Operation::Delete {
                    partition: Partition::new(index.partition()),
                    key: index_key,
                });
            }
        }

        operations
    }

    // ========================================================================
    // Index reads
    // ========================================================================

    /// Scans an index returning raw (index_key, primary_key) pairs.
    pub fn scan_index_raw(
        &self,
        index_idx: usize,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let index = self.index(index_idx)?;
        let iter = self
            .backend
            .scan(&Partition::new(index.partition()), prefix, start_key, limit)?;
        Ok(iter.collect())
    }
}

impl<K, V> EntityStore<K, V> for IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: KSerializable + 'static,
{
    fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn partition(&self) -> &str {
        &self.partition
    }
}
