//! Test utilities for zeekagent-store.
//!
//! Provides an in-memory `StorageBackend` with write-fault injection so
//! dependent crates can test without a RocksDB directory.

use crate::storage_trait::{KvIterator, Operation, Partition, Result, StorageBackend, StorageError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type PartitionMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory backend with ordered partitions.
///
/// Writes to a partition that was never created fail with
/// `PartitionNotFound`, matching RocksDB column family semantics.
#[derive(Default)]
pub struct InMemoryBackend {
    partitions: RwLock<HashMap<String, PartitionMap>>,
    fail_writes: AtomicBool,
    committed_batches: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `IoError` until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes (batches, puts, deletes) applied so far.
    pub fn committed_batches(&self) -> usize {
        self.committed_batches.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::IoError("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let partitions = self.partitions.read();
        let map = partitions
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        self.batch(vec![Operation::Put {
            partition: partition.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        }])
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        self.batch(vec![Operation::Delete {
            partition: partition.clone(),
            key: key.to_vec(),
        }])
    }

    fn batch(&self, operations: Vec<Operation>) -> Result<()> {
        self.check_writable()?;
        let mut partitions = self.partitions.write();

        // Validate first so a bad operation leaves nothing applied
        for op in &operations {
            let partition = match op {
                Operation::Put { partition, .. } | Operation::Delete { partition, .. } => partition,
            };
            if !partitions.contains_key(partition.name()) {
                return Err(StorageError::PartitionNotFound(partition.name().to_string()));
            }
        }

        for op in operations {
            match op {
                Operation::Put {
                    partition,
                    key,
                    value,
                } => {
                    if let Some(map) = partitions.get_mut(partition.name()) {
                        map.insert(key, value);
                    }
                }
                Operation::Delete { partition, key } => {
                    if let Some(map) = partitions.get_mut(partition.name()) {
                        map.remove(&key);
                    }
                }
            }
        }

        self.committed_batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn scan(
        &self,
        partition: &Partition,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<KvIterator<'_>> {
        let partitions = self.partitions.read();
        let map = partitions
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;

        let from = start_key.or(prefix).unwrap_or(&[]).to_vec();
        let results: Vec<_> = map
            .range(from..)
            .take_while(|(k, _)| prefix.map_or(true, |p| k.starts_with(p)))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Box::new(results.into_iter()))
    }

    fn partition_exists(&self, partition: &Partition) -> bool {
        self.partitions.read().contains_key(partition.name())
    }

    fn create_partition(&self, partition: &Partition) -> Result<()> {
        self.partitions
            .write()
            .entry(partition.name().to_string())
            .or_default();
        Ok(())
    }
}
