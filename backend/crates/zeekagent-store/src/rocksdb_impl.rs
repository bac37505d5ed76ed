//! RocksDB implementation of the StorageBackend trait.
//!
//! Partitions map to RocksDB column families. The database is opened in
//! multi-threaded column family mode so partitions can be created through a
//! shared handle.

use crate::storage_trait::{KvIterator, Operation, Partition, Result, StorageBackend, StorageError};
use rocksdb::{BoundColumnFamily, Direction, IteratorMode, MultiThreaded, Options, ReadOptions};
use std::sync::Arc;

/// RocksDB handle type used throughout the agent.
pub type RocksDb = rocksdb::DBWithThreadMode<MultiThreaded>;

/// RocksDB implementation of the StorageBackend trait.
///
/// ## Example
///
/// ```rust,ignore
/// use zeekagent_store::{RocksDbInit, RocksDBBackend, StorageBackend, Partition};
///
/// let db = RocksDbInit::with_defaults("/var/lib/zeekagent/db").open()?;
/// let backend = RocksDBBackend::new(db);
///
/// let partition = Partition::new("zeek_queries");
/// backend.put(&partition, b"1", b"{}")?;
/// ```
pub struct RocksDBBackend {
    db: Arc<RocksDb>,
}

impl RocksDBBackend {
    /// Creates a new RocksDB backend with the given database handle.
    pub fn new(db: Arc<RocksDb>) -> Self {
        Self { db }
    }

    /// Flush memtables and the WAL of every given partition to disk.
    pub fn flush(&self, partitions: &[Partition]) -> Result<()> {
        for partition in partitions {
            let cf = self.get_cf(partition)?;
            self.db
                .flush_cf(&cf)
                .map_err(|e| StorageError::IoError(e.to_string()))?;
        }
        self.db
            .flush_wal(true)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    /// Gets a column family handle by partition name.
    fn get_cf(&self, partition: &Partition) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))
    }
}

impl StorageBackend for RocksDBBackend {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.get_cf(partition)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.get_cf(partition)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        let cf = self.get_cf(partition)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn batch(&self, operations: Vec<Operation>) -> Result<()> {
        use rocksdb::WriteBatch;

        let mut batch = WriteBatch::default();

        for op in operations {
            match op {
                Operation::Put {
                    partition,
                    key,
                    value,
                } => {
                    let cf = self.get_cf(&partition)?;
                    batch.put_cf(&cf, key, value);
                }
                Operation::Delete { partition, key } => {
                    let cf = self.get_cf(&partition)?;
                    batch.delete_cf(&cf, key);
                }
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn scan(
        &self,
        partition: &Partition,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<KvIterator<'_>> {
        let cf = self.get_cf(partition)?;

        // Consistent view for the whole scan
        let snapshot = self.db.snapshot();
        let mut readopts = ReadOptions::default();
        readopts.set_snapshot(&snapshot);

        let iter_mode = match start_key.or(prefix) {
            Some(from) => IteratorMode::From(from, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut results = Vec::new();
        for item in self.db.iterator_cf_opt(&cf, readopts, iter_mode) {
            let (k, v) = item.map_err(|e| StorageError::IoError(e.to_string()))?;
            if let Some(p) = prefix {
                if !k.starts_with(p) {
                    break;
                }
            }
            results.push((k.to_vec(), v.to_vec()));
            if limit.is_some_and(|l| results.len() >= l) {
                break;
            }
        }

        Ok(Box::new(results.into_iter()))
    }

    fn partition_exists(&self, partition: &Partition) -> bool {
        self.db.cf_handle(partition.name()).is_some()
    }

    fn create_partition(&self, partition: &Partition) -> Result<()> {
        if self.partition_exists(partition) {
            return Ok(());
        }

        match self.db.create_cf(partition.name(), &Options::default()) {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                // Benign race: another thread created the CF between the check and create
                if msg.to_lowercase().contains("column family already exists") {
                    return Ok(());
                }
                Err(StorageError::IoError(msg))
            }
        }
    }
}
