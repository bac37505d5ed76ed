//! RocksDB initialization utilities.
//!
//! Provides a thin helper to open a RocksDB instance with the partitions the
//! agent needs already present.

use crate::rocksdb_impl::RocksDb;
use anyhow::Result;
use rocksdb::{BlockBasedOptions, Cache, ColumnFamilyDescriptor, Options};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

fn default_rocksdb_write_buffer_size() -> usize {
    8 * 1024 * 1024
}

fn default_rocksdb_max_write_buffers() -> i32 {
    2
}

fn default_rocksdb_block_cache_size() -> usize {
    16 * 1024 * 1024
}

fn default_rocksdb_max_background_jobs() -> i32 {
    2
}

fn default_rocksdb_max_open_files() -> i32 {
    256
}

/// RocksDB-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocksDbSettings {
    /// Write buffer size per column family in bytes (default: 8MB)
    #[serde(default = "default_rocksdb_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Maximum number of write buffers (default: 2)
    #[serde(default = "default_rocksdb_max_write_buffers")]
    pub max_write_buffers: i32,

    /// Block cache size for reads in bytes (default: 16MB)
    #[serde(default = "default_rocksdb_block_cache_size")]
    pub block_cache_size: usize,

    /// Maximum number of background jobs (default: 2)
    #[serde(default = "default_rocksdb_max_background_jobs")]
    pub max_background_jobs: i32,

    /// Maximum number of open files (default: 256)
    #[serde(default = "default_rocksdb_max_open_files")]
    pub max_open_files: i32,

    /// Compact every column family when the database is opened
    #[serde(default)]
    pub compact_on_startup: bool,
}

impl Default for RocksDbSettings {
    fn default() -> Self {
        Self {
            write_buffer_size: default_rocksdb_write_buffer_size(),
            max_write_buffers: default_rocksdb_max_write_buffers(),
            block_cache_size: default_rocksdb_block_cache_size(),
            max_background_jobs: default_rocksdb_max_background_jobs(),
            max_open_files: default_rocksdb_max_open_files(),
            compact_on_startup: false,
        }
    }
}

/// RocksDB initializer for creating/opening a database with required CFs.
pub struct RocksDbInit {
    db_path: String,
    settings: RocksDbSettings,
    partitions: Vec<String>,
}

impl RocksDbInit {
    /// Create a new initializer for the given path with custom settings.
    pub fn new(db_path: impl Into<String>, settings: RocksDbSettings) -> Self {
        Self {
            db_path: db_path.into(),
            settings,
            partitions: Vec::new(),
        }
    }

    /// Create a new initializer with default settings.
    pub fn with_defaults(db_path: impl Into<String>) -> Self {
        Self::new(db_path, RocksDbSettings::default())
    }

    /// Column families that must exist once the database is open.
    pub fn with_partitions<I, S>(mut self, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partitions.extend(partitions.into_iter().map(Into::into));
        self
    }

    /// Open or create the RocksDB database and ensure required CFs exist.
    pub fn open(&self) -> Result<Arc<RocksDb>> {
        let path = Path::new(&self.db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(self.settings.write_buffer_size);
        db_opts.set_max_write_buffer_number(self.settings.max_write_buffers);
        db_opts.set_max_background_jobs(self.settings.max_background_jobs);
        db_opts.set_max_open_files(self.settings.max_open_files);

        // Block cache is shared across all column families
        let cache = Cache::new_lru_cache(self.settings.block_cache_size);
        db_opts.set_block_based_table_factory(&create_block_options_with_cache(&cache));

        // Determine existing CFs (or default if DB missing)
        let mut existing = match RocksDb::list_cf(&db_opts, path) {
            Ok(cfs) if !cfs.is_empty() => cfs,
            _ => vec!["default".to_string()],
        };

        for name in &self.partitions {
            if !existing.iter().any(|n| n == name) {
                existing.push(name.clone());
            }
        }

        let cf_descriptors: Vec<_> = existing
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_write_buffer_size(self.settings.write_buffer_size);
                cf_opts.set_max_write_buffer_number(self.settings.max_write_buffers);
                cf_opts.set_block_based_table_factory(&create_block_options_with_cache(&cache));
                ColumnFamilyDescriptor::new(name, cf_opts)
            })
            .collect();

        let db = Arc::new(RocksDb::open_cf_descriptors(&db_opts, path, cf_descriptors)?);

        if self.settings.compact_on_startup {
            log::debug!("Running startup compaction for {} column families...", existing.len());
            let start = std::time::Instant::now();
            for cf_name in &existing {
                if let Some(cf) = db.cf_handle(cf_name) {
                    db.compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
                }
            }
            log::info!("Startup compaction completed in {:?}", start.elapsed());
        }

        Ok(db)
    }
}

fn create_block_options_with_cache(cache: &Cache) -> BlockBasedOptions {
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);
    block_opts
}
