//! RocksDB-backed key-value store
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cospend_common::{Error, Result};
use cospend_core::config::IndexConfig;
use rocksdb::{BlockBasedOptions, ColumnFamily, DBCompressionType, Options, WriteBatch, DB};
use tracing::{debug, info};

use crate::{Column, KeyBatch, KeyValueStore};

const MB: u64 = 1024 * 1024;

/// Configuration for RocksDB storage
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Path to the database
    pub path: PathBuf,

    /// Whether to create if missing
    pub create_if_missing: bool,

    /// Memtable size in megabytes
    pub write_buffer_mb: usize,

    /// SST target file size in megabytes
    pub target_file_size_mb: u64,

    /// L1 size in megabytes; L0 is sized to match
    pub max_bytes_for_level_base_mb: u64,

    pub level_multiplier: f64,

    pub bloom_bits_per_key: f64,

    pub background_jobs: i32,
}

impl Default for RocksConfig {
    fn default() -> Self {
        RocksConfig::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for RocksConfig {
    fn from(config: &IndexConfig) -> Self {
        Self {
            path: config.path.clone(),
            create_if_missing: true,
            write_buffer_mb: config.write_buffer_mb,
            target_file_size_mb: config.target_file_size_mb,
            max_bytes_for_level_base_mb: config.max_bytes_for_level_base_mb,
            level_multiplier: config.level_multiplier,
            bloom_bits_per_key: config.bloom_bits_per_key,
            background_jobs: config.background_jobs,
        }
    }
}

impl RocksConfig {
    /// Options tuned for a write-heavy point-lookup workload
    fn options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(self.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_background_jobs(self.background_jobs);
        opts.set_write_buffer_size(self.write_buffer_mb * MB as usize);
        opts.set_max_bytes_for_level_base(self.max_bytes_for_level_base_mb * MB);
        opts.set_target_file_size_base(self.target_file_size_mb * MB);
        opts.set_max_bytes_for_level_multiplier(self.level_multiplier);
        // Keys are short and high-entropy; compression buys nothing
        opts.set_compression_type(DBCompressionType::None);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(self.bloom_bits_per_key, false);
        block_opts.set_cache_index_and_filter_blocks(true);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }
}

/// RocksDB storage with one column family per [`Column`]
pub struct RocksStore {
    /// Database instance
    db: Arc<DB>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create the database at `config.path`
    pub fn open(config: &RocksConfig) -> Result<Self> {
        let opts = config.options();
        let cf_opts: Vec<(&str, Options)> = Column::ALL
            .iter()
            .map(|column| (column.name(), config.options()))
            .collect();

        let db = DB::open_cf_with_opts(&opts, Path::new(&config.path), cf_opts)
            .map_err(|e| Error::rocksdb(format!("Failed to open RocksDB at {}: {}", config.path.display(), e)))?;

        info!("Opened address store at {}", config.path.display());
        Ok(Self {
            db: Arc::new(db),
            path: config.path.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf_handle_ref(&self, column: Column) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(column.name())
            .ok_or_else(|| Error::rocksdb(format!("Column family '{}' not found", column.name())))
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle_ref(column)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle_ref(column)?;
        Ok(self.db.put_cf(cf, key, value)?)
    }

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool> {
        let cf = self.cf_handle_ref(column)?;
        if !self.db.key_may_exist_cf(cf, key) {
            return Ok(false);
        }
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    fn write_batch(&self, batch: KeyBatch) -> Result<()> {
        let mut write = WriteBatch::default();
        for (column, key, value) in batch.into_puts() {
            let cf = self.cf_handle_ref(column)?;
            write.put_cf(cf, key, value);
        }
        Ok(self.db.write(write)?)
    }

    fn flush(&self) -> Result<()> {
        for column in Column::ALL {
            let cf = self.cf_handle_ref(column)?;
            self.db.flush_cf(cf)?;
        }
        debug!("Flushed address store at {}", self.path.display());
        Ok(())
    }
}
