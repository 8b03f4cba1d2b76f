//! Memory-backed key-value store for tests and small ledgers
use std::collections::HashMap;
use std::sync::RwLock;

use cospend_common::{Error, Result};
use tracing::debug;

use crate::{Column, KeyBatch, KeyValueStore};

type Table = RwLock<HashMap<Vec<u8>, Vec<u8>>>;

/// In-memory store with one map per column
#[derive(Debug, Default)]
pub struct MemoryStore {
    address: Table,
    identity: Table,
    meta: Table,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, column: Column) -> &Table {
        match column {
            Column::Address => &self.address,
            Column::Identity => &self.identity,
            Column::Meta => &self.meta,
        }
    }

    /// Number of keys in a column
    pub fn len(&self, column: Column) -> usize {
        self.table(column).read().map(|t| t.len()).unwrap_or(0)
    }
}

fn poisoned() -> Error {
    Error::storage("Memory store lock poisoned")
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.table(column).read().map_err(|_| poisoned())?;
        Ok(table.get(key).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        let mut table = self.table(column).write().map_err(|_| poisoned())?;
        table.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool> {
        let table = self.table(column).read().map_err(|_| poisoned())?;
        Ok(table.contains_key(key))
    }

    fn write_batch(&self, batch: KeyBatch) -> Result<()> {
        debug!("Applying batch of {} puts to memory store", batch.len());
        for (column, key, value) in batch.into_puts() {
            let mut table = self.table(column).write().map_err(|_| poisoned())?;
            table.insert(key, value);
        }
        Ok(())
    }
}
