//! Storage for the clustering engine.
//!
//! The address identity index only needs point reads and writes against a
//! durable keyed store, so the store is a capability trait with an
//! in-memory backend for tests and a RocksDB backend for real runs.

use cospend_common::Result;

pub mod address_index;
pub mod cluster_file;
pub mod memory;
#[cfg(feature = "rocks")]
pub mod rocks;

pub use address_index::AddressIndex;
pub use cluster_file::{write_cluster_file, ClusterAssignment, ClusterSummary};
pub use memory::MemoryStore;
#[cfg(feature = "rocks")]
pub use rocks::{RocksConfig, RocksStore};

/// Logical key space inside a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Address storage key to identity
    Address,

    /// Identity to raw address bytes
    Identity,

    /// Index bookkeeping such as the identity counter
    Meta,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Address, Column::Identity, Column::Meta];

    /// Column family name
    pub fn name(&self) -> &'static str {
        match self {
            Column::Address => "address",
            Column::Identity => "identity",
            Column::Meta => "meta",
        }
    }
}

/// Group of writes applied together
#[derive(Debug, Default)]
pub struct KeyBatch {
    puts: Vec<(Column, Vec<u8>, Vec<u8>)>,
}

impl KeyBatch {
    pub fn new() -> Self {
        Self { puts: Vec::new() }
    }

    /// Put a key-value pair
    pub fn put(&mut self, column: Column, key: &[u8], value: &[u8]) -> &mut Self {
        self.puts.push((column, key.to_vec(), value.to_vec()));
        self
    }

    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    pub fn into_puts(self) -> Vec<(Column, Vec<u8>, Vec<u8>)> {
        self.puts
    }
}

/// Durable keyed store used by the address identity index
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()>;

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool> {
        Ok(self.get(column, key)?.is_some())
    }

    /// Apply every put in the batch
    fn write_batch(&self, batch: KeyBatch) -> Result<()> {
        for (column, key, value) in batch.into_puts() {
            self.put(column, &key, &value)?;
        }
        Ok(())
    }

    /// Make buffered writes durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(column, key, value)
    }

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool> {
        (**self).contains(column, key)
    }

    fn write_batch(&self, batch: KeyBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}
