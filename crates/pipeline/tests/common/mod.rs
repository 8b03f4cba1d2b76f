#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cospend_common::{Error, Result};
use cospend_core::ledger::{BlockIter, LedgerSource, MemoryLedger};
use cospend_core::types::{Address, Block, Transaction, TxInput, TxOutput};
use cospend_storage::{Column, KeyBatch, KeyValueStore, MemoryStore};

/// 2009-01-03T18:15:05Z
pub const GENESIS_TIME: u64 = 1_231_006_505;
pub const DAY: u64 = 86_400;

pub fn tx(inputs: &[(&str, u64)], outputs: &[(&str, u64)]) -> Transaction {
    Transaction {
        inputs: inputs
            .iter()
            .map(|(a, v)| TxInput {
                address: Some(Address::from(*a)),
                value: *v,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|(a, v)| TxOutput {
                address: Some(Address::from(*a)),
                value: *v,
            })
            .collect(),
    }
}

pub fn block(height: u64, time: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        height,
        time,
        transactions,
    }
}

/// Five transactions over three blocks:
///
/// - tx0, tx1 pay `a` and `b`
/// - tx2 spends `a` and `b` together into `c` and `d`
/// - tx3 pays `e`
/// - tx4 spends `c` and `e` together into `f`
///
/// Expected clusters: {a, b}, {c, e}, {d}, {f}
pub fn sample_blocks() -> Vec<Block> {
    vec![
        block(0, GENESIS_TIME, vec![tx(&[], &[("a", 50)]), tx(&[], &[("b", 50)])]),
        block(
            1,
            GENESIS_TIME + DAY,
            vec![
                tx(&[("a", 50), ("b", 50)], &[("c", 90), ("d", 10)]),
                tx(&[], &[("e", 25)]),
            ],
        ),
        block(
            2,
            GENESIS_TIME + DAY + 600,
            vec![tx(&[("c", 90), ("e", 25)], &[("f", 115)])],
        ),
    ]
}

pub fn sample_ledger() -> Arc<dyn LedgerSource> {
    Arc::new(MemoryLedger::new(sample_blocks()))
}

/// Ledger whose reader fails after `good` blocks
pub struct BrokenLedger {
    pub blocks: Vec<Block>,
    pub good: usize,
}

impl LedgerSource for BrokenLedger {
    fn block_count(&self) -> Option<u64> {
        Some(self.blocks.len() as u64)
    }

    fn blocks(&self) -> Result<BlockIter> {
        let good: Vec<Result<Block>> = self.blocks.iter().take(self.good).cloned().map(Ok).collect();
        let failure = std::iter::once(Err(Error::ledger("truncated block record")));
        Ok(Box::new(good.into_iter().chain(failure)))
    }
}

/// Ledger counting how often its blocks are read from the start
pub struct CountingLedger {
    pub inner: MemoryLedger,
    pub reads: AtomicUsize,
}

impl CountingLedger {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            inner: MemoryLedger::new(blocks),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl LedgerSource for CountingLedger {
    fn blocks(&self) -> Result<BlockIter> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.blocks()
    }
}

/// Store whose batched writes fail once `good` batches have landed
pub struct FullDiskStore {
    pub inner: MemoryStore,
    pub good: usize,
    pub batches: AtomicUsize,
}

impl FullDiskStore {
    pub fn new(good: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            good,
            batches: AtomicUsize::new(0),
        }
    }
}

impl KeyValueStore for FullDiskStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(column, key, value)
    }

    fn write_batch(&self, batch: KeyBatch) -> Result<()> {
        if self.batches.fetch_add(1, Ordering::SeqCst) >= self.good {
            return Err(Error::rocksdb("IO error: No space left on device"));
        }
        self.inner.write_batch(batch)
    }
}
