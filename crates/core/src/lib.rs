//! Ledger model, ledger reader seam, disjoint-set store and configuration
pub mod config;
pub mod ledger;
pub mod types;
pub mod union_find;

pub use ledger::{BlockIter, JsonLinesLedger, LedgerSource, MemoryLedger};
pub use types::{Address, AddressId, Block, KeyEncoding, Transaction, TxInput, TxOutput};
pub use union_find::DisjointSet;

/// Re-export common types from cospend-common
pub use cospend_common::{Error, Result};
