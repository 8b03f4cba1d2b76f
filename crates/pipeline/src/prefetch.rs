//! Read-ahead of decoded blocks.
//!
//! Decoding runs on a blocking worker and feeds a bounded channel; the pass
//! consuming the channel is the only code touching the index or the forest.

use std::sync::Arc;

use cospend_common::{Error, Result};
use cospend_core::ledger::LedgerSource;
use cospend_core::types::Block;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Stream of blocks decoded ahead of the consumer
pub struct BlockStream {
    rx: mpsc::Receiver<Result<Block>>,
    reader: JoinHandle<()>,
}

/// Start a pass over `ledger` with up to `capacity` decoded blocks in flight
pub fn prefetch_blocks(ledger: Arc<dyn LedgerSource>, capacity: usize) -> BlockStream {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let reader = tokio::task::spawn_blocking(move || {
        let blocks = match ledger.blocks() {
            Ok(blocks) => blocks,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        for block in blocks {
            let failed = block.is_err();
            if tx.blocking_send(block).is_err() {
                debug!("Block consumer went away, stopping reader");
                return;
            }
            if failed {
                return;
            }
        }
    });
    BlockStream { rx, reader }
}

impl BlockStream {
    /// Next block, or `None` once the reader is done
    pub async fn next(&mut self) -> Option<Result<Block>> {
        self.rx.recv().await
    }

    /// Wait for the reader; a panicked reader is an error, not an early end
    pub async fn finish(self) -> Result<()> {
        drop(self.rx);
        self.reader
            .await
            .map_err(|e| Error::ledger(format!("Ledger reader task failed: {}", e)))
    }
}
