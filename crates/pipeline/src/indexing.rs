//! First pass: give every output address an identity.

use std::sync::Arc;

use cospend_common::Result;
use cospend_core::config::PipelineConfig;
use cospend_core::ledger::LedgerSource;
use cospend_storage::{AddressIndex, KeyValueStore};
use serde::Serialize;
use tracing::info;

use crate::prefetch::prefetch_blocks;
use crate::progress::PassProgress;

/// Counters from the indexing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexingStats {
    pub blocks: u64,
    pub transactions: u64,

    /// Outputs that carried an address
    pub addressed_outputs: u64,

    /// Identities created by this pass
    pub new_identities: u64,

    /// Identity count once the pass finished
    pub identities: u64,
}

/// Streams the ledger once and assigns identities to output addresses
#[derive(Debug, Clone, Default)]
pub struct IndexingPass {
    config: PipelineConfig,
    total_blocks: Option<u64>,
}

impl IndexingPass {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            total_blocks: None,
        }
    }

    /// Block count used for progress reporting
    pub fn with_total_blocks(mut self, total: Option<u64>) -> Self {
        self.total_blocks = total;
        self
    }

    pub async fn run<S: KeyValueStore>(
        &self,
        ledger: Arc<dyn LedgerSource>,
        index: &mut AddressIndex<S>,
    ) -> Result<IndexingStats> {
        info!("Extracting output addresses");
        let start_count = index.count();
        let mut stats = IndexingStats::default();
        let mut progress = PassProgress::new(self.config.progress_interval, self.total_blocks);
        let mut blocks = prefetch_blocks(ledger, self.config.prefetch_blocks);

        while let Some(block) = blocks.next().await {
            let block = block?;
            for transaction in &block.transactions {
                for address in transaction.output_addresses() {
                    index.assign_if_absent(address)?;
                    stats.addressed_outputs += 1;
                }
                stats.transactions += 1;
            }
            stats.blocks += 1;

            if progress.block_done() {
                info!(
                    height = block.height,
                    blocks = progress.blocks(),
                    total = ?progress.total(),
                    identities = index.count(),
                    blocks_per_sec = format!("{:.1}", progress.rate()),
                    "Indexing addresses"
                );
            }
        }
        blocks.finish().await?;
        index.flush()?;

        stats.identities = index.count();
        stats.new_identities = stats.identities - start_count;
        info!(
            blocks = stats.blocks,
            transactions = stats.transactions,
            identities = stats.identities,
            elapsed_secs = format!("{:.1}", progress.elapsed_secs()),
            "Address extraction finished"
        );
        Ok(stats)
    }
}
