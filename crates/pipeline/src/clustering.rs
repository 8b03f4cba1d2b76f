//! Second pass: union the identities spent together in one transaction.

use std::sync::Arc;

use cospend_common::{Error, Result};
use cospend_core::config::PipelineConfig;
use cospend_core::ledger::LedgerSource;
use cospend_core::types::AddressId;
use cospend_core::union_find::DisjointSet;
use cospend_storage::{AddressIndex, KeyValueStore};
use serde::Serialize;
use tracing::{error, info};

use crate::prefetch::prefetch_blocks;
use crate::progress::PassProgress;

/// Counters from the clustering pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusteringStats {
    pub blocks: u64,
    pub transactions: u64,

    /// Transactions with at least two addressed inputs
    pub multi_input_transactions: u64,

    /// Calls to `union`
    pub unions: u64,

    /// Unions that joined two distinct clusters
    pub merges: u64,

    /// Clusters left after the pass
    pub clusters: u64,
}

/// Streams the ledger a second time and merges co-spent inputs
#[derive(Debug, Clone, Default)]
pub struct ClusteringPass {
    config: PipelineConfig,
    total_blocks: Option<u64>,
}

impl ClusteringPass {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            total_blocks: None,
        }
    }

    pub fn with_total_blocks(mut self, total: Option<u64>) -> Self {
        self.total_blocks = total;
        self
    }

    /// Apply the co-spend unions to `forest`.
    ///
    /// `forest` must be sized to the final identity count of `index`.
    pub async fn run<S: KeyValueStore>(
        &self,
        ledger: Arc<dyn LedgerSource>,
        index: &AddressIndex<S>,
        forest: &mut DisjointSet,
    ) -> Result<ClusteringStats> {
        if forest.len() as u64 != index.count() {
            return Err(Error::size_mismatch(index.count(), forest.len() as u64));
        }

        info!("Constructing co-spend edges");
        let mut stats = ClusteringStats::default();
        let mut progress = PassProgress::new(self.config.progress_interval, self.total_blocks);
        let mut blocks = prefetch_blocks(ledger, self.config.prefetch_blocks);
        let mut ids: Vec<AddressId> = Vec::with_capacity(16);

        while let Some(block) = blocks.next().await {
            let block = block?;
            for (tx_index, transaction) in block.transactions.iter().enumerate() {
                ids.clear();
                for address in transaction.input_addresses() {
                    let id = index.lookup(address).map_err(|e| {
                        if let Error::NotFound { .. } = e {
                            error!(
                                height = block.height,
                                tx_index,
                                address = %address,
                                "Input address was never seen as an output"
                            );
                        }
                        e
                    })?;
                    ids.push(id);
                }

                if ids.len() > 1 {
                    stats.multi_input_transactions += 1;
                    for pair in ids.windows(2) {
                        stats.unions += 1;
                        if forest.union(pair[1], pair[0]) {
                            stats.merges += 1;
                        }
                    }
                }
                stats.transactions += 1;
            }
            stats.blocks += 1;

            if progress.block_done() {
                info!(
                    height = block.height,
                    blocks = progress.blocks(),
                    total = ?progress.total(),
                    merges = stats.merges,
                    clusters = forest.component_count(),
                    blocks_per_sec = format!("{:.1}", progress.rate()),
                    "Clustering addresses"
                );
            }
        }
        blocks.finish().await?;

        stats.clusters = forest.component_count() as u64;
        info!(
            transactions = stats.transactions,
            unions = stats.unions,
            merges = stats.merges,
            clusters = stats.clusters,
            elapsed_secs = format!("{:.1}", progress.elapsed_secs()),
            "Edge construction finished"
        );
        Ok(stats)
    }
}
