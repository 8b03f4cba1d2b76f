//! Pipeline orchestration.
//!
//! Each stage consumes the previous one, so the indexing pass always finishes
//! before clustering starts and clustering always finishes before roots are
//! materialized. The pipeline owns the index; nothing else can mutate it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cospend_common::{Error, Result};
use cospend_core::config::PipelineConfig;
use cospend_core::ledger::LedgerSource;
use cospend_core::types::{Address, AddressId};
use cospend_core::union_find::DisjointSet;
use cospend_storage::{AddressIndex, ClusterAssignment, ClusterSummary, KeyValueStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::clustering::{ClusteringPass, ClusteringStats};
use crate::indexing::{IndexingPass, IndexingStats};
use crate::materialize::ClusterMaterializer;

/// Directory removed when the guard is dropped
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Take ownership of `path`, clearing anything left by an earlier run
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            warn!("Removing stale scratch directory {}", path.display());
            fs::remove_dir_all(&path)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Statistics of a complete run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub indexing: IndexingStats,
    pub clustering: ClusteringStats,
    pub summary: ClusterSummary,
}

/// Pipeline before any pass has run
pub struct ClusterPipeline<S: KeyValueStore> {
    // dropped before `scratch`, so the store is closed before its directory goes
    index: AddressIndex<S>,
    ledger: Arc<dyn LedgerSource>,
    config: PipelineConfig,
    scratch: Option<ScratchDir>,
}

impl<S: KeyValueStore> ClusterPipeline<S> {
    pub fn new(ledger: Arc<dyn LedgerSource>, index: AddressIndex<S>, config: PipelineConfig) -> Self {
        Self {
            index,
            ledger,
            config,
            scratch: None,
        }
    }

    /// Remove `scratch` when the pipeline (or its outcome) is dropped
    pub fn with_scratch(mut self, scratch: ScratchDir) -> Self {
        self.scratch = Some(scratch);
        self
    }

    pub fn index(&self) -> &AddressIndex<S> {
        &self.index
    }

    /// Run the indexing pass and size the disjoint-set forest
    pub async fn index_addresses(mut self) -> Result<IndexedPipeline<S>> {
        let total_blocks = self.ledger.block_count();
        match total_blocks {
            Some(total) => info!("Starting clustering run over {} blocks", total),
            None => info!("Starting clustering run"),
        }

        let stats = IndexingPass::new(self.config.clone())
            .with_total_blocks(total_blocks)
            .run(Arc::clone(&self.ledger), &mut self.index)
            .await?;

        let count = self.index.count();
        if count > AddressId::MAX as u64 {
            return Err(Error::IdentityOverflow(count));
        }
        info!("Creating union-find over {} identities", count);
        let forest = DisjointSet::new(count as usize);

        Ok(IndexedPipeline {
            inner: self,
            forest,
            indexing: stats,
        })
    }

    /// Run all three stages
    pub async fn run(self, cluster_file: impl AsRef<Path>) -> Result<ClusterOutcome<S>> {
        self.index_addresses()
            .await?
            .cluster()
            .await?
            .materialize(cluster_file)
    }
}

/// Identity space is fixed; unions not yet applied
pub struct IndexedPipeline<S: KeyValueStore> {
    inner: ClusterPipeline<S>,
    forest: DisjointSet,
    indexing: IndexingStats,
}

impl<S: KeyValueStore> IndexedPipeline<S> {
    pub fn index(&self) -> &AddressIndex<S> {
        &self.inner.index
    }

    pub fn indexing_stats(&self) -> IndexingStats {
        self.indexing
    }

    /// Run the clustering pass
    pub async fn cluster(mut self) -> Result<ClusteredPipeline<S>> {
        let stats = ClusteringPass::new(self.inner.config.clone())
            .with_total_blocks(Some(self.indexing.blocks))
            .run(Arc::clone(&self.inner.ledger), &self.inner.index, &mut self.forest)
            .await?;

        Ok(ClusteredPipeline {
            inner: self.inner,
            forest: self.forest,
            indexing: self.indexing,
            clustering: stats,
        })
    }
}

/// All unions applied; roots not yet materialized
pub struct ClusteredPipeline<S: KeyValueStore> {
    inner: ClusterPipeline<S>,
    forest: DisjointSet,
    indexing: IndexingStats,
    clustering: ClusteringStats,
}

impl<S: KeyValueStore> ClusteredPipeline<S> {
    pub fn clustering_stats(&self) -> ClusteringStats {
        self.clustering
    }

    /// Flatten the forest and write the roots array to `cluster_file`
    pub fn materialize(mut self, cluster_file: impl AsRef<Path>) -> Result<ClusterOutcome<S>> {
        let assignment = ClusterMaterializer::new().run(&mut self.forest, cluster_file)?;
        let stats = RunStats {
            indexing: self.indexing,
            clustering: self.clustering,
            summary: assignment.summary(),
        };
        info!("Clustering run complete");

        Ok(ClusterOutcome {
            inner: self.inner,
            assignment,
            stats,
        })
    }
}

/// Result of a finished run, serving lookups for the export step
pub struct ClusterOutcome<S: KeyValueStore> {
    inner: ClusterPipeline<S>,
    assignment: ClusterAssignment,
    stats: RunStats,
}

impl<S: KeyValueStore> ClusterOutcome<S> {
    pub fn index(&self) -> &AddressIndex<S> {
        &self.inner.index
    }

    pub fn assignment(&self) -> &ClusterAssignment {
        &self.assignment
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn ledger(&self) -> Arc<dyn LedgerSource> {
        Arc::clone(&self.inner.ledger)
    }

    pub fn lookup(&self, address: &Address) -> Result<AddressId> {
        self.inner.index.lookup(address)
    }

    pub fn reverse_lookup(&self, id: AddressId) -> Result<Address> {
        self.inner.index.reverse_lookup(id)
    }

    pub fn cluster_of(&self, id: AddressId) -> Option<AddressId> {
        self.assignment.cluster_of(id)
    }
}

#[cfg(feature = "rocks")]
mod rocks {
    use std::sync::Arc;

    use cospend_common::Result;
    use cospend_core::config::ClusterConfig;
    use cospend_core::ledger::JsonLinesLedger;
    use cospend_storage::{AddressIndex, RocksConfig, RocksStore};

    use super::{ClusterPipeline, ScratchDir};

    impl ClusterPipeline<RocksStore> {
        /// Pipeline over the configured ledger file and RocksDB index
        pub fn open(config: &ClusterConfig) -> Result<Self> {
            let scratch = if config.index.scratch {
                Some(ScratchDir::acquire(&config.index.path)?)
            } else {
                None
            };

            let store = RocksStore::open(&RocksConfig::from(&config.index))?;
            let index = AddressIndex::open(store, config.index.key_encoding)?;
            let ledger = JsonLinesLedger::new(&config.ledger.path)
                .with_max_height(config.ledger.max_height);

            let pipeline = ClusterPipeline::new(Arc::new(ledger), index, config.pipeline.clone());
            Ok(match scratch {
                Some(scratch) => pipeline.with_scratch(scratch),
                None => pipeline,
            })
        }
    }
}
