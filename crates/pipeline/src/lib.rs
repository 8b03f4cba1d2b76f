//! Two-pass co-spend clustering over a transaction ledger.
//!
//! The indexing pass gives every output address a dense identity, the
//! clustering pass unions the identities spent together in one transaction,
//! and the materializer persists each identity's cluster root. An optional
//! export pass joins those roots back onto the ledger rows.

pub mod clustering;
pub mod export;
pub mod indexing;
pub mod materialize;
pub mod pipeline;
pub mod prefetch;
pub mod progress;

pub use clustering::{ClusteringPass, ClusteringStats};
pub use export::{ExportRow, ExportStats, Exporter};
pub use indexing::{IndexingPass, IndexingStats};
pub use materialize::ClusterMaterializer;
pub use pipeline::{
    ClusterOutcome, ClusterPipeline, ClusteredPipeline, IndexedPipeline, RunStats, ScratchDir,
};
pub use prefetch::{prefetch_blocks, BlockStream};
