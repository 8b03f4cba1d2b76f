//! Final pass: flatten the forest and persist the roots array.

use std::path::Path;

use cospend_common::Result;
use cospend_core::union_find::DisjointSet;
use cospend_storage::{write_cluster_file, ClusterAssignment};
use tracing::info;

/// Writes the identity → root array once all unions are applied
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterMaterializer;

impl ClusterMaterializer {
    pub fn new() -> Self {
        ClusterMaterializer
    }

    /// Resolve every root, persist them to `path` and return the assignment
    pub fn run(&self, forest: &mut DisjointSet, path: impl AsRef<Path>) -> Result<ClusterAssignment> {
        info!("Reading union-find roots");
        let assignment = ClusterAssignment::from_roots(forest.roots())?;
        write_cluster_file(path.as_ref(), assignment.as_slice())?;

        let summary = assignment.summary();
        info!(
            identities = summary.identities,
            clusters = summary.clusters,
            largest_cluster = summary.largest_cluster,
            singletons = summary.singletons,
            "Cluster assignment materialized"
        );
        Ok(assignment)
    }
}
