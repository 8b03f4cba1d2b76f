//! Persisted roots array.
//!
//! The file is a flat array of little-endian `u32`, one per identity, with no
//! header. It is written to a temporary sibling and renamed into place once
//! complete.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cospend_common::{Error, Result};
use cospend_core::types::AddressId;
use serde::Serialize;
use tracing::{debug, info};

const ENTRY_BYTES: usize = std::mem::size_of::<AddressId>();

/// Write `roots` to `path`, replacing any previous file
pub fn write_cluster_file(path: impl AsRef<Path>, roots: &[AddressId]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    let mut writer = BufWriter::with_capacity(1 << 20, file);
    for root in roots {
        writer.write_all(&root.to_le_bytes())?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| Error::storage(format!("Failed to flush {}: {}", tmp.display(), e)))?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;

    info!("Wrote {} cluster roots to {}", roots.len(), path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Every entry must point at an in-range identity that is its own root
fn check_flattened(roots: &[AddressId]) -> std::result::Result<(), String> {
    for (id, &root) in roots.iter().enumerate() {
        let valid = roots.get(root as usize).map_or(false, |&r| r == root);
        if !valid {
            return Err(format!("identity {} points at {}, which is not a root", id, root));
        }
    }
    Ok(())
}

/// Summary statistics of a cluster assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClusterSummary {
    /// Number of identities
    pub identities: u64,

    /// Number of distinct clusters
    pub clusters: u64,

    /// Size of the largest cluster
    pub largest_cluster: u64,

    /// Clusters holding a single identity
    pub singletons: u64,
}

/// Read-only identity → cluster root mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    roots: Vec<AddressId>,
}

impl ClusterAssignment {
    /// Wrap a roots array; every entry must name a root inside the array
    pub fn from_roots(roots: Vec<AddressId>) -> Result<Self> {
        check_flattened(&roots).map_err(Error::corrupt_cluster_file)?;
        Ok(Self { roots })
    }

    /// Load and check a roots file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        if bytes.len() % ENTRY_BYTES != 0 {
            return Err(Error::corrupt_cluster_file(format!(
                "{} has {} bytes, not a multiple of {}",
                path.display(),
                bytes.len(),
                ENTRY_BYTES
            )));
        }

        let roots: Vec<AddressId> = bytes
            .chunks_exact(ENTRY_BYTES)
            .map(|chunk| AddressId::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        check_flattened(&roots)
            .map_err(|msg| Error::corrupt_cluster_file(format!("{}: {}", path.display(), msg)))?;

        debug!("Loaded {} cluster roots from {}", roots.len(), path.display());
        Ok(Self { roots })
    }

    /// Cluster representative of `id`
    #[inline]
    pub fn cluster_of(&self, id: AddressId) -> Option<AddressId> {
        self.roots.get(id as usize).copied()
    }

    /// Number of identities sharing the cluster of `id`
    pub fn cluster_size(&self, id: AddressId) -> Option<u64> {
        let root = self.cluster_of(id)?;
        Some(self.roots.iter().filter(|&&r| r == root).count() as u64)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn as_slice(&self) -> &[AddressId] {
        &self.roots
    }

    pub fn summary(&self) -> ClusterSummary {
        let mut sizes = vec![0u32; self.roots.len()];
        for &root in &self.roots {
            sizes[root as usize] += 1;
        }

        let mut summary = ClusterSummary {
            identities: self.roots.len() as u64,
            ..Default::default()
        };
        for &size in sizes.iter().filter(|&&s| s > 0) {
            summary.clusters += 1;
            summary.largest_cluster = summary.largest_cluster.max(size as u64);
            if size == 1 {
                summary.singletons += 1;
            }
        }
        summary
    }
}
