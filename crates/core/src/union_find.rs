//! Weighted union-find with path halving over dense address identities.
//!
//! The forest is two flat `u32` arrays, so `find`/`union` never allocate.
//! Identities passed in must be `< len()`; they always come from the
//! address index, so an out-of-range identity is a caller bug and panics
//! on the slice bounds check.

use crate::types::AddressId;

/// Disjoint-set forest sized to the identity space
#[derive(Debug, Clone)]
pub struct DisjointSet {
    /// Parent pointer per identity; a root points at itself
    parent: Vec<AddressId>,

    /// Subtree size, only meaningful while the index is a root; bounded by
    /// `len()`, which never exceeds `u32::MAX`
    weight: Vec<u32>,

    /// Number of distinct roots
    components: usize,
}

impl DisjointSet {
    /// Create `n` singleton clusters; `n` may not exceed `AddressId::MAX`
    pub fn new(n: usize) -> Self {
        assert!(
            n <= AddressId::MAX as usize,
            "disjoint set larger than the identity space"
        );
        Self {
            parent: (0..n).map(|i| i as AddressId).collect(),
            weight: vec![1; n],
            components: n,
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of distinct clusters currently in the forest
    pub fn component_count(&self) -> usize {
        self.components
    }

    /// Representative of `p`, halving the path on the way up
    #[inline]
    pub fn find(&mut self, p: AddressId) -> AddressId {
        let mut j = p as usize;
        loop {
            let up = self.parent[j] as usize;
            if up == j {
                return j as AddressId;
            }
            let grand = self.parent[up];
            self.parent[j] = grand;
            j = grand as usize;
        }
    }

    /// Merge the clusters of `p` and `q`.
    ///
    /// Returns `true` when two distinct clusters were joined. The lighter
    /// root goes under the heavier one; on a tie `q`'s root survives.
    #[inline]
    pub fn union(&mut self, p: AddressId, q: AddressId) -> bool {
        let root_p = self.find(p);
        let root_q = self.find(q);
        if root_p == root_q {
            return false;
        }

        let (rp, rq) = (root_p as usize, root_q as usize);
        if self.weight[rp] > self.weight[rq] {
            self.parent[rq] = root_p;
            self.weight[rp] += self.weight[rq];
        } else {
            self.parent[rp] = root_q;
            self.weight[rq] += self.weight[rp];
        }
        self.components -= 1;
        true
    }

    pub fn connected(&mut self, p: AddressId, q: AddressId) -> bool {
        self.find(p) == self.find(q)
    }

    /// Representative of every identity, indexed by identity.
    ///
    /// Flattens the forest as a side effect; the partition is unchanged.
    pub fn roots(&mut self) -> Vec<AddressId> {
        let n = self.parent.len();
        let mut roots = Vec::with_capacity(n);
        for k in 0..n {
            roots.push(self.find(k as AddressId));
        }
        roots
    }
}
