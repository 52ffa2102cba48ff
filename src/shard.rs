//! Two-pass sharding: a pre-pass records every question id in stream order, the list is
//! cut into contiguous slices, and the main pass only admits ids from its own slice.

use crate::config::ShardSpec;
use ahash::AHashSet;
use anyhow::{bail, Result};
use std::ops::Range;

/// Split `len` items into `n` contiguous ranges as evenly as possible.
/// The first `len % n` ranges get one extra item.
pub fn split_even(len: usize, n: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let base = len / n;
    let extra = len % n;
    let mut out = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        out.push(start..start + size);
        start += size;
    }
    out
}

/// Ordered question ids observed by the pre-pass.
#[derive(Debug, Default)]
pub struct ShardPlanner {
    ids: Vec<u64>,
}

impl ShardPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect<I: IntoIterator<Item = u64>>(ids: I) -> Self {
        Self { ids: ids.into_iter().collect() }
    }

    #[inline]
    pub fn observe(&mut self, id: u64) {
        self.ids.push(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The slice owned by `spec.index`.
    pub fn assign(&self, spec: ShardSpec) -> Result<ShardAssignment> {
        if spec.count == 0 || spec.index >= spec.count {
            bail!("invalid shard spec {spec}");
        }
        let range = split_even(self.ids.len(), spec.count)[spec.index].clone();
        tracing::info!(
            shard = %spec,
            assigned = range.len(),
            total = self.ids.len(),
            "shard slice assigned"
        );
        Ok(ShardAssignment {
            spec,
            assigned: self.ids[range].iter().copied().collect(),
            seen: AHashSet::new(),
        })
    }
}

/// Main-pass membership filter for one shard.
#[derive(Debug)]
pub struct ShardAssignment {
    spec: ShardSpec,
    assigned: AHashSet<u64>,
    seen: AHashSet<u64>,
}

impl ShardAssignment {
    pub fn spec(&self) -> ShardSpec {
        self.spec
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// True if `id` belongs to this shard; records that it was seen.
    pub fn admits(&mut self, id: u64) -> bool {
        if self.assigned.contains(&id) {
            self.seen.insert(id);
            true
        } else {
            false
        }
    }

    /// Assigned ids the main pass never encountered, ascending.
    pub fn missing_ids(&self) -> Vec<u64> {
        let mut missing: Vec<u64> = self.assigned.difference(&self.seen).copied().collect();
        missing.sort_unstable();
        missing
    }
}
