//! Deterministic split of the sample index space across a process group
//!
//! With `chunk = ntimes / world_size`, worker rank `k` (1-based) owns
//! `[(k-1)*chunk, k*chunk)` and the coordinator (rank 0) keeps the tail
//! `[(world_size-1)*chunk, ntimes)`, which absorbs the remainder. Every
//! process computes the same partition from `(ntimes, world_size)`, so slice
//! lengths never need to be sent.

use crate::transport::Rank;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Contiguous index ranges owned by each rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Total number of samples
    pub ntimes: usize,
    /// Number of processes, coordinator included
    pub world_size: usize,
    /// Samples per worker
    pub chunk: usize,
}

/// Split `ntimes` samples across `world_size` processes
///
/// # Panics
/// Panics if `world_size` is zero.
pub fn partition(ntimes: usize, world_size: usize) -> Partition {
    assert!(world_size > 0, "world size must be positive");
    Partition {
        ntimes,
        world_size,
        chunk: ntimes / world_size,
    }
}

impl Partition {
    /// Index range owned by `rank`
    ///
    /// # Panics
    /// Panics if `rank` is outside the group.
    pub fn range_for(&self, rank: Rank) -> Range<usize> {
        assert!(
            rank < self.world_size,
            "rank {} outside group of {}",
            rank,
            self.world_size
        );
        if rank == 0 {
            self.coordinator_range()
        } else {
            (rank - 1) * self.chunk..rank * self.chunk
        }
    }

    /// The tail range kept by the coordinator
    ///
    /// The start is clamped to `ntimes` so the range is never inverted.
    pub fn coordinator_range(&self) -> Range<usize> {
        let start = ((self.world_size - 1) * self.chunk).min(self.ntimes);
        start..self.ntimes
    }

    /// Worker ranks in the order they are served and gathered
    pub fn worker_ranks(&self) -> Range<Rank> {
        1..self.world_size
    }

    /// `(rank, range)` for every process, in index order
    ///
    /// Workers come first, then the coordinator's tail.
    pub fn ranges_in_index_order(&self) -> Vec<(Rank, Range<usize>)> {
        self.worker_ranks()
            .map(|rank| (rank, self.range_for(rank)))
            .chain(std::iter::once((0, self.coordinator_range())))
            .collect()
    }
}
