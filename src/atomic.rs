use crate::registry::RemoteHandle;
use crate::world::Rank;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The context in which occupancy counters are updated atomically.
///
/// A domain is created once per run by the caller and passed by reference to every
/// [`HashMap::insert`](crate::HashMap::insert); the table never owns one. All claims against the
/// same memory must go through a single shared domain: local claims update the counter directly,
/// remote claims are executed by the progress engine on the owner's memory, and both act on the
/// same atomic word, so they serialize with each other.
pub struct AtomicDomain {
    rank: Rank,
    remote_ops: AtomicU64,
}

impl AtomicDomain {
    /// Creates the domain for this rank. Collective.
    pub fn new(rank: &Rank) -> Self {
        Self {
            rank: rank.clone(),
            remote_ops: AtomicU64::new(0),
        }
    }

    /// Atomically increments the counter for `slot` in the segment named by `target`, and returns
    /// the value it held before.
    pub fn fetch_inc(&self, target: &RemoteHandle, slot: usize, ordering: Ordering) -> u64 {
        if let Some(segment) = target.local() {
            return segment.occupancy(slot).fetch_add(1, ordering);
        }
        self.remote_ops.fetch_add(1, Ordering::Relaxed);
        let segment = target.remote();
        segment.check::<()>(slot);
        self.rank
            .rpc(move || segment.occupancy(slot).fetch_add(1, ordering))
    }

    /// Number of atomics this domain has sent to other ranks.
    pub fn remote_ops(&self) -> u64 {
        self.remote_ops.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for AtomicDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicDomain")
            .field("rank", &self.rank.rank_me())
            .field("remote_ops", &self.remote_ops())
            .finish()
    }
}
