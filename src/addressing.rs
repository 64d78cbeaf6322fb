use std::iter::FusedIterator;

/// Maps a hash to the rank that owns it and to the local slots probed on that rank.
///
/// The owning rank is `hash mod ranks`. On that rank, probe `p` visits slot
/// `(hash + p) mod capacity`, for `p` in `0..capacity`. The sequence only depends on the hash, so
/// every rank walks the same slots for the same key, and a collision never spills over onto
/// another rank: once the owner's `capacity` slots are taken, inserts for that rank fail even if
/// other ranks have room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Addressing {
    ranks: usize,
    capacity: usize,
}

impl Addressing {
    /// Addressing for `ranks` ranks that each hold `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `ranks` is zero.
    pub fn new(ranks: usize, capacity: usize) -> Self {
        assert_ne!(ranks, 0, "a table needs at least one rank");
        Self { ranks, capacity }
    }

    /// Number of ranks the table is spread over.
    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Number of slots on each rank.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The rank that owns every slot `hash` may be stored in.
    #[inline]
    pub fn target_rank(&self, hash: u64) -> usize {
        (hash % self.ranks as u64) as usize
    }

    /// The local slot visited by the `probe`th attempt for `hash`.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero.
    #[inline]
    pub fn slot(&self, hash: u64, probe: usize) -> usize {
        let capacity = self.capacity as u64;
        // reduce first so that hashes close to u64::MAX do not wrap mid-sequence
        ((hash % capacity + probe as u64 % capacity) % capacity) as usize
    }

    /// All slots probed for `hash`, in probe order.
    pub fn probe(&self, hash: u64) -> Probe {
        Probe {
            addressing: *self,
            hash,
            next: 0,
        }
    }
}

/// Iterator over the slots visited for one hash. Created by [`Addressing::probe`].
#[derive(Clone, Debug)]
pub struct Probe {
    addressing: Addressing,
    hash: u64,
    next: usize,
}

impl Iterator for Probe {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.addressing.capacity {
            return None;
        }
        let slot = self.addressing.slot(self.hash, self.next);
        self.next += 1;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.addressing.capacity - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Probe {}
impl FusedIterator for Probe {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_rank_is_hash_mod_ranks() {
        let a = Addressing::new(4, 8);
        assert_eq!(a.target_rank(0), 0);
        assert_eq!(a.target_rank(5), 1);
        assert_eq!(a.target_rank(11), 3);
        assert_eq!(Addressing::new(1, 8).target_rank(u64::MAX), 0);
    }

    #[test]
    fn probe_wraps_around_capacity() {
        let a = Addressing::new(3, 4);
        assert_eq!(a.probe(2).collect::<Vec<_>>(), vec![2, 3, 0, 1]);
        assert_eq!(a.probe(7).collect::<Vec<_>>(), vec![3, 0, 1, 2]);
    }

    #[test]
    fn probe_ignores_rank_count() {
        // same hash, same local slots, no matter how many ranks there are
        let one = Addressing::new(1, 16).probe(12345).collect::<Vec<_>>();
        let many = Addressing::new(7, 16).probe(12345).collect::<Vec<_>>();
        assert_eq!(one, many);
    }

    #[test]
    fn probe_visits_every_slot_once() {
        let a = Addressing::new(2, 13);
        for hash in [0, 1, 12, 13, u64::MAX, u64::MAX - 1] {
            let mut slots = a.probe(hash).collect::<Vec<_>>();
            assert_eq!(slots.len(), 13);
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), 13, "hash {} revisits a slot", hash);
        }
    }

    #[test]
    fn zero_capacity_probes_nothing() {
        let a = Addressing::new(2, 0);
        assert_eq!(a.probe(42).len(), 0);
        assert_eq!(a.probe(42).next(), None);
    }

    #[test]
    #[should_panic]
    fn zero_ranks() {
        let _ = Addressing::new(0, 4);
    }
}
