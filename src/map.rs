use crate::addressing::Addressing;
use crate::atomic::AtomicDomain;
use crate::completion::CompletionTracker;
use crate::error::InsertError;
use crate::record::{Key, Record};
use crate::registry::Registry;
use crate::segment::Segment;
use crate::world::Rank;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::Ordering;

/// Where an inserted record was stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Placement {
    /// The rank that owns the slot.
    pub rank: usize,
    /// The slot on that rank.
    pub slot: usize,
}

/// A fixed-capacity hash table spread over all ranks of a [`World`](crate::World).
///
/// Every rank holds `capacity` slots. A record lives on rank `hash mod ranks`, in the first slot
/// of its probe sequence that it manages to claim (see [`Addressing`]). Slots are claimed with a
/// remote atomic increment of the slot's occupancy counter, so any rank can insert into any other
/// rank's memory without that rank's cooperation and without locks.
///
/// Writes to other ranks are asynchronous. A rank's writes are only guaranteed to be visible once
/// it has called [`drain`](HashMap::drain); a typical run therefore looks like:
///
/// 1. every rank inserts its share of the records,
/// 2. every rank calls [`drain`](HashMap::drain),
/// 3. all ranks meet at a [`barrier`](Rank::barrier),
/// 4. any rank may now [`find`](HashMap::find) any record.
///
/// The table never removes or overwrites an entry, and does not suppress duplicates: inserting the
/// same key twice stores it twice.
///
/// # Examples
///
/// ```
/// use kmer_dht::kmer::KmerPair;
/// use kmer_dht::{AtomicDomain, Config, HashMap, World};
///
/// let world = World::new(Config::default().ranks(2)).unwrap();
/// world.run(|rank| {
///     let domain = AtomicDomain::new(rank);
///     let map = HashMap::<KmerPair>::new(rank, 64);
///
///     let mine = KmerPair::parse(["ACGTA", "CCGTT"][rank.rank_me()], "FA").unwrap();
///     assert!(map.insert(&mine, &domain));
///
///     map.drain();
///     rank.barrier();
///
///     for kmer in ["ACGTA", "CCGTT"] {
///         let key = kmer.parse().unwrap();
///         assert_eq!(map.find(&key).unwrap().kmer(), &key);
///     }
/// });
/// ```
pub struct HashMap<R> {
    rank: Rank,
    addressing: Addressing,
    registry: Registry,
    inserts: CompletionTracker,
    _records: PhantomData<fn(R) -> R>,
}

impl<R: Record> HashMap<R> {
    /// Allocates `capacity` slots on every rank. Collective: all ranks must call this with the
    /// same `capacity`, in the same order relative to other distributed objects.
    ///
    /// Blocks until every rank has allocated its share. The table's memory is released once it
    /// has been dropped on every rank.
    pub fn new(rank: &Rank, capacity: usize) -> Self {
        let segment = Segment::new(capacity, mem::size_of::<R>());
        Self {
            rank: rank.clone(),
            addressing: Addressing::new(rank.rank_n(), capacity),
            registry: Registry::publish(rank, segment),
            inserts: CompletionTracker::new(),
            _records: PhantomData,
        }
    }

    /// Number of slots on each rank.
    pub fn size(&self) -> usize {
        self.addressing.capacity()
    }

    /// How hashes map to ranks and slots in this table.
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// The handles of every rank's share of this table.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The rank that owns every slot `hash` may be stored in.
    pub fn target_rank(&self, hash: u64) -> usize {
        self.addressing.target_rank(hash)
    }

    /// Inserts `record`, claiming slots through `domain`.
    ///
    /// Returns `false` if every slot on the record's owning rank is already taken.
    pub fn insert(&self, record: &R, domain: &AtomicDomain) -> bool {
        self.try_insert(record, domain).is_ok()
    }

    /// Inserts `record`, claiming slots through `domain`, and reports where it was stored.
    ///
    /// A remote write is only issued, not completed, when this returns. See
    /// [`drain`](HashMap::drain).
    pub fn try_insert(&self, record: &R, domain: &AtomicDomain) -> Result<Placement, InsertError> {
        let hash = record.hash();
        let rank = self.target_rank(hash);
        for slot in self.addressing.probe(hash) {
            if self.try_claim(rank, slot, domain) {
                self.write(rank, slot, record);
                return Ok(Placement { rank, slot });
            }
        }
        tracing::warn!(
            rank = self.rank.rank_me(),
            target = rank,
            capacity = self.size(),
            "no free slot left on target rank"
        );
        Err(InsertError::Full {
            rank,
            capacity: self.size(),
        })
    }

    /// Looks up the record stored under `key`.
    ///
    /// Only sees records from other ranks once those ranks have drained their inserts and all
    /// ranks have passed a barrier.
    pub fn find(&self, key: &R::Key) -> Option<R> {
        let hash = key.hash();
        let rank = self.target_rank(hash);
        self.addressing
            .probe(hash)
            .filter(|&slot| self.occupied(rank, slot))
            .map(|slot| self.read(rank, slot))
            .find(|record| record.key() == key)
    }

    /// Blocks until every remote write this rank has issued has landed.
    ///
    /// This only covers this rank's own writes. Before reading data written by other ranks, all
    /// ranks must drain and then meet at a barrier. The table keeps accepting inserts afterwards.
    pub fn drain(&self) {
        tracing::debug!(
            rank = self.rank.rank_me(),
            pending = self.inserts.pending(),
            "draining remote writes"
        );
        self.inserts.drain();
        tracing::debug!(rank = self.rank.rank_me(), "remote writes drained");
    }

    /// Number of remote writes issued but not known to have landed.
    pub fn pending_writes(&self) -> usize {
        self.inserts.pending()
    }

    /// Number of claimed slots in this rank's own share of the table.
    pub fn local_occupancy(&self) -> usize {
        self.registry.local().occupied_count()
    }

    /// Tries to claim `slot` on `rank`. Returns `true` only for the one caller that moves the
    /// slot's occupancy counter from 0 to 1.
    ///
    /// # Panics
    ///
    /// Panics if `rank` or `slot` is out of range.
    pub fn try_claim(&self, rank: usize, slot: usize, domain: &AtomicDomain) -> bool {
        let target = self.registry.resolve(rank);
        let claimed = domain.fetch_inc(target, slot, Ordering::AcqRel) == 0;
        tracing::trace!(
            rank = self.rank.rank_me(),
            target = rank,
            slot,
            claimed,
            "claim"
        );
        claimed
    }

    /// Stores `record` in `slot` on `rank`.
    ///
    /// The store is synchronous if `rank` is this rank. Otherwise a one-sided write is issued and
    /// tracked until the next [`drain`](HashMap::drain).
    ///
    /// # Panics
    ///
    /// Panics if `rank` or `slot` is out of range.
    pub fn write(&self, rank: usize, slot: usize, record: &R) {
        let target = self.registry.resolve(rank);
        match target.local() {
            Some(segment) => segment.store(slot, record),
            None => {
                tracing::trace!(rank = self.rank.rank_me(), target = rank, slot, "rput");
                self.rank
                    .rput(target.remote(), slot, *record, self.inserts.register());
            }
        }
    }

    /// Reads the record in `slot` on `rank`. Blocks until a remote value arrives.
    ///
    /// # Panics
    ///
    /// Panics if `rank` or `slot` is out of range.
    pub fn read(&self, rank: usize, slot: usize) -> R {
        let target = self.registry.resolve(rank);
        match target.local() {
            Some(segment) => segment.load(slot),
            None => self.rank.rget(target.remote(), slot),
        }
    }

    /// Whether `slot` on `rank` has been claimed. Never changes the slot.
    ///
    /// A `false` answer is only advisory: another rank may claim the slot right after.
    ///
    /// # Panics
    ///
    /// Panics if `rank` or `slot` is out of range.
    pub fn occupied(&self, rank: usize, slot: usize) -> bool {
        let target = self.registry.resolve(rank);
        let used = match target.local() {
            Some(segment) => segment.occupancy(slot).load(Ordering::Acquire),
            None => self.rank.rget_occupancy(target.remote(), slot),
        };
        used != 0
    }
}

impl<R> fmt::Debug for HashMap<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMap")
            .field("rank", &self.rank.rank_me())
            .field("ranks", &self.addressing.ranks())
            .field("capacity", &self.addressing.capacity())
            .field("pending_writes", &self.inserts.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, World};
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
    #[repr(transparent)]
    struct Id(u64);

    impl Key for Id {
        fn hash(&self) -> u64 {
            self.0
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
    #[repr(C)]
    struct Entry {
        key: Id,
        value: u64,
    }

    impl Record for Entry {
        type Key = Id;
        fn key(&self) -> &Id {
            &self.key
        }
    }

    fn entry(key: u64) -> Entry {
        Entry {
            key: Id(key),
            value: key * 10 + 1,
        }
    }

    fn world(ranks: usize) -> World {
        World::new(Config::default().ranks(ranks).progress_threads(2)).unwrap()
    }

    #[test]
    fn placement_follows_addressing() {
        world(3).run(|rank| {
            let domain = AtomicDomain::new(rank);
            let map = HashMap::<Entry>::new(rank, 8);
            if rank.rank_me() == 0 {
                // 10 % 3 = 1, 10 % 8 = 2
                assert_eq!(
                    map.try_insert(&entry(10), &domain),
                    Ok(Placement { rank: 1, slot: 2 })
                );
                // same rank, same first slot, so probe moves on
                assert_eq!(
                    map.try_insert(&entry(34), &domain),
                    Ok(Placement { rank: 1, slot: 3 })
                );
            }
            map.drain();
            rank.barrier();
            assert!(map.occupied(1, 2));
            assert!(map.occupied(1, 3));
            assert!(!map.occupied(1, 4));
            assert_eq!(map.read(1, 2), entry(10));
            assert_eq!(map.read(1, 3), entry(34));
            let expected = if rank.rank_me() == 1 { 2 } else { 0 };
            assert_eq!(map.local_occupancy(), expected);
        });
    }

    #[test]
    fn local_writes_are_not_tracked() {
        world(2).run(|rank| {
            let domain = AtomicDomain::new(rank);
            let map = HashMap::<Entry>::new(rank, 4);
            let me = rank.rank_me();
            // claim and write a slot on our own rank
            assert!(map.try_claim(me, 0, &domain));
            map.write(me, 0, &entry(7));
            assert_eq!(map.pending_writes(), 0);
            assert_eq!(map.read(me, 0), entry(7));
            assert_eq!(domain.remote_ops(), 0);
        });
    }

    #[test]
    fn remote_claims_go_through_the_domain() {
        world(2).run(|rank| {
            let domain = AtomicDomain::new(rank);
            let map = HashMap::<Entry>::new(rank, 4);
            let me = rank.rank_me();
            let peer = 1 - me;
            // each rank claims slot `me` on its peer
            assert!(map.try_claim(peer, me, &domain));
            assert_eq!(domain.remote_ops(), 1);
            rank.barrier();
            assert!(!map.try_claim(peer, me, &domain));
            assert_eq!(domain.remote_ops(), 2);
            // the peer's claim landed in our memory
            assert!(map.occupied(me, peer));
            assert!(map.occupied(peer, me));
            assert!(!map.occupied(peer, 2));
        });
    }

    #[test]
    fn find_reads_back_after_drain() {
        let found = world(4).run(|rank| {
            let domain = AtomicDomain::new(rank);
            let map = HashMap::<Entry>::new(rank, 16);
            for k in (0..32).filter(|k| k % 4 == rank.rank_me() as u64) {
                assert!(map.insert(&entry(k), &domain));
            }
            map.drain();
            assert_eq!(map.pending_writes(), 0);
            rank.barrier();
            (0..32).filter(|&k| map.find(&Id(k)) == Some(entry(k))).count()
        });
        assert_eq!(found, vec![32; 4]);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        world(2).run(|rank| {
            let domain = AtomicDomain::new(rank);
            let map = HashMap::<Entry>::new(rank, 0);
            assert_eq!(map.size(), 0);
            assert_eq!(
                map.try_insert(&entry(3), &domain),
                Err(InsertError::Full {
                    rank: 1,
                    capacity: 0
                })
            );
            assert_eq!(map.find(&Id(3)), None);
        });
    }
}
