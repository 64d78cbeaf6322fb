use crate::addressing::Addressing;
use crate::error::InsertError;
use crate::record::{Key, Record};
use std::fmt;

/// Single-process version of [`HashMap`](crate::HashMap).
///
/// Same addressing and the same claim-then-write order, but all slots live in local memory and
/// a claim is a plain check-then-set. Behaves exactly like a one-rank `HashMap`, which makes it
/// a convenient oracle for the distributed table.
///
/// # Examples
///
/// ```
/// use kmer_dht::kmer::KmerPair;
/// use kmer_dht::LocalHashMap;
///
/// let mut map = LocalHashMap::with_capacity(8);
/// let pair = KmerPair::parse("GATTACA", "AF").unwrap();
/// assert!(map.insert(pair));
/// assert_eq!(map.find(pair.kmer()), Some(pair));
/// assert_eq!(map.len(), 1);
/// ```
pub struct LocalHashMap<R> {
    addressing: Addressing,
    data: Box<[R]>,
    used: Box<[bool]>,
}

impl<R: Record> LocalHashMap<R> {
    /// A table with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            addressing: Addressing::new(1, capacity),
            data: vec![R::zeroed(); capacity].into_boxed_slice(),
            used: vec![false; capacity].into_boxed_slice(),
        }
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.addressing.capacity()
    }

    /// Number of claimed slots.
    pub fn len(&self) -> usize {
        self.used.iter().filter(|&&u| u).count()
    }

    /// Returns `true` if no slot is claimed.
    pub fn is_empty(&self) -> bool {
        !self.used.contains(&true)
    }

    /// Inserts `record`. Returns `false` if the table is full.
    pub fn insert(&mut self, record: R) -> bool {
        self.try_insert(record).is_ok()
    }

    /// Inserts `record` and returns the slot it was stored in.
    pub fn try_insert(&mut self, record: R) -> Result<usize, InsertError> {
        let hash = record.hash();
        for slot in self.addressing.probe(hash) {
            if self.request_slot(slot) {
                self.data[slot] = record;
                return Ok(slot);
            }
        }
        Err(InsertError::Full {
            rank: 0,
            capacity: self.size(),
        })
    }

    /// Looks up the record stored under `key`.
    pub fn find(&self, key: &R::Key) -> Option<R> {
        self.addressing
            .probe(key.hash())
            .filter(|&slot| self.used[slot])
            .map(|slot| self.data[slot])
            .find(|record| record.key() == key)
    }

    fn request_slot(&mut self, slot: usize) -> bool {
        if self.used[slot] {
            false
        } else {
            self.used[slot] = true;
            true
        }
    }
}

impl<R> fmt::Debug for LocalHashMap<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHashMap")
            .field("capacity", &self.addressing.capacity())
            .field("len", &self.used.iter().filter(|&&u| u).count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn entry(key: u64, value: u64) -> Entry {
        Entry {
            key: Id(key),
            value,
        }
    }

    #[test]
    fn new() {
        let map = LocalHashMap::<Entry>::with_capacity(16);
        assert_eq!(map.size(), 16);
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn find_empty() {
        let map = LocalHashMap::<Entry>::with_capacity(16);
        assert_eq!(map.find(&Id(42)), None);
    }

    #[test]
    fn slots_follow_hash() {
        let mut map = LocalHashMap::with_capacity(4);
        for k in 0..4 {
            assert_eq!(map.try_insert(entry(k, k)), Ok(k as usize));
        }
        assert_eq!(
            map.try_insert(entry(0, 99)),
            Err(InsertError::Full {
                rank: 0,
                capacity: 4
            })
        );
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn collisions_probe_forward() {
        let mut map = LocalHashMap::with_capacity(8);
        assert_eq!(map.try_insert(entry(7, 1)), Ok(7));
        assert_eq!(map.try_insert(entry(15, 2)), Ok(0));
        assert_eq!(map.try_insert(entry(23, 3)), Ok(1));
        assert_eq!(map.find(&Id(7)), Some(entry(7, 1)));
        assert_eq!(map.find(&Id(15)), Some(entry(15, 2)));
        assert_eq!(map.find(&Id(23)), Some(entry(23, 3)));
        assert_eq!(map.find(&Id(31)), None);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut map = LocalHashMap::with_capacity(8);
        assert_eq!(map.try_insert(entry(3, 1)), Ok(3));
        assert_eq!(map.try_insert(entry(3, 2)), Ok(4));
        assert_eq!(map.len(), 2);
        // first writer in probe order wins the lookup
        assert_eq!(map.find(&Id(3)), Some(entry(3, 1)));
    }

    #[test]
    fn zero_capacity() {
        let mut map = LocalHashMap::with_capacity(0);
        assert!(!map.insert(entry(1, 1)));
        assert_eq!(map.find(&Id(1)), None);
    }
}
