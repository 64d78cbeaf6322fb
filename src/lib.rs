//! A fixed-capacity hash table spread over the ranks of a partitioned global address space,
//! built to deduplicate and index k-mers.
//!
//! Every rank owns an equal share of the table. Any rank can insert into or read from any other
//! rank's share with one-sided operations: the owning rank does not run any code to serve them.
//!
//! # Layout
//!
//! A record with hash `h` belongs to rank `h mod ranks`. Within that rank it goes into the first
//! free slot of the sequence `h mod C, (h + 1) mod C, ...`, where `C` is the per-rank capacity.
//! Probing never leaves the owning rank: if its `C` slots are taken, the insert fails, even if
//! other ranks still have room.
//!
//! # Claiming slots
//!
//! Each slot has an occupancy counter that starts at zero and is only ever incremented. To claim
//! a slot, a rank atomically increments its counter through the run's [`AtomicDomain`]; the one
//! rank that sees the old value zero owns the slot and writes the record into it. There are no
//! locks and no coordinator. Because counters never go back to zero, a slot is claimed at most
//! once and an entry is never overwritten or removed.
//!
//! # Phases
//!
//! A write into the local rank's share is done on the spot. A write into another rank's share is
//! only issued, and is tracked until [`HashMap::drain`]. Reads of other ranks' data are only
//! guaranteed to see their records after those ranks have drained and every rank has passed a
//! [`Rank::barrier`]. The table itself never synchronizes ranks; that is up to the caller:
//!
//! ```
//! use kmer_dht::kmer::KmerPair;
//! use kmer_dht::{AtomicDomain, Config, HashMap, World};
//!
//! let reads = ["ACGTT", "CGTTA", "GTTAC", "TTACG"];
//!
//! let world = World::new(Config::default().ranks(2)).unwrap();
//! let found = world.run(|rank| {
//!     let domain = AtomicDomain::new(rank);
//!     let map = HashMap::<KmerPair>::new(rank, 16);
//!
//!     // insert phase: each rank inserts its own share of the k-mers
//!     for kmer in reads.iter().skip(rank.rank_me()).step_by(rank.rank_n()) {
//!         let pair = KmerPair::parse(kmer, "FF").unwrap();
//!         assert!(map.insert(&pair, &domain));
//!     }
//!     map.drain();
//!     rank.barrier();
//!
//!     // lookup phase: every k-mer is visible from every rank
//!     reads
//!         .iter()
//!         .filter(|kmer| map.find(&kmer.parse().unwrap()).is_some())
//!         .count()
//! });
//! assert_eq!(found, vec![4, 4]);
//! ```
//!
//! # Ranks
//!
//! Ranks are provided by a [`World`]: an in-process address space in which every rank is a
//! thread, and one-sided operations against other ranks are executed by a pool of progress
//! threads. [`LocalHashMap`] is the single-process version of the table, with the same layout and
//! probing, for use as a baseline.

mod addressing;
mod atomic;
mod completion;
mod config;
mod error;
mod local;
mod map;
mod record;
mod registry;
mod segment;
mod world;

pub mod kmer;

#[cfg(feature = "serde")]
mod serde_impls;

pub use addressing::{Addressing, Probe};
pub use atomic::AtomicDomain;
pub use completion::{Completion, CompletionTracker};
pub use config::{Config, PROGRESS_THREADS_VAR, RANKS_VAR};
pub use error::{ConfigError, InsertError};
pub use local::LocalHashMap;
pub use map::{HashMap, Placement};
pub use record::{Key, Record};
pub use registry::{Registry, RemoteHandle};
pub use world::{Rank, World};
