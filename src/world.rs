use crate::completion::{Completion, Reply};
use crate::config::Config;
use crate::error::ConfigError;
use crate::segment::Segment;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// A set of ranks sharing one partitioned global address space.
///
/// Ranks run as threads of this process. Each rank owns the segments it allocates; other ranks
/// reach them only through one-sided operations, which the world's progress engine executes on
/// the owner's memory without involving the owning rank's thread.
///
/// # Examples
///
/// ```
/// use kmer_dht::{Config, World};
///
/// let world = World::new(Config::default().ranks(3)).unwrap();
/// let ids = world.run(|rank| rank.rank_me());
/// assert_eq!(ids, vec![0, 1, 2]);
/// ```
pub struct World {
    shared: Arc<Shared>,
    thread_name: String,
}

pub(crate) struct Shared {
    ranks: usize,
    gate: Gate,
    /// Executes one-sided operations that target another rank.
    progress: rayon::ThreadPool,
    board: Board,
    /// Per rank: how many distributed objects it has constructed so far.
    objects: Box<[AtomicU64]>,
    /// Set once a rank has panicked. Every collective wait fails from then on.
    poisoned: AtomicBool,
}

/// Payload of the panic raised on ranks that were left waiting for a rank that panicked.
struct Abandoned;

impl Shared {
    fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
        // a waiter checks the flag under its lock, so take each lock before notifying
        drop(self.gate.state.lock());
        self.gate.opened.notify_all();
        drop(self.board.postings.lock());
        self.board.changed.notify_all();
    }

    fn check_poisoned(&self) {
        if self.poisoned.load(Ordering::SeqCst) {
            panic::resume_unwind(Box::new(Abandoned));
        }
    }
}

/// A reusable barrier over all ranks.
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    opened: Condvar,
}

#[derive(Default)]
struct GateState {
    arrived: usize,
    generation: u64,
}

/// Where ranks publish the segments of distributed objects.
#[derive(Default)]
struct Board {
    postings: Mutex<HashMap<(u64, usize), Posting>>,
    changed: Condvar,
}

/// A published segment, held until every other rank has looked it up.
struct Posting {
    segment: Arc<Segment>,
    unclaimed: usize,
}

impl World {
    /// Builds a world as described by `config`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let prefix = config.thread_name_prefix().to_owned();
        let progress = rayon::ThreadPoolBuilder::new()
            .num_threads(config.progress_thread_count())
            .thread_name(move |i| format!("{}-progress-{}", prefix, i))
            .build()?;
        let ranks = config.rank_count();
        tracing::debug!(
            ranks,
            progress_threads = config.progress_thread_count(),
            "world started"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                ranks,
                gate: Gate::default(),
                progress,
                board: Board::default(),
                objects: (0..ranks).map(|_| AtomicU64::new(0)).collect(),
                poisoned: AtomicBool::new(false),
            }),
            thread_name: config.thread_name_prefix().to_owned(),
        })
    }

    /// Number of ranks in this world.
    pub fn rank_n(&self) -> usize {
        self.shared.ranks
    }

    /// Runs `f` once on every rank, each on its own thread, and returns the results in rank
    /// order.
    ///
    /// `f` runs collectively: calls it makes that are documented as collective (constructing a
    /// [`HashMap`](crate::HashMap), [`Rank::barrier`]) must be made by every rank in the same
    /// order.
    ///
    /// # Panics
    ///
    /// If `f` panics on any rank, the world is poisoned: ranks waiting at a [`Rank::barrier`] or
    /// on a collective construction are released by a panic of their own, and `run` resumes the
    /// first rank's panic once every rank has stopped. A poisoned world cannot run again, so this
    /// also panics if an earlier run failed.
    pub fn run<F, T>(&self, f: F) -> Vec<T>
    where
        F: Fn(&Rank) -> T + Sync,
        T: Send,
    {
        assert!(
            !self.shared.poisoned.load(Ordering::SeqCst),
            "world was poisoned by a rank that panicked in an earlier run"
        );
        let f = &f;
        let results: Vec<thread::Result<T>> = thread::scope(|s| {
            let handles: Vec<_> = (0..self.shared.ranks)
                .map(|me| {
                    let rank = Rank {
                        me,
                        shared: Arc::clone(&self.shared),
                    };
                    thread::Builder::new()
                        .name(format!("{}-rank-{}", self.thread_name, me))
                        .spawn_scoped(s, move || {
                            panic::catch_unwind(AssertUnwindSafe(|| f(&rank))).map_err(|e| {
                                if !e.is::<Abandoned>() {
                                    tracing::error!(rank = me, "rank panicked, poisoning world");
                                }
                                rank.shared.poison();
                                e
                            })
                        })
                        .expect("failed to spawn rank thread")
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().and_then(|r| r))
                .collect()
        });

        let mut values = Vec::with_capacity(results.len());
        let mut abandoned = None;
        for result in results {
            match result {
                Ok(v) => values.push(v),
                Err(e) if e.is::<Abandoned>() => {
                    abandoned.get_or_insert(e);
                }
                Err(e) => panic::resume_unwind(e),
            }
        }
        if let Some(e) = abandoned {
            panic::resume_unwind(e);
        }
        values
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("ranks", &self.shared.ranks)
            .field("progress_threads", &self.shared.progress.current_num_threads())
            .finish()
    }
}

/// One rank's view of its [`World`].
#[derive(Clone)]
pub struct Rank {
    me: usize,
    shared: Arc<Shared>,
}

impl Rank {
    /// This rank's id, in `0..rank_n()`.
    pub fn rank_me(&self) -> usize {
        self.me
    }

    /// Number of ranks.
    pub fn rank_n(&self) -> usize {
        self.shared.ranks
    }

    /// Blocks until every rank has called `barrier`. Collective.
    ///
    /// # Panics
    ///
    /// Panics if another rank of the run has panicked.
    pub fn barrier(&self) {
        let shared = &*self.shared;
        let mut state = shared.gate.state.lock();
        state.arrived += 1;
        if state.arrived == shared.ranks {
            state.arrived = 0;
            state.generation += 1;
            shared.gate.opened.notify_all();
            return;
        }
        let generation = state.generation;
        while state.generation == generation {
            shared.check_poisoned();
            shared.gate.opened.wait(&mut state);
        }
    }

    /// Id for the next distributed object this rank constructs.
    pub(crate) fn next_object_id(&self) -> u64 {
        self.shared.objects[self.me].fetch_add(1, Ordering::Relaxed)
    }

    /// Makes this rank's `segment` of object `id` visible to all other ranks.
    ///
    /// The board only holds the segment until every other rank has looked it up once.
    pub(crate) fn publish(&self, id: u64, segment: &Arc<Segment>) {
        let readers = self.shared.ranks - 1;
        if readers == 0 {
            return;
        }
        let board = &self.shared.board;
        let posting = Posting {
            segment: Arc::clone(segment),
            unclaimed: readers,
        };
        let previous = board.postings.lock().insert((id, self.me), posting);
        assert!(
            previous.is_none(),
            "rank {} published object {} twice",
            self.me,
            id
        );
        board.changed.notify_all();
    }

    /// Waits until `rank` has published its segment of object `id`. Each rank may look up a
    /// given segment only once.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is out of range or is this rank, or if another rank of the run panics
    /// while this one is waiting.
    pub(crate) fn lookup(&self, id: u64, rank: usize) -> Arc<Segment> {
        assert!(
            rank < self.shared.ranks,
            "rank {} out of range for {} ranks",
            rank,
            self.shared.ranks
        );
        assert_ne!(rank, self.me, "rank {} looked up its own segment", rank);
        let key = (id, rank);
        let board = &self.shared.board;
        let mut postings = board.postings.lock();
        loop {
            self.shared.check_poisoned();
            if let Some(posting) = postings.get_mut(&key) {
                posting.unclaimed -= 1;
                let segment = Arc::clone(&posting.segment);
                if posting.unclaimed == 0 {
                    postings.remove(&key);
                }
                return segment;
            }
            board.changed.wait(&mut postings);
        }
    }

    #[cfg(test)]
    pub(crate) fn postings(&self) -> usize {
        self.shared.board.postings.lock().len()
    }

    /// Runs `op` on the progress engine and blocks until its result is back.
    pub(crate) fn rpc<T, F>(&self, op: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let reply = Arc::new(Reply::new());
        let tx = Arc::clone(&reply);
        self.shared.progress.spawn(move || tx.fulfill(op()));
        reply.wait()
    }

    /// One-sided write of `record` into `slot` of a remote `segment`.
    ///
    /// Returns as soon as the write is issued; `completion` is signalled once it has landed.
    pub(crate) fn rput<R>(
        &self,
        segment: Arc<Segment>,
        slot: usize,
        record: R,
        completion: Completion,
    ) where
        R: bytemuck::Pod + Send,
    {
        segment.check::<R>(slot);
        self.shared.progress.spawn(move || {
            segment.store(slot, &record);
            completion.complete();
        });
    }

    /// One-sided read of `slot` of a remote `segment`. Blocks until the value arrives.
    pub(crate) fn rget<R>(&self, segment: Arc<Segment>, slot: usize) -> R
    where
        R: bytemuck::Pod + Send,
    {
        segment.check::<R>(slot);
        self.rpc(move || segment.load::<R>(slot))
    }

    /// One-sided read of the occupancy counter of `slot` of a remote `segment`.
    pub(crate) fn rget_occupancy(&self, segment: Arc<Segment>, slot: usize) -> u64 {
        segment.check::<()>(slot);
        self.rpc(move || segment.occupancy(slot).load(Ordering::Acquire))
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rank")
            .field("me", &self.me)
            .field("ranks", &self.shared.ranks)
            .finish()
    }
}
