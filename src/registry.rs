use crate::segment::Segment;
use crate::world::Rank;
use std::fmt;
use std::sync::Arc;

/// Names one rank's segment of a distributed table.
///
/// A handle is a capability, not a pointer: it can be passed to the one-sided operations of the
/// owning [`Rank`], and only hands out direct access to the segment when it names the caller's
/// own rank.
#[derive(Clone)]
pub struct RemoteHandle {
    rank: usize,
    local: bool,
    segment: Arc<Segment>,
}

impl RemoteHandle {
    /// The rank whose memory this handle names.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Whether the memory belongs to the rank holding the handle.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Direct access to the segment, if it is local.
    pub(crate) fn local(&self) -> Option<&Segment> {
        if self.local {
            Some(&self.segment)
        } else {
            None
        }
    }

    /// The segment, to be handed to a one-sided operation.
    pub(crate) fn remote(&self) -> Arc<Segment> {
        Arc::clone(&self.segment)
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("rank", &self.rank)
            .field("local", &self.local)
            .finish()
    }
}

/// Per-rank publication of one distributed object's segments.
///
/// Every rank publishes its own segment once, at construction, and then resolves the segment of
/// every other rank, blocking until each owner has published. The handles are kept for the life
/// of the registry, so [`resolve`](Registry::resolve) never blocks. A segment is freed once every
/// rank has dropped its registry for the object.
pub struct Registry {
    me: usize,
    id: u64,
    handles: Box<[RemoteHandle]>,
}

impl Registry {
    /// Publishes `segment` as this rank's share of a new distributed object. Collective: every
    /// rank must construct its registries in the same order.
    pub(crate) fn publish(rank: &Rank, segment: Segment) -> Self {
        let id = rank.next_object_id();
        let me = rank.rank_me();
        let segment = Arc::new(segment);
        tracing::debug!(
            rank = me,
            object = id,
            capacity = segment.capacity(),
            cell_size = segment.cell_size(),
            "published segment"
        );
        rank.publish(id, &segment);

        let handles = (0..rank.rank_n())
            .map(|r| RemoteHandle {
                rank: r,
                local: r == me,
                segment: if r == me {
                    Arc::clone(&segment)
                } else {
                    rank.lookup(id, r)
                },
            })
            .collect();

        Self { me, id, handles }
    }

    /// The handle for `rank`'s segment.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is not a rank of this world.
    pub fn resolve(&self, rank: usize) -> &RemoteHandle {
        assert!(
            rank < self.handles.len(),
            "rank {} out of range for {} ranks",
            rank,
            self.handles.len()
        );
        &self.handles[rank]
    }

    /// This rank's own segment.
    pub(crate) fn local(&self) -> &Segment {
        &self.handles[self.me].segment
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("rank", &self.me)
            .field("object", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, World};

    #[test]
    fn resolve_every_rank() {
        let world = World::new(Config::default().ranks(3).progress_threads(1)).unwrap();
        world.run(|rank| {
            let reg = Registry::publish(rank, Segment::new(8, 8));
            for r in 0..rank.rank_n() {
                let h = reg.resolve(r);
                assert_eq!(h.rank(), r);
                assert_eq!(h.is_local(), r == rank.rank_me());
                assert_eq!(h.local().is_some(), r == rank.rank_me());
                assert_eq!(h.remote().capacity(), 8);
            }
            assert_eq!(reg.local().capacity(), 8);
        });
    }

    #[test]
    fn handles_are_cached() {
        let world = World::new(Config::default().ranks(2).progress_threads(1)).unwrap();
        world.run(|rank| {
            let reg = Registry::publish(rank, Segment::new(4, 8));
            let peer = 1 - rank.rank_me();
            let a = reg.resolve(peer).remote();
            let b = reg.resolve(peer).remote();
            assert!(Arc::ptr_eq(&a, &b));
        });
    }

    #[test]
    fn separate_objects_stay_separate() {
        let world = World::new(Config::default().ranks(2).progress_threads(1)).unwrap();
        world.run(|rank| {
            let small = Registry::publish(rank, Segment::new(2, 8));
            let large = Registry::publish(rank, Segment::new(16, 8));
            let peer = 1 - rank.rank_me();
            assert_eq!(small.resolve(peer).remote().capacity(), 2);
            assert_eq!(large.resolve(peer).remote().capacity(), 16);
        });
    }

    #[test]
    fn segments_are_freed_with_the_last_registry() {
        let world = World::new(Config::default().ranks(3).progress_threads(1)).unwrap();
        world.run(|rank| {
            let reg = Registry::publish(rank, Segment::new(1 << 16, 8));
            let own = Arc::downgrade(&reg.resolve(rank.rank_me()).remote());
            rank.barrier();
            // construction is done everywhere, so the board has let go of every segment
            assert_eq!(rank.postings(), 0);
            drop(reg);
            rank.barrier();
            assert!(own.upgrade().is_none());
        });
    }

    #[test]
    #[should_panic]
    fn resolve_out_of_range() {
        let world = World::new(Config::default().ranks(1).progress_threads(1)).unwrap();
        world.run(|rank| {
            let reg = Registry::publish(rank, Segment::new(2, 8));
            reg.resolve(1);
        });
    }
}
