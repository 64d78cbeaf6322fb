use bytemuck::Pod;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

const WORD: usize = mem::size_of::<u64>();

/// One rank's share of a table: `capacity` record cells and as many occupancy counters.
///
/// Record cells are kept as runs of atomic words. A one-sided write is not atomic as a whole, so
/// a reader racing with it may see a mix of old and new words, but never undefined behavior.
/// Readers that respect the drain-then-barrier protocol never race with a write.
pub(crate) struct Segment {
    /// Record cells, `stride` words each.
    words: Box<[AtomicU64]>,
    stride: usize,
    /// 0 while free, >0 once claimed. Only ever incremented.
    used: Box<[AtomicU64]>,
}

impl Segment {
    /// Allocates `capacity` zeroed cells for records of `record_size` bytes.
    pub(crate) fn new(capacity: usize, record_size: usize) -> Self {
        let stride = record_size.div_ceil(WORD);
        Self {
            words: zeroed(capacity * stride),
            stride,
            used: zeroed(capacity),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.used.len()
    }

    /// Size in bytes of the records this segment was allocated for, rounded up to whole words.
    pub(crate) fn cell_size(&self) -> usize {
        self.stride * WORD
    }

    /// The occupancy counter of `slot`.
    #[inline]
    pub(crate) fn occupancy(&self, slot: usize) -> &AtomicU64 {
        &self.used[slot]
    }

    /// Number of claimed slots.
    pub(crate) fn occupied_count(&self) -> usize {
        self.used
            .iter()
            .filter(|u| u.load(Ordering::Acquire) != 0)
            .count()
    }

    pub(crate) fn store<R: Pod>(&self, slot: usize, record: &R) {
        let cell = self.cell::<R>(slot);
        for (word, chunk) in cell.iter().zip(bytemuck::bytes_of(record).chunks(WORD)) {
            let mut bytes = [0u8; WORD];
            bytes[..chunk.len()].copy_from_slice(chunk);
            word.store(u64::from_ne_bytes(bytes), Ordering::Relaxed);
        }
    }

    pub(crate) fn load<R: Pod>(&self, slot: usize) -> R {
        let mut record = R::zeroed();
        let cell = self.cell::<R>(slot);
        for (word, chunk) in cell
            .iter()
            .zip(bytemuck::bytes_of_mut(&mut record).chunks_mut(WORD))
        {
            let bytes = word.load(Ordering::Relaxed).to_ne_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        record
    }

    /// Panics unless `slot` exists and can hold an `R`.
    ///
    /// Remote operations check on the issuing rank, before the operation reaches the progress
    /// engine.
    pub(crate) fn check<R>(&self, slot: usize) {
        assert!(
            mem::size_of::<R>() <= self.cell_size(),
            "record of {} bytes does not fit a {} byte cell",
            mem::size_of::<R>(),
            self.cell_size()
        );
        assert!(
            slot < self.capacity(),
            "slot {} out of range for capacity {}",
            slot,
            self.capacity()
        );
    }

    fn cell<R>(&self, slot: usize) -> &[AtomicU64] {
        self.check::<R>(slot);
        let start = slot * self.stride;
        &self.words[start..start + self.stride]
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("capacity", &self.capacity())
            .field("cell_size", &self.cell_size())
            .finish()
    }
}

fn zeroed(len: usize) -> Box<[AtomicU64]> {
    (0..len).map(|_| AtomicU64::new(0)).collect()
}
