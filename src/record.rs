/// The key portion of a [`Record`].
///
/// Keys are compared for exact equality, and hashed to pick both the owning rank and the first
/// probed slot. The hash must be stable across processes: every rank has to compute the same
/// value for the same key, so implementations must not use a randomly seeded hasher.
pub trait Key: Eq {
    /// Returns the process-independent hash of this key.
    fn hash(&self) -> u64;
}

/// A fixed-size entry stored in the table.
///
/// Records are copied byte-for-byte between ranks, which is what the [`bytemuck::Pod`] bound
/// expresses: no padding, no pointers, and every bit pattern (including all-zeroes, which is what
/// unwritten slots hold) is a valid value.
pub trait Record: bytemuck::Pod + Send + Sync {
    /// The part of the record that `find` looks up by.
    type Key: Key;

    /// Returns the key portion of this record.
    fn key(&self) -> &Self::Key;

    /// Returns the hash of this record's key.
    fn hash(&self) -> u64 {
        self.key().hash()
    }
}
