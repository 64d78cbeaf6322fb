use thiserror::Error;

/// The error type for building a [`World`](crate::World) from a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A world needs at least one rank.
    #[error("rank count must be at least 1")]
    ZeroRanks,

    /// The progress engine needs at least one thread to run remote operations on.
    #[error("progress engine needs at least one thread")]
    ZeroProgressThreads,

    /// An environment override could not be parsed.
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar {
        /// Name of the variable.
        name: &'static str,
        /// The value that was found.
        value: String,
    },

    /// The progress engine's thread pool could not be started.
    #[error("failed to start progress engine")]
    ProgressPool(#[from] rayon::ThreadPoolBuildError),
}

/// The error type for [`HashMap::try_insert`](crate::HashMap::try_insert) and
/// [`LocalHashMap::try_insert`](crate::LocalHashMap::try_insert).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum InsertError {
    /// Every slot probed on the record's owning rank was already claimed.
    #[error("all {capacity} slots on rank {rank} are claimed")]
    Full {
        /// The rank the record hashed to.
        rank: usize,
        /// Number of slots probed, which is the per-rank capacity.
        capacity: usize,
    },
}
