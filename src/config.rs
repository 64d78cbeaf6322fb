use crate::error::ConfigError;
use std::env;
use std::str::FromStr;

/// Environment variable overriding [`Config::ranks`] in [`Config::from_env`].
pub const RANKS_VAR: &str = "KMER_DHT_RANKS";

/// Environment variable overriding [`Config::progress_threads`] in [`Config::from_env`].
pub const PROGRESS_THREADS_VAR: &str = "KMER_DHT_PROGRESS_THREADS";

/// The most progress threads picked by default. Remote operations are short, so a handful of
/// threads keeps up with many ranks.
const DEFAULT_MAX_PROGRESS_THREADS: usize = 4;

/// Configuration of a [`World`](crate::World).
///
/// Table capacity is not configured here; every [`HashMap`](crate::HashMap) is given its
/// per-rank capacity when it is constructed.
///
/// # Examples
///
/// ```
/// use kmer_dht::Config;
///
/// let config = Config::default().ranks(4).progress_threads(2);
/// assert_eq!(config.rank_count(), 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    ranks: usize,
    progress_threads: usize,
    thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ranks: 1,
            progress_threads: num_cpus::get().clamp(1, DEFAULT_MAX_PROGRESS_THREADS),
            thread_name: String::from("kmer-dht"),
        }
    }
}

impl Config {
    /// The default configuration, with any overrides found in [`RANKS_VAR`] and
    /// [`PROGRESS_THREADS_VAR`] applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ranks) = var(RANKS_VAR)? {
            config.ranks = ranks;
        }
        if let Some(threads) = var(PROGRESS_THREADS_VAR)? {
            config.progress_threads = threads;
        }
        Ok(config)
    }

    /// Sets the number of ranks.
    pub fn ranks(mut self, ranks: usize) -> Self {
        self.ranks = ranks;
        self
    }

    /// Sets the number of threads that execute one-sided operations against remote ranks.
    pub fn progress_threads(mut self, threads: usize) -> Self {
        self.progress_threads = threads;
        self
    }

    /// Sets the prefix used to name rank and progress threads.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// The configured number of ranks.
    pub fn rank_count(&self) -> usize {
        self.ranks
    }

    /// The configured number of progress threads.
    pub fn progress_thread_count(&self) -> usize {
        self.progress_threads
    }

    /// The configured thread name prefix.
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name
    }

    /// Checks that a world can be built from this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranks == 0 {
            return Err(ConfigError::ZeroRanks);
        }
        if self.progress_threads == 0 {
            return Err(ConfigError::ZeroProgressThreads);
        }
        Ok(())
    }
}

fn var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(value)) => Err(ConfigError::InvalidVar {
            name,
            value: value.to_string_lossy().into_owned(),
        }),
    }
}
