//! Shared test records and setup.
//!
//! Set `RUST_LOG` (for example `RUST_LOG=kmer_dht=trace`) to see what the table does.

#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use kmer_dht::{Config, Key, Record, World};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a fmt subscriber filtered by `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A key that hashes to itself, so tests control exactly where records land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(transparent)]
pub struct Id(pub u64);

impl Key for Id {
    fn hash(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Entry {
    pub key: Id,
    pub value: [u64; 3],
}

impl Entry {
    pub fn new(key: u64) -> Self {
        Self::with_value(key, key.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    pub fn with_value(key: u64, value: u64) -> Self {
        Self {
            key: Id(key),
            value: [value, !value, value.rotate_left(17)],
        }
    }
}

impl Record for Entry {
    type Key = Id;

    fn key(&self) -> &Id {
        &self.key
    }
}

pub fn world(ranks: usize) -> World {
    init_tracing();
    World::new(Config::default().ranks(ranks).progress_threads(2)).unwrap()
}
