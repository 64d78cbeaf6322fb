//! Packed k-mers, and the k-mer record stored by the assembler.
//!
//! A k-mer is a fixed-length fragment of a DNA sequence. [`PackedKmer`] stores up to
//! [`MAX_LEN`] bases at two bits per base. [`KmerPair`] is the record kept in the table: a k-mer
//! together with the bases seen immediately before and after it in the reads, which is what a
//! contig walk needs to extend a fragment in either direction.

use crate::record::{Key, Record};
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::hash::BuildHasher;
use std::str::FromStr;
use thiserror::Error;

/// Longest k-mer a [`PackedKmer`] can hold.
pub const MAX_LEN: usize = 64;

const BASES_PER_WORD: usize = 32;

/// Extension byte meaning "the fragment ends here".
pub const NO_EXTENSION: u8 = b'F';

// fixed so that every process hashes a k-mer to the same value
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// The error type for parsing k-mers and k-mer records.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KmerError {
    /// A k-mer needs at least one base.
    #[error("k-mer is empty")]
    Empty,

    /// More bases than a [`PackedKmer`] can hold.
    #[error("k-mer of length {len} exceeds the maximum of {}", MAX_LEN)]
    TooLong {
        /// Number of bases given.
        len: usize,
    },

    /// A character that is not one of `A`, `C`, `G`, `T`.
    #[error("invalid base {base:?} at position {position}")]
    InvalidBase {
        /// The offending character.
        base: char,
        /// Its position in the input.
        position: usize,
    },

    /// The extension string was not two of `A`, `C`, `G`, `T`, `F`.
    #[error("invalid extension {0:?}, expected two of A, C, G, T, F")]
    InvalidExtension(String),
}

/// A k-mer of up to [`MAX_LEN`] bases, packed two bits per base.
///
/// Unused bits are always zero, so two k-mers are equal exactly when their bases are.
///
/// ```
/// use kmer_dht::kmer::PackedKmer;
///
/// let kmer: PackedKmer = "GATTACA".parse().unwrap();
/// assert_eq!(kmer.len(), 7);
/// assert_eq!(kmer.base(1), b'A');
/// assert_eq!(kmer.to_string(), "GATTACA");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct PackedKmer {
    words: [u64; 2],
    len: u64,
}

impl PackedKmer {
    /// Number of bases.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether this is the zero-length k-mer held by unwritten slots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The base at position `i`, as one of `b'A'`, `b'C'`, `b'G'`, `b'T'`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn base(&self, i: usize) -> u8 {
        assert!(i < self.len(), "base {} out of range for k = {}", i, self.len);
        let word = self.words[i / BASES_PER_WORD];
        let code = (word >> (2 * (i % BASES_PER_WORD))) & 0b11;
        b"ACGT"[code as usize]
    }

    /// Iterator over the bases in order.
    pub fn bases(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len()).map(move |i| self.base(i))
    }
}

fn encode(base: u8) -> Option<u64> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

impl FromStr for PackedKmer {
    type Err = KmerError;

    fn from_str(s: &str) -> Result<Self, KmerError> {
        if s.is_empty() {
            return Err(KmerError::Empty);
        }
        let len = s.chars().count();
        if len > MAX_LEN {
            return Err(KmerError::TooLong { len });
        }
        let mut words = [0u64; 2];
        for (i, c) in s.chars().enumerate() {
            let code = u8::try_from(c)
                .ok()
                .and_then(encode)
                .ok_or(KmerError::InvalidBase {
                    base: c,
                    position: i,
                })?;
            words[i / BASES_PER_WORD] |= code << (2 * (i % BASES_PER_WORD));
        }
        Ok(Self {
            words,
            len: len as u64,
        })
    }
}

impl fmt::Display for PackedKmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bases() {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PackedKmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackedKmer({})", self)
    }
}

impl Key for PackedKmer {
    fn hash(&self) -> u64 {
        let [a, b, c, d] = SEEDS;
        let state = ahash::RandomState::with_seeds(a, b, c, d);
        BuildHasher::hash_one(&state, (self.words, self.len))
    }
}

/// A k-mer and its extensions: the base preceding it and the base following it in the reads.
///
/// Either extension may be [`NO_EXTENSION`] when the k-mer starts or ends a contig.
///
/// ```
/// use kmer_dht::kmer::KmerPair;
///
/// let pair = KmerPair::parse("ACCGT", "FG").unwrap();
/// assert_eq!(pair.backward_ext(), b'F');
/// assert_eq!(pair.forward_ext(), b'G');
/// assert!(KmerPair::parse("ACCGT", "FX").is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct KmerPair {
    kmer: PackedKmer,
    ext: [u8; 2],
    _pad: [u8; 6],
}

impl KmerPair {
    /// A record for `kmer` with the given backward and forward extensions.
    pub fn new(kmer: PackedKmer, backward: u8, forward: u8) -> Result<Self, KmerError> {
        if !is_extension(backward) || !is_extension(forward) {
            let ext = [backward, forward];
            return Err(KmerError::InvalidExtension(
                String::from_utf8_lossy(&ext).into_owned(),
            ));
        }
        Ok(Self {
            kmer,
            ext: [backward, forward],
            _pad: [0; 6],
        })
    }

    /// Parses a k-mer and a two-character extension string (backward first).
    pub fn parse(kmer: &str, fb_ext: &str) -> Result<Self, KmerError> {
        let kmer = kmer.parse()?;
        match fb_ext.as_bytes() {
            &[backward, forward] => Self::new(kmer, backward, forward),
            _ => Err(KmerError::InvalidExtension(fb_ext.to_owned())),
        }
    }

    /// The k-mer.
    pub fn kmer(&self) -> &PackedKmer {
        &self.kmer
    }

    /// The base preceding the k-mer, or [`NO_EXTENSION`].
    pub fn backward_ext(&self) -> u8 {
        self.ext[0]
    }

    /// The base following the k-mer, or [`NO_EXTENSION`].
    pub fn forward_ext(&self) -> u8 {
        self.ext[1]
    }
}

fn is_extension(b: u8) -> bool {
    matches!(b, b'A' | b'C' | b'G' | b'T' | NO_EXTENSION)
}

impl fmt::Debug for KmerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmerPair")
            .field("kmer", &format_args!("{}", self.kmer))
            .field("backward", &(self.ext[0] as char))
            .field("forward", &(self.ext[1] as char))
            .finish()
    }
}

impl fmt::Display for KmerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}{}",
            self.kmer, self.ext[0] as char, self.ext[1] as char
        )
    }
}

impl Record for KmerPair {
    type Key = PackedKmer;

    fn key(&self) -> &PackedKmer {
        &self.kmer
    }
}
