use crate::kmer::{KmerPair, PackedKmer};
use serde::{
    de::{self, Visitor},
    ser::SerializeStruct,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt::{self, Formatter};

struct PackedKmerVisitor;

impl Serialize for PackedKmer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackedKmer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(PackedKmerVisitor)
    }
}

impl<'de> Visitor<'de> for PackedKmerVisitor {
    type Value = PackedKmer;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a string of A, C, G and T")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.parse().map_err(E::custom)
    }
}

impl Serialize for KmerPair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("KmerPair", 3)?;
        s.serialize_field("kmer", self.kmer())?;
        s.serialize_field("backward", &(self.backward_ext() as char))?;
        s.serialize_field("forward", &(self.forward_ext() as char))?;
        s.end()
    }
}

#[derive(Deserialize)]
#[serde(rename = "KmerPair")]
struct RawKmerPair {
    kmer: PackedKmer,
    backward: char,
    forward: char,
}

impl<'de> Deserialize<'de> for KmerPair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawKmerPair::deserialize(deserializer)?;
        let ext = |c: char| u8::try_from(c).unwrap_or(0);
        KmerPair::new(raw.kmer, ext(raw.backward), ext(raw.forward)).map_err(de::Error::custom)
    }
}
