use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const HASH_LEN: usize = 32;

/// Identifier of a commit in the backing store.
///
/// Commits are addressed by the BLAKE3 digest of their canonical JSON
/// encoding, so two commits with the same parents, message, author,
/// timestamp and documents share an id. Branch heads point at commit hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitHash([u8; HASH_LEN]);

impl CommitHash {
    /// Hash the canonical encoding of a commit.
    pub fn of_commit<T: Serialize>(encoding: &T) -> Result<Self, TypeError> {
        let bytes =
            serde_json::to_vec(encoding).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Self::digest(&bytes))
    }

    /// Hash raw bytes. Mostly useful for fixtures.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Placeholder head for a branch record that has no commit yet.
    pub const fn null() -> Self {
        Self([0u8; HASH_LEN])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for logs and CLI output.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for CommitHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|b: Vec<u8>| TypeError::InvalidLength {
            expected: HASH_LEN,
            actual: b.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitHash({})", self.short_hex())
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Commit hashes travel inside JSON documents and events as hex strings.
impl Serialize for CommitHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CommitHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
