use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Multibase-style prefix of the canonical string form.
const CID_PREFIX: char = 'b';

/// Domain tag mixed into every block digest.
const BLOCK_DOMAIN: &[u8] = b"kiln-block-v1:";

/// Content identifier for a block.
///
/// A `Cid` is the BLAKE3 hash of a block's bytes. Identical bytes always
/// produce the same `Cid`; a different payload always produces a different
/// one.
///
/// The canonical string form is `b` followed by 64 lower-case hex digits.
/// Ordering follows that string form. Because the prefix is constant and hex
/// preserves byte order, the derived byte ordering is the same ordering.
/// It is a deterministic tie-break only, never a timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Compute the `Cid` of a block payload.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(BLOCK_DOMAIN);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a `Cid` from a pre-computed hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical string form (`b` + 64 hex characters).
    pub fn to_canonical(&self) -> String {
        format!("{CID_PREFIX}{}", hex::encode(self.0))
    }

    /// Short form for logs (prefix + first 8 hex characters).
    pub fn short(&self) -> String {
        format!("{CID_PREFIX}{}", hex::encode(&self.0[..4]))
    }

    /// Returns `true` if `data` hashes to this `Cid`.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::digest(data) == *self
    }

    /// Parse the canonical string form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let digits = s.strip_prefix(CID_PREFIX).ok_or_else(|| TypeError::InvalidCid {
            input: s.to_string(),
            reason: format!("missing '{CID_PREFIX}' prefix"),
        })?;
        let bytes = hex::decode(digits).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.short())
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

impl FromStr for Cid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl From<[u8; 32]> for Cid {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
