use serde::{Deserialize, Serialize};

use crate::cid::Cid;

/// An immutable byte payload addressed by its [`Cid`].
///
/// A block is never mutated after creation. Changing the payload means
/// producing a new block with a new `Cid`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub cid: Cid,
    pub bytes: Vec<u8>,
}

impl Block {
    /// Create a block from bytes, deriving its `Cid`.
    pub fn encode(bytes: Vec<u8>) -> Self {
        let cid = Cid::digest(&bytes);
        Self { cid, bytes }
    }

    /// Pair an already-known `Cid` with bytes.
    ///
    /// Used when reading back from storage; call [`Block::verify`] to check
    /// that the pairing holds.
    pub fn new(cid: Cid, bytes: Vec<u8>) -> Self {
        Self { cid, bytes }
    }

    /// Encode a serializable value as a JSON block.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, crate::TypeError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| crate::TypeError::Serialization(e.to_string()))?;
        Ok(Self::encode(bytes))
    }

    /// Decode the payload as JSON.
    pub fn to_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::TypeError> {
        serde_json::from_slice(&self.bytes)
            .map_err(|e| crate::TypeError::Serialization(e.to_string()))
    }

    /// Returns `true` if the bytes hash to the block's `Cid`.
    pub fn verify(&self) -> bool {
        self.cid.verify(&self.bytes)
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_derives_cid() {
        let block = Block::encode(b"payload".to_vec());
        assert_eq!(block.cid, Cid::digest(b"payload"));
        assert!(block.verify());
        assert_eq!(block.len(), 7);
    }

    #[test]
    fn mismatched_pairing_fails_verification() {
        let block = Block::new(Cid::digest(b"one"), b"two".to_vec());
        assert!(!block.verify());
    }

    #[test]
    fn json_payload() {
        let value = serde_json::json!({"hello": "world"});
        let block = Block::from_json(&value).unwrap();
        let decoded: serde_json::Value = block.to_json().unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn empty_block() {
        let block = Block::encode(Vec::new());
        assert!(block.is_empty());
        assert!(block.verify());
    }
}
