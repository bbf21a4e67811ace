use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::head::ClockHead;

/// A caller-supplied document write: a value for `key`, or a tombstone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocUpdate {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub del: bool,
}

impl DocUpdate {
    /// Write `value` under `key`.
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
            del: false,
        }
    }

    /// Tombstone `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            del: true,
        }
    }
}

/// The latest stored state for a key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocValue {
    pub key: String,
    pub value: Option<Value>,
    pub del: bool,
}

impl From<DocUpdate> for DocValue {
    fn from(update: DocUpdate) -> Self {
        Self {
            key: update.key,
            value: update.value,
            del: update.del,
        }
    }
}

/// Result of a bulk apply: the head produced by the transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub head: ClockHead,
}
