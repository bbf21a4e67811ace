use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical partition of a database's durable storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreRole {
    /// Content blocks keyed by cid.
    Data,
    /// Pointer records such as the persisted clock head.
    Meta,
    /// Write-ahead / replication log.
    Wal,
}

impl StoreRole {
    pub const ALL: [StoreRole; 3] = [StoreRole::Data, StoreRole::Meta, StoreRole::Wal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Meta => "meta",
            Self::Wal => "wal",
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            "meta" => Ok(Self::Meta),
            "wal" => Ok(Self::Wal),
            other => Err(format!("unknown store role: {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_form_roundtrip() {
        for role in StoreRole::ALL {
            assert_eq!(role.as_str().parse::<StoreRole>().unwrap(), role);
        }
        assert!("index".parse::<StoreRole>().is_err());
    }
}
