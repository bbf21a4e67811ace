//! Concrete gateway backends, selected by URI scheme.
//!
//! | scheme    | backend                 | layout                                  |
//! |-----------|-------------------------|-----------------------------------------|
//! | `memory`  | [`MemoryGateway`]       | process-local maps                      |
//! | `file`    | [`FileGateway`]         | `<path>/<name>/<role>/<key>` files      |
//! | `indexdb` | [`KvGateway`]           | embedded sled db at `<path>`, tree per store |
//! | `sqlite`  | [`SqlGateway`]          | `<path>/<name>.sqlite`, table per role  |

mod file;
mod kv;
mod memory;
mod sql;

use std::fmt;
use std::sync::Arc;

pub use file::FileGateway;
pub use kv::KvGateway;
pub use memory::MemoryGateway;
pub use sql::SqlGateway;

use crate::error::{GatewayError, GatewayResult};
use crate::role::StoreRole;
use crate::traits::Gateway;

/// On-disk format version stamped into started URIs.
pub const STORAGE_VERSION: &str = "v1";

/// The backend kinds a store URI can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayKind {
    Memory,
    File,
    Kv,
    Sql,
}

impl GatewayKind {
    /// Map a URI scheme to a backend kind.
    ///
    /// Fails with [`GatewayError::UnsupportedScheme`] before any I/O.
    pub fn from_scheme(scheme: &str, role: StoreRole) -> GatewayResult<Self> {
        match scheme {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "indexdb" => Ok(Self::Kv),
            "sqlite" => Ok(Self::Sql),
            other => Err(GatewayError::UnsupportedScheme {
                scheme: other.to_string(),
                role: role.to_string(),
            }),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Kv => "indexdb",
            Self::Sql => "sqlite",
        }
    }

    /// Construct a fresh gateway of this kind.
    pub fn build(&self) -> Arc<dyn Gateway> {
        match self {
            Self::Memory => Arc::new(MemoryGateway::new()),
            Self::File => Arc::new(FileGateway::new()),
            Self::Kv => Arc::new(KvGateway::new()),
            Self::Sql => Arc::new(SqlGateway::new()),
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Reject keys that cannot be used as a file name or table key verbatim.
pub(crate) fn validate_key(key: &str) -> GatewayResult<()> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(GatewayError::InvalidUri {
            uri: key.to_string(),
            reason: "keys must be non-empty [A-Za-z0-9._-] and not start with '.'".into(),
        })
    }
}
