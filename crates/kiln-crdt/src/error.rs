use kiln_blockstore::BlockstoreError;
use kiln_gateway::GatewayError;
use kiln_types::{Cid, TypeError};

/// Errors from CRDT engine operations.
#[derive(Debug, thiserror::Error)]
pub enum CrdtError {
    #[error("blockstore error: {0}")]
    Blockstore(#[from] BlockstoreError),

    #[error("store error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("encoding error: {0}")]
    Encoding(#[from] TypeError),

    /// A block on the DAG does not decode as an event node.
    #[error("invalid event node {cid}: {reason}")]
    InvalidNode { cid: Cid, reason: String },

    /// The persisted head record is unreadable.
    #[error("invalid head record: {0}")]
    InvalidHead(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CrdtError {
    /// Returns `true` for configuration errors at any layer.
    pub fn is_config(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Gateway(e) | Self::Blockstore(BlockstoreError::Gateway(e)) => e.is_config(),
            _ => false,
        }
    }
}

/// Result alias for CRDT engine operations.
pub type CrdtResult<T> = Result<T, CrdtError>;
