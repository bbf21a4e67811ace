use kiln_gateway::GatewayError;
use kiln_types::Cid;

/// Errors from blockstore operations.
#[derive(Debug, thiserror::Error)]
pub enum BlockstoreError {
    /// The block is absent from every buffer and from the durable store.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// A write was attempted outside a transaction scope.
    #[error("cannot put {0} outside a transaction; open one with transaction()")]
    NoTransaction(Cid),

    /// The bytes handed to `put` do not hash to the given cid.
    #[error("bytes do not match cid {0}")]
    CidMismatch(Cid),

    /// Bytes read back from the durable store do not hash to their cid.
    #[error("corrupt block {0}: stored bytes do not match cid")]
    Corrupt(Cid),

    /// Error from the durable data store.
    #[error("data store error: {0}")]
    Gateway(#[from] GatewayError),
}

impl BlockstoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for blockstore operations.
pub type BlockstoreResult<T> = Result<T, BlockstoreError>;
