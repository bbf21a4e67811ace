use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kiln_types::{Block, Cid};
use tracing::trace;

use crate::error::{BlockstoreError, BlockstoreResult};
use crate::store::TransactionBlockstore;

/// Staged block writes of one transaction, in submission order.
#[derive(Debug, Default)]
pub(crate) struct TxBuffer {
    inner: RwLock<BufferState>,
}

#[derive(Debug, Default)]
struct BufferState {
    order: Vec<Cid>,
    blocks: HashMap<Cid, Vec<u8>>,
}

impl TxBuffer {
    pub(crate) fn put(&self, cid: Cid, bytes: Vec<u8>) {
        let mut state = self.inner.write().expect("lock poisoned");
        if state.blocks.insert(cid, bytes).is_none() {
            state.order.push(cid);
        }
    }

    pub(crate) fn get(&self, cid: &Cid) -> Option<Block> {
        let state = self.inner.read().expect("lock poisoned");
        state
            .blocks
            .get(cid)
            .map(|bytes| Block::new(*cid, bytes.clone()))
    }

    pub(crate) fn contains(&self, cid: &Cid) -> bool {
        self.inner.read().expect("lock poisoned").blocks.contains_key(cid)
    }

    /// All blocks, in submission order.
    pub(crate) fn blocks(&self) -> Vec<Block> {
        let state = self.inner.read().expect("lock poisoned");
        state
            .order
            .iter()
            .filter_map(|cid| state.blocks.get(cid).map(|b| Block::new(*cid, b.clone())))
            .collect()
    }

    pub(crate) fn cids(&self) -> Vec<Cid> {
        self.inner.read().expect("lock poisoned").order.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").order.len()
    }

    /// Drop every block for which `keep` is false. Returns how many went.
    pub(crate) fn retain(&self, keep: impl Fn(&Cid) -> bool) -> usize {
        let mut state = self.inner.write().expect("lock poisoned");
        let before = state.order.len();
        let BufferState { order, blocks } = &mut *state;
        order.retain(|cid| {
            let kept = keep(cid);
            if !kept {
                blocks.remove(cid);
            }
            kept
        });
        before - order.len()
    }
}

/// Handle to an open transaction.
///
/// Writes go to the transaction's private buffer. Reads check that buffer
/// first, then fall through to the owning store.
pub struct Transaction {
    id: u64,
    buffer: Arc<TxBuffer>,
    store: TransactionBlockstore,
}

impl Transaction {
    pub(crate) fn new(id: u64, buffer: Arc<TxBuffer>, store: TransactionBlockstore) -> Self {
        Self { id, buffer, store }
    }

    /// Identifier, unique within the owning store.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stage `bytes` under `cid`.
    ///
    /// Fails with [`BlockstoreError::CidMismatch`] if the bytes do not hash
    /// to `cid`. Staging the same cid twice keeps its original position.
    pub fn put(&self, cid: Cid, bytes: Vec<u8>) -> BlockstoreResult<()> {
        if !cid.verify(&bytes) {
            return Err(BlockstoreError::CidMismatch(cid));
        }
        trace!(tx = self.id, cid = %cid.short(), len = bytes.len(), "staged block");
        self.buffer.put(cid, bytes);
        Ok(())
    }

    /// Stage an encoded block.
    pub fn put_block(&self, block: Block) -> BlockstoreResult<()> {
        self.put(block.cid, block.bytes)
    }

    /// Read a block: this transaction's writes, then the store.
    pub async fn get(&self, cid: &Cid) -> BlockstoreResult<Block> {
        match self.buffer.get(cid) {
            Some(block) => Ok(block),
            None => self.store.get(cid).await,
        }
    }

    /// Cids staged so far, in submission order.
    pub fn cids(&self) -> Vec<Cid> {
        self.buffer.cids()
    }

    /// Number of staged blocks.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The store this transaction belongs to.
    pub fn store(&self) -> &TransactionBlockstore {
        &self.store
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("blocks", &self.buffer.len())
            .finish()
    }
}
