use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::stream::{self, BoxStream, StreamExt};
use kiln_gateway::{GatewayError, StoreHandle, StoreRole};
use kiln_types::{Block, Cid};
use tracing::{debug, info, warn};

use crate::error::{BlockstoreError, BlockstoreResult};
use crate::transaction::{Transaction, TxBuffer};

/// Content-addressed blockstore with transactional writes.
///
/// Cloning is cheap; clones share the same buffers and data store.
#[derive(Clone)]
pub struct TransactionBlockstore {
    inner: Arc<Inner>,
}

struct Inner {
    data: StoreHandle,
    /// Transactions whose closure is still running.
    open: RwLock<HashMap<u64, Arc<TxBuffer>>>,
    /// Committed buffers, oldest first.
    committed: RwLock<Vec<Arc<TxBuffer>>>,
    next_id: AtomicU64,
}

impl TransactionBlockstore {
    /// Bind a blockstore to a started data store.
    ///
    /// The handle must address the `data` partition; a store in any other
    /// role is a configuration error.
    pub fn open(data: StoreHandle) -> BlockstoreResult<Self> {
        let role = data.role()?;
        if role != StoreRole::Data {
            return Err(GatewayError::InvalidUri {
                uri: data.base().to_string(),
                reason: format!("blockstore needs a data store, got {role}"),
            }
            .into());
        }
        info!(store = %data.base(), "blockstore ready");
        Ok(Self {
            inner: Arc::new(Inner {
                data,
                open: RwLock::new(HashMap::new()),
                committed: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// The durable data store.
    pub fn data_store(&self) -> &StoreHandle {
        &self.inner.data
    }

    /// Run `f` inside a new transaction and commit its writes.
    ///
    /// The transaction is registered as open while `f` runs. If `f` returns
    /// `Ok`, every staged block is written to the data store in submission
    /// order and the buffer joins the committed set; the value `f` returned
    /// is passed through. If `f` or the durable write fails, the buffer is
    /// discarded and the error is returned. A failed durable write also
    /// removes the blocks this commit had already written, so none of them
    /// stay readable.
    pub async fn transaction<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BlockstoreError>,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let buffer = Arc::new(TxBuffer::default());
        self.inner
            .open
            .write()
            .expect("lock poisoned")
            .insert(id, Arc::clone(&buffer));

        let result = f(Transaction::new(id, Arc::clone(&buffer), self.clone())).await;
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                debug!(tx = id, "transaction abandoned");
                self.forget_open(id);
                return Err(e);
            }
        };

        if let Err(e) = self.commit(id, &buffer).await {
            warn!(tx = id, error = %e, "transaction commit failed");
            self.forget_open(id);
            return Err(e.into());
        }

        self.forget_open(id);
        self.inner
            .committed
            .write()
            .expect("lock poisoned")
            .push(buffer);
        Ok(value)
    }

    async fn commit(&self, id: u64, buffer: &TxBuffer) -> BlockstoreResult<()> {
        let blocks = buffer.blocks();
        let data = &self.inner.data;
        let mut written: Vec<String> = Vec::new();
        for block in &blocks {
            let key = block.cid.to_canonical();
            let fresh = match self.already_stored(&block.cid).await {
                Ok(present) => !present,
                Err(e) => {
                    self.roll_back(id, &written).await;
                    return Err(e);
                }
            };
            if let Err(e) = data.put(&key, &block.bytes).await {
                self.roll_back(id, &written).await;
                return Err(e.into());
            }
            if fresh {
                written.push(key);
            }
        }
        debug!(tx = id, blocks = blocks.len(), "transaction committed");
        Ok(())
    }

    /// Whether `cid` is already readable without this commit.
    async fn already_stored(&self, cid: &Cid) -> BlockstoreResult<bool> {
        if self.committed_get(cid).is_some() {
            return Ok(true);
        }
        match self.inner.data.get(&cid.to_canonical()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Best effort: delete the blocks a failed commit wrote.
    async fn roll_back(&self, id: u64, written: &[String]) {
        for key in written.iter().rev() {
            if let Err(e) = self.inner.data.delete(key).await {
                warn!(tx = id, key = %key, error = %e, "could not roll back block");
            }
        }
        debug!(tx = id, blocks = written.len(), "partial commit rolled back");
    }

    fn forget_open(&self, id: u64) {
        self.inner.open.write().expect("lock poisoned").remove(&id);
    }

    /// Top-level writes are not allowed; this always fails.
    pub async fn put(&self, cid: Cid, _bytes: Vec<u8>) -> BlockstoreResult<()> {
        Err(BlockstoreError::NoTransaction(cid))
    }

    /// Read a block: committed buffers (most recent first), then the
    /// durable data store.
    pub async fn get(&self, cid: &Cid) -> BlockstoreResult<Block> {
        if let Some(block) = self.committed_get(cid) {
            return Ok(block);
        }
        fetch_durable(&self.inner.data, *cid).await
    }

    fn committed_get(&self, cid: &Cid) -> Option<Block> {
        let committed = self.inner.committed.read().expect("lock poisoned");
        committed.iter().rev().find_map(|buffer| buffer.get(cid))
    }

    /// Every block visible in open buffers, committed buffers and the data
    /// store, each cid exactly once.
    ///
    /// Buffered blocks are snapshotted when the stream is created; durable
    /// blocks are read lazily as the stream is polled. Call again to
    /// restart.
    pub fn entries(&self) -> BoxStream<'static, BlockstoreResult<Block>> {
        let mut seen = HashSet::new();
        let mut buffered = Vec::new();
        {
            let committed = self.inner.committed.read().expect("lock poisoned");
            let open = self.inner.open.read().expect("lock poisoned");
            for buffer in committed.iter().rev().chain(open.values()) {
                for block in buffer.blocks() {
                    if seen.insert(block.cid) {
                        buffered.push(Ok(block));
                    }
                }
            }
        }

        let data = self.inner.data.clone();
        let fetch_from = data.clone();
        let durable = stream::once(async move { data.keys().await })
            .map(move |listed| -> Vec<BlockstoreResult<Cid>> {
                match listed {
                    Ok(keys) => keys
                        .iter()
                        .filter_map(|key| match Cid::parse(key) {
                            Ok(cid) => Some(cid),
                            Err(e) => {
                                warn!(key = %key, error = %e, "skipping non-block key in data store");
                                None
                            }
                        })
                        .filter(|cid| !seen.contains(cid))
                        .map(Ok)
                        .collect(),
                    Err(e) => vec![Err(e.into())],
                }
            })
            .flat_map(stream::iter)
            .then(move |cid| {
                let data = fetch_from.clone();
                async move { fetch_durable(&data, cid?).await }
            });

        stream::iter(buffered).chain(durable).boxed()
    }

    /// Number of committed transactions still buffered.
    pub fn transactions(&self) -> usize {
        self.inner.committed.read().expect("lock poisoned").len()
    }

    /// Number of transactions currently in flight.
    pub fn open_transactions(&self) -> usize {
        self.inner.open.read().expect("lock poisoned").len()
    }

    /// Drop every block whose cid is not in `live`, from committed buffers
    /// and from the data store. Returns the number of durable blocks removed.
    ///
    /// Open transactions are untouched.
    pub async fn retain(&self, live: &HashSet<Cid>) -> BlockstoreResult<usize> {
        {
            let mut committed = self.inner.committed.write().expect("lock poisoned");
            for buffer in committed.iter() {
                buffer.retain(|cid| live.contains(cid));
            }
            committed.retain(|buffer| buffer.len() > 0);
        }

        let mut removed = 0;
        for key in self.inner.data.keys().await? {
            let keep = Cid::parse(&key).map(|cid| live.contains(&cid)).unwrap_or(true);
            if !keep {
                self.inner.data.delete(&key).await?;
                removed += 1;
            }
        }
        info!(removed, live = live.len(), "blockstore compacted");
        Ok(removed)
    }

    /// Discard all buffers and destroy the durable data store.
    pub async fn destroy(&self) -> BlockstoreResult<()> {
        self.inner.committed.write().expect("lock poisoned").clear();
        self.inner.data.destroy().await?;
        info!(store = %self.inner.data.base(), "blockstore destroyed");
        Ok(())
    }
}

async fn fetch_durable(data: &StoreHandle, cid: Cid) -> BlockstoreResult<Block> {
    let bytes = match data.get(&cid.to_canonical()).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => return Err(BlockstoreError::NotFound(cid)),
        Err(e) => return Err(e.into()),
    };
    let block = Block::new(cid, bytes);
    if !block.verify() {
        return Err(BlockstoreError::Corrupt(cid));
    }
    Ok(block)
}

impl std::fmt::Debug for TransactionBlockstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBlockstore")
            .field("data", &self.inner.data)
            .field("committed", &self.transactions())
            .field("open", &self.open_transactions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiln_gateway::{Gateway, GatewayFactory, GatewayKind, GatewayResult, MemoryGateway, StoreUri};
    use std::sync::atomic::AtomicUsize;

    /// Memory gateway whose `fail_at`-th put (1-based) fails.
    struct FlakyPuts {
        inner: MemoryGateway,
        fail_at: usize,
        puts: AtomicUsize,
    }

    impl FlakyPuts {
        fn new(fail_at: usize) -> Self {
            Self {
                inner: MemoryGateway::new(),
                fail_at,
                puts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Gateway for FlakyPuts {
        fn kind(&self) -> GatewayKind {
            self.inner.kind()
        }
        async fn start(&self, base: &StoreUri) -> GatewayResult<StoreUri> {
            self.inner.start(base).await
        }
        async fn close(&self, base: &StoreUri) -> GatewayResult<()> {
            self.inner.close(base).await
        }
        async fn destroy(&self, base: &StoreUri) -> GatewayResult<()> {
            self.inner.destroy(base).await
        }
        async fn put(&self, uri: &StoreUri, bytes: &[u8]) -> GatewayResult<()> {
            if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(GatewayError::Backend("disk full".into()));
            }
            self.inner.put(uri, bytes).await
        }
        async fn get(&self, uri: &StoreUri) -> GatewayResult<Vec<u8>> {
            self.inner.get(uri).await
        }
        async fn delete(&self, uri: &StoreUri) -> GatewayResult<()> {
            self.inner.delete(uri).await
        }
        async fn keys(&self, base: &StoreUri) -> GatewayResult<Vec<String>> {
            self.inner.keys(base).await
        }
    }

    async fn flaky_store(fail_at: usize) -> TransactionBlockstore {
        let base = StoreUri::parse("memory://flaky?name=flaky&store=data").unwrap();
        let data = StoreHandle::start(Arc::new(FlakyPuts::new(fail_at)), base).await.unwrap();
        TransactionBlockstore::open(data).unwrap()
    }

    async fn memory_store(name: &str) -> TransactionBlockstore {
        let data = GatewayFactory::new()
            .resolve_str(&format!("memory://{name}?name={name}"), StoreRole::Data)
            .await
            .unwrap();
        TransactionBlockstore::open(data).unwrap()
    }

    fn block(s: &str) -> Block {
        Block::encode(s.as_bytes().to_vec())
    }

    async fn commit(store: &TransactionBlockstore, blocks: &[Block]) {
        let blocks = blocks.to_vec();
        store
            .transaction(|tx| async move {
                for b in blocks {
                    tx.put_block(b)?;
                }
                Ok::<_, BlockstoreError>(())
            })
            .await
            .unwrap();
    }

    async fn collect(store: &TransactionBlockstore) -> Vec<Block> {
        store
            .entries()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    // ---- Writes ----

    #[tokio::test]
    async fn put_outside_transaction_fails() {
        let store = memory_store("toplevel").await;
        let b = block("nope");
        let err = store.put(b.cid, b.bytes.clone()).await.unwrap_err();
        assert!(matches!(err, BlockstoreError::NoTransaction(_)));
        assert!(err.to_string().contains("transaction"));
        assert!(store.get(&b.cid).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn put_rejects_mismatched_bytes() {
        let store = memory_store("mismatch").await;
        let b = block("real");
        let err = store
            .transaction(|tx| async move {
                tx.put(b.cid, b"forged".to_vec())?;
                Ok::<_, BlockstoreError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BlockstoreError::CidMismatch(_)));
        assert_eq!(store.transactions(), 0);
    }

    #[tokio::test]
    async fn transaction_sees_own_writes_before_commit() {
        let store = memory_store("ownwrites").await;
        let b = block("staged");
        let seen = store
            .transaction(|tx| async move {
                tx.put_block(b.clone())?;
                let read = tx.get(&b.cid).await?;
                Ok::<_, BlockstoreError>(read == b)
            })
            .await
            .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_to_store_reads() {
        let store = memory_store("isolation").await;
        let b = block("pending");
        let outer = store.clone();
        let visible = store
            .transaction(|tx| async move {
                tx.put_block(b.clone())?;
                assert_eq!(outer.open_transactions(), 1);
                Ok::<_, BlockstoreError>(outer.get(&b.cid).await.is_ok())
            })
            .await
            .unwrap();
        assert!(!visible);
        assert_eq!(store.open_transactions(), 0);
    }

    // ---- Commit ----

    #[tokio::test]
    async fn two_transactions_are_tracked() {
        let store = memory_store("two").await;
        commit(&store, &[block("one")]).await;
        commit(&store, &[block("two")]).await;
        assert_eq!(store.transactions(), 2);
        assert_eq!(collect(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn committed_blocks_are_readable_and_durable() {
        let store = memory_store("durable").await;
        let b = block("persist me");
        commit(&store, &[b.clone()]).await;

        assert_eq!(store.get(&b.cid).await.unwrap(), b);
        let raw = store.data_store().get(&b.cid.to_canonical()).await.unwrap();
        assert_eq!(raw, b.bytes);
    }

    #[tokio::test]
    async fn transaction_returns_closure_value() {
        let store = memory_store("value").await;
        let n = store
            .transaction(|_tx| async { Ok::<_, BlockstoreError>(41 + 1) })
            .await
            .unwrap();
        assert_eq!(n, 42);
        assert_eq!(store.transactions(), 1);
    }

    #[tokio::test]
    async fn failed_transaction_leaves_no_trace() {
        #[derive(Debug)]
        enum AppError {
            Store(BlockstoreError),
            Aborted,
        }
        impl From<BlockstoreError> for AppError {
            fn from(e: BlockstoreError) -> Self {
                AppError::Store(e)
            }
        }

        let store = memory_store("aborted").await;
        let b = block("doomed");
        let cid = b.cid;
        let err = store
            .transaction(|tx| async move {
                tx.put_block(b)?;
                Err::<(), _>(AppError::Aborted)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Aborted));
        assert_eq!(store.transactions(), 0);
        assert_eq!(store.open_transactions(), 0);
        assert!(store.get(&cid).await.unwrap_err().is_not_found());
        assert!(collect(&store).await.is_empty());
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_written_blocks() {
        // put #1 is the earlier commit, #2 and #3 belong to the failing one
        let store = flaky_store(3).await;
        let kept = block("kept");
        commit(&store, &[kept.clone()]).await;

        let a = block("a");
        let b = block("b");
        let (a_cid, b_cid) = (a.cid, b.cid);
        let staged = vec![a, kept.clone(), b];
        let err = store
            .transaction(|tx| async move {
                for blk in staged {
                    tx.put_block(blk)?;
                }
                Ok::<_, BlockstoreError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BlockstoreError::Gateway(GatewayError::Backend(_))));
        assert!(store.get(&a_cid).await.unwrap_err().is_not_found());
        assert!(store.get(&b_cid).await.unwrap_err().is_not_found());
        assert!(store.data_store().get(&a_cid.to_canonical()).await.unwrap_err().is_not_found());
        // blocks that were already durable survive the rollback
        assert_eq!(store.get(&kept.cid).await.unwrap(), kept);
        assert_eq!(collect(&store).await, vec![kept]);
        assert_eq!(store.transactions(), 1);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn first_put_failure_is_propagated() {
        let store = flaky_store(1).await;
        let b = block("never");
        let cid = b.cid;
        let err = store
            .transaction(|tx| async move {
                tx.put_block(b)?;
                Ok::<_, BlockstoreError>(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(store.get(&cid).await.unwrap_err().is_not_found());
        assert_eq!(store.transactions(), 0);
    }

    // ---- Entries ----

    #[tokio::test]
    async fn entries_yield_each_block_once() {
        let store = memory_store("entries").await;
        let first: Vec<Block> = (0..3).map(|i| block(&format!("a{i}"))).collect();
        let second: Vec<Block> = (0..4).map(|i| block(&format!("b{i}"))).collect();
        commit(&store, &first).await;
        // overlap with the first transaction must not duplicate
        commit(&store, &[second.clone(), vec![first[0].clone()]].concat()).await;

        let mut got: Vec<Cid> = collect(&store).await.iter().map(|b| b.cid).collect();
        got.sort();
        let mut want: Vec<Cid> = first.iter().chain(&second).map(|b| b.cid).collect();
        want.sort();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn entries_include_durable_blocks_from_a_previous_session() {
        let factory = GatewayFactory::new();
        let data = factory
            .resolve_str("memory://reopen?name=reopen", StoreRole::Data)
            .await
            .unwrap();
        let old = block("old session");
        commit(&TransactionBlockstore::open(data.clone()).unwrap(), &[old.clone()]).await;

        let store = TransactionBlockstore::open(data).unwrap();
        assert_eq!(store.transactions(), 0);
        let fresh = block("new session");
        commit(&store, &[fresh.clone()]).await;

        let got = collect(&store).await;
        assert_eq!(got.len(), 2);
        assert!(got.contains(&old));
        assert!(got.contains(&fresh));
        assert_eq!(store.get(&old.cid).await.unwrap(), old);
    }

    // ---- Maintenance ----

    #[tokio::test]
    async fn retain_drops_unreachable_blocks() {
        let store = memory_store("retain").await;
        let keep = block("keep");
        let drop = block("drop");
        commit(&store, &[keep.clone(), drop.clone()]).await;

        let live: HashSet<Cid> = [keep.cid].into_iter().collect();
        assert_eq!(store.retain(&live).await.unwrap(), 1);
        assert_eq!(store.get(&keep.cid).await.unwrap(), keep);
        assert!(store.get(&drop.cid).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn destroy_empties_the_store() {
        let store = memory_store("destroy").await;
        let b = block("gone");
        commit(&store, &[b.clone()]).await;
        store.destroy().await.unwrap();
        assert_eq!(store.transactions(), 0);
        assert!(collect(&store).await.is_empty());
        assert!(store.get(&b.cid).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rejects_non_data_store() {
        let meta = GatewayFactory::new()
            .resolve_str("memory://meta?name=meta", StoreRole::Meta)
            .await
            .unwrap();
        let err = TransactionBlockstore::open(meta).unwrap_err();
        assert!(matches!(err, BlockstoreError::Gateway(ref g) if g.is_config()));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("file://{}?name=blocks", dir.path().display());
        let b = block("on disk");

        let data = GatewayFactory::new()
            .resolve_str(&uri, StoreRole::Data)
            .await
            .unwrap();
        commit(&TransactionBlockstore::open(data).unwrap(), &[b.clone()]).await;

        let data = GatewayFactory::new()
            .resolve_str(&uri, StoreRole::Data)
            .await
            .unwrap();
        let reopened = TransactionBlockstore::open(data).unwrap();
        assert_eq!(reopened.get(&b.cid).await.unwrap(), b);
        assert_eq!(collect(&reopened).await, vec![b]);
    }
}
