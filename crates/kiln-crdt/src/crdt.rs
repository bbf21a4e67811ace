//! The CRDT engine.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use kiln_blockstore::TransactionBlockstore;
use kiln_clock::{CrdtClock, ListenerId};
use kiln_gateway::{GatewayFactory, StoreHandle, StoreRole};
use kiln_types::{BulkResult, ClockHead, DocUpdate, DocValue};

use crate::config::CrdtConfig;
use crate::error::{CrdtError, CrdtResult};
use crate::index::{Index, IndexRegistry};
use crate::logic::{DagLog, UpdateLogic};

/// Meta-store key holding the persisted clock head.
pub const HEAD_KEY: &str = "main";

/// An open database: blockstore, clock and update logic wired together.
///
/// Construction is the readiness handshake. Once [`Crdt::open`] returns,
/// the stores are started and the persisted head is loaded, so every
/// operation runs against a ready database.
pub struct Crdt {
    name: String,
    blocks: TransactionBlockstore,
    meta: StoreHandle,
    clock: CrdtClock,
    logic: Arc<dyn UpdateLogic>,
    indexes: IndexRegistry,
    /// Bulk writes share this lock; compaction and destroy take it
    /// exclusively so they never race a commit whose head is not yet merged.
    maintenance: RwLock<()>,
    /// Serializes head persistence so the last write is the latest head.
    persist: Mutex<()>,
}

impl Crdt {
    /// Open a database with the process-wide gateway factory and the
    /// default [`DagLog`] update logic.
    pub async fn open(config: &CrdtConfig) -> CrdtResult<Self> {
        Self::open_with(config, GatewayFactory::global(), Arc::new(DagLog::new())).await
    }

    pub async fn open_with(
        config: &CrdtConfig,
        factory: &GatewayFactory,
        logic: Arc<dyn UpdateLogic>,
    ) -> CrdtResult<Self> {
        config.validate()?;
        let data = factory
            .resolve(&config.store_uri(StoreRole::Data)?, StoreRole::Data)
            .await?;
        let meta = factory
            .resolve(&config.store_uri(StoreRole::Meta)?, StoreRole::Meta)
            .await?;
        Self::from_stores(&config.name, data, meta, logic).await
    }

    /// Wire a database over already started data and meta stores.
    pub async fn from_stores(
        name: &str,
        data: StoreHandle,
        meta: StoreHandle,
        logic: Arc<dyn UpdateLogic>,
    ) -> CrdtResult<Self> {
        let blocks = TransactionBlockstore::open(data)?;
        let head = load_head(&meta).await?;

        let clock = CrdtClock::with_head(head.clone());
        let indexes = IndexRegistry::default();
        let registry = indexes.clone();
        clock.on_zoom(move || registry.reset_all());

        info!(name = %name, head = %head, "database opened");
        Ok(Self {
            name: name.to_string(),
            blocks,
            meta,
            clock,
            logic,
            indexes,
            maintenance: RwLock::new(()),
            persist: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current head.
    pub fn head(&self) -> ClockHead {
        self.clock.head()
    }

    pub fn clock(&self) -> &CrdtClock {
        &self.clock
    }

    pub fn blockstore(&self) -> &TransactionBlockstore {
        &self.blocks
    }

    /// Apply `updates` atomically and merge the result into the clock.
    ///
    /// Returns the head produced by this write. Concurrent calls are not
    /// serialized; the clock folds their heads together.
    ///
    /// Once the transaction has committed the write has happened, so a
    /// failure to persist the head afterwards is logged and not returned.
    /// The next successful persist stores the latest head, which covers
    /// this write.
    pub async fn bulk(&self, updates: Vec<DocUpdate>) -> CrdtResult<BulkResult> {
        let _shared = self.maintenance.read().await;
        let pending = &updates;
        let (head, prior) = self
            .blocks
            .transaction(|tx| async move {
                let prior = self.clock.head();
                let head = self.logic.apply_bulk(&tx, &prior, pending).await?;
                Ok::<_, CrdtError>((head, prior))
            })
            .await?;

        let outcome = self.clock.apply_head(&head, &prior, &updates);
        debug!(
            name = %self.name,
            updates = updates.len(),
            head = %outcome.head,
            concurrent = outcome.is_concurrent(),
            "bulk applied"
        );
        if let Err(e) = self.persist_head().await {
            warn!(name = %self.name, error = %e, "could not persist head");
        }
        Ok(BulkResult { head })
    }

    /// The current value of `key`, or `None` if it is absent or deleted.
    pub async fn get(&self, key: &str) -> CrdtResult<Option<DocValue>> {
        let head = self.clock.head();
        let found = self.logic.get_value(&self.blocks, &head, key).await?;
        Ok(found.filter(|doc| !doc.del))
    }

    /// The latest state of every key changed since `since` (from genesis
    /// when `None`). Deletions are reported as tombstones.
    pub async fn changes(&self, since: Option<&ClockHead>) -> CrdtResult<Vec<DocValue>> {
        let head = self.clock.head();
        let genesis = ClockHead::new();
        let since = since.unwrap_or(&genesis);
        self.logic.changes_since(&self.blocks, &head, since).await
    }

    /// Remove blocks unreachable from the current head. Logical content is
    /// unchanged. Returns the number of blocks removed.
    pub async fn compact(&self) -> CrdtResult<usize> {
        let _exclusive = self.maintenance.write().await;
        let head = self.clock.head();
        let removed = self.logic.compact(&self.blocks, &head).await?;
        info!(name = %self.name, removed, "database compacted");
        Ok(removed)
    }

    /// Register `index` under its name, returning any index it replaced.
    /// Registered indexes are reset whenever concurrent writes merge.
    pub fn register_index(&self, index: Arc<dyn Index>) -> Option<Arc<dyn Index>> {
        debug!(name = %self.name, index = %index.name(), "index registered");
        self.indexes.insert(index)
    }

    pub fn index(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes.get(name)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.names()
    }

    /// Call `listener` with the updates of every head change.
    ///
    /// Listeners run while the clock's lock is held. They must not call
    /// back into this database or its clock (e.g. [`Crdt::head`]); doing so
    /// deadlocks.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[DocUpdate]) + Send + Sync + 'static,
    {
        self.clock.on_tick(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.clock.remove_tick(id)
    }

    /// Call `listener` whenever concurrent writes are merged.
    ///
    /// As with [`Crdt::subscribe`], the listener runs under the clock's lock
    /// and must not call back into this database.
    pub fn on_zoom<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.clock.on_zoom(listener)
    }

    /// Irreversibly delete every block and the persisted head.
    pub async fn destroy(&self) -> CrdtResult<()> {
        let _exclusive = self.maintenance.write().await;
        self.blocks.destroy().await?;
        self.meta.destroy().await?;
        self.clock.set_head(ClockHead::new());
        info!(name = %self.name, "database destroyed");
        Ok(())
    }

    async fn persist_head(&self) -> CrdtResult<()> {
        let _serial = self.persist.lock().await;
        let head = self.clock.head();
        let bytes = serde_json::to_vec(&head).map_err(|e| CrdtError::InvalidHead(e.to_string()))?;
        self.meta.put(HEAD_KEY, &bytes).await?;
        Ok(())
    }
}

async fn load_head(meta: &StoreHandle) -> CrdtResult<ClockHead> {
    match meta.get(HEAD_KEY).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| CrdtError::InvalidHead(e.to_string())),
        Err(e) if e.is_not_found() => Ok(ClockHead::new()),
        Err(e) => Err(e.into()),
    }
}

impl std::fmt::Debug for Crdt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crdt")
            .field("name", &self.name)
            .field("head", &self.clock.head())
            .field("blocks", &self.blocks)
            .finish()
    }
}
