//! Document update logic: how bulk writes become DAG nodes and how the DAG
//! is read back.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kiln_blockstore::{Transaction, TransactionBlockstore};
use kiln_types::{Block, Cid, ClockHead, DocUpdate, DocValue};

use crate::error::{CrdtError, CrdtResult};

/// The seam between the engine and the document encoding.
///
/// The engine owns transactions and the clock; implementations own the
/// shape of the DAG.
#[async_trait]
pub trait UpdateLogic: Send + Sync {
    /// Write nodes for `updates` on top of `head` into `tx` and return the
    /// candidate new head.
    async fn apply_bulk(
        &self,
        tx: &Transaction,
        head: &ClockHead,
        updates: &[DocUpdate],
    ) -> CrdtResult<ClockHead>;

    /// The latest state of `key` reachable from `head`, tombstones
    /// included.
    async fn get_value(
        &self,
        store: &TransactionBlockstore,
        head: &ClockHead,
        key: &str,
    ) -> CrdtResult<Option<DocValue>>;

    /// The latest state of every key changed between `since` and `head`.
    async fn changes_since(
        &self,
        store: &TransactionBlockstore,
        head: &ClockHead,
        since: &ClockHead,
    ) -> CrdtResult<Vec<DocValue>>;

    /// Drop blocks no longer reachable from `head`. Returns how many went.
    async fn compact(&self, store: &TransactionBlockstore, head: &ClockHead) -> CrdtResult<usize>;
}

/// One bulk write as stored on the DAG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventNode {
    pub parents: ClockHead,
    pub updates: Vec<DocUpdate>,
}

/// Update logic storing each bulk as a single JSON event node whose
/// parents are the head it was written on.
///
/// Reads walk back from the head in reverse causal order: a node is only
/// visited once every node built on top of it has been. Among nodes ready
/// at the same time the smallest cid goes first, so concurrent writes to
/// one key resolve the same way on every replica regardless of branch
/// length.
#[derive(Clone, Copy, Debug, Default)]
pub struct DagLog;

impl DagLog {
    pub fn new() -> Self {
        Self
    }
}

async fn load_node(store: &TransactionBlockstore, cid: &Cid) -> CrdtResult<EventNode> {
    let block = store.get(cid).await?;
    block.to_json().map_err(|e| CrdtError::InvalidNode {
        cid: *cid,
        reason: e.to_string(),
    })
}

/// Visit every node reachable from `head` without entering `stop`, children
/// before parents, ties broken by canonical cid order. `visit` may break the
/// walk early.
async fn walk<F>(
    store: &TransactionBlockstore,
    head: &ClockHead,
    stop: &HashSet<Cid>,
    mut visit: F,
) -> CrdtResult<()>
where
    F: FnMut(Cid, &EventNode) -> ControlFlow<()> + Send,
{
    // load the sub-DAG first; the order needs every edge
    let mut nodes: HashMap<Cid, EventNode> = HashMap::new();
    let mut pending: Vec<Cid> = head.iter().copied().filter(|c| !stop.contains(c)).collect();
    while let Some(cid) = pending.pop() {
        if nodes.contains_key(&cid) {
            continue;
        }
        let node = load_node(store, &cid).await?;
        pending.extend(node.parents.iter().copied().filter(|p| !stop.contains(p) && !nodes.contains_key(p)));
        nodes.insert(cid, node);
    }

    let mut children: HashMap<Cid, usize> = nodes.keys().map(|c| (*c, 0)).collect();
    for node in nodes.values() {
        for parent in node.parents.clone().unique() {
            if let Some(n) = children.get_mut(&parent) {
                *n += 1;
            }
        }
    }

    let mut ready: BTreeSet<Cid> = children
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(c, _)| *c)
        .collect();
    while let Some(cid) = ready.pop_first() {
        let Some(node) = nodes.get(&cid) else { continue };
        if visit(cid, node).is_break() {
            return Ok(());
        }
        for parent in node.parents.clone().unique() {
            if let Some(n) = children.get_mut(&parent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(parent);
                }
            }
        }
    }
    Ok(())
}

async fn reachable(store: &TransactionBlockstore, head: &ClockHead) -> CrdtResult<HashSet<Cid>> {
    let mut cids = HashSet::new();
    walk(store, head, &HashSet::new(), |cid, _| {
        cids.insert(cid);
        ControlFlow::Continue(())
    })
    .await?;
    Ok(cids)
}

#[async_trait]
impl UpdateLogic for DagLog {
    async fn apply_bulk(
        &self,
        tx: &Transaction,
        head: &ClockHead,
        updates: &[DocUpdate],
    ) -> CrdtResult<ClockHead> {
        let node = EventNode {
            parents: head.clone(),
            updates: updates.to_vec(),
        };
        let block = Block::from_json(&node)?;
        let cid = block.cid;
        tx.put_block(block)?;
        debug!(tx = tx.id(), cid = %cid.short(), parents = head.len(), updates = updates.len(), "event node written");
        Ok(ClockHead::single(cid))
    }

    async fn get_value(
        &self,
        store: &TransactionBlockstore,
        head: &ClockHead,
        key: &str,
    ) -> CrdtResult<Option<DocValue>> {
        let mut found = None;
        walk(store, head, &HashSet::new(), |_, node| {
            match node.updates.iter().rev().find(|u| u.key == key) {
                Some(update) => {
                    found = Some(DocValue::from(update.clone()));
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        })
        .await?;
        Ok(found)
    }

    async fn changes_since(
        &self,
        store: &TransactionBlockstore,
        head: &ClockHead,
        since: &ClockHead,
    ) -> CrdtResult<Vec<DocValue>> {
        let old = reachable(store, since).await?;
        let mut latest: BTreeMap<String, DocValue> = BTreeMap::new();
        walk(store, head, &old, |_, node| {
            for update in node.updates.iter().rev() {
                latest
                    .entry(update.key.clone())
                    .or_insert_with(|| DocValue::from(update.clone()));
            }
            ControlFlow::Continue(())
        })
        .await?;
        Ok(latest.into_values().collect())
    }

    async fn compact(&self, store: &TransactionBlockstore, head: &ClockHead) -> CrdtResult<usize> {
        let live = reachable(store, head).await?;
        Ok(store.retain(&live).await?)
    }
}
