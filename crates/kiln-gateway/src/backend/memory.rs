use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{validate_key, GatewayKind, STORAGE_VERSION};
use crate::error::{GatewayError, GatewayResult};
use crate::naming::StoreName;
use crate::traits::Gateway;
use crate::uri::{param, StoreUri};

type Partition = BTreeMap<String, Vec<u8>>;

/// In-memory gateway.
///
/// Intended for tests and ephemeral databases. Each logical store partition
/// is a `BTreeMap` keyed by entry key, held behind a `RwLock`. Data is lost
/// when the gateway is dropped.
pub struct MemoryGateway {
    stores: RwLock<HashMap<String, Partition>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of entries across all partitions.
    pub fn len(&self) -> usize {
        self.stores
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locate(uri: &StoreUri) -> GatewayResult<(String, String)> {
        let store = StoreName::from_uri(uri)?.connection_key();
        let key = uri.key()?;
        validate_key(key)?;
        Ok((store, key.to_string()))
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Memory
    }

    async fn start(&self, base: &StoreUri) -> GatewayResult<StoreUri> {
        let store = StoreName::from_uri(base)?.connection_key();
        self.stores
            .write()
            .expect("lock poisoned")
            .entry(store)
            .or_default();
        Ok(base.with_default_param(param::VERSION, STORAGE_VERSION))
    }

    async fn close(&self, _base: &StoreUri) -> GatewayResult<()> {
        Ok(())
    }

    async fn destroy(&self, base: &StoreUri) -> GatewayResult<()> {
        let store = StoreName::from_uri(base)?.connection_key();
        if let Some(partition) = self.stores.write().expect("lock poisoned").get_mut(&store) {
            debug!(store = %store, entries = partition.len(), "destroying memory store");
            partition.clear();
        }
        Ok(())
    }

    async fn put(&self, uri: &StoreUri, bytes: &[u8]) -> GatewayResult<()> {
        let (store, key) = Self::locate(uri)?;
        self.stores
            .write()
            .expect("lock poisoned")
            .entry(store)
            .or_default()
            .insert(key, bytes.to_vec());
        Ok(())
    }

    async fn get(&self, uri: &StoreUri) -> GatewayResult<Vec<u8>> {
        let (store, key) = Self::locate(uri)?;
        let stores = self.stores.read().expect("lock poisoned");
        stores
            .get(&store)
            .and_then(|p| p.get(&key))
            .cloned()
            .ok_or(GatewayError::NotFound { key })
    }

    async fn delete(&self, uri: &StoreUri) -> GatewayResult<()> {
        let (store, key) = Self::locate(uri)?;
        if let Some(partition) = self.stores.write().expect("lock poisoned").get_mut(&store) {
            partition.remove(&key);
        }
        Ok(())
    }

    async fn keys(&self, base: &StoreUri) -> GatewayResult<Vec<String>> {
        let store = StoreName::from_uri(base)?.connection_key();
        let stores = self.stores.read().expect("lock poisoned");
        Ok(stores
            .get(&store)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for MemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGateway")
            .field("entry_count", &self.len())
            .finish()
    }
}
