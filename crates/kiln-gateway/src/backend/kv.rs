use std::sync::OnceLock;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backend::{validate_key, GatewayKind, STORAGE_VERSION};
use crate::error::{GatewayError, GatewayResult};
use crate::naming::StoreName;
use crate::once::KeyedResolveOnce;
use crate::traits::Gateway;
use crate::uri::{param, StoreUri};

/// Name of the tree holding the on-disk format version.
const VERSION_TREE: &str = "version";

/// Open sled databases, one per directory for the whole process.
///
/// sled takes an exclusive lock on its directory, so every gateway that
/// points at the same path must share one handle.
fn connections() -> &'static KeyedResolveOnce<sled::Db> {
    static CONNECTIONS: OnceLock<KeyedResolveOnce<sled::Db>> = OnceLock::new();
    CONNECTIONS.get_or_init(KeyedResolveOnce::new)
}

/// Embedded key-value gateway backed by sled.
///
/// The database lives at the URI path; each logical store partition is a
/// separate sled tree named by its connection key (`full:role`).
pub struct KvGateway;

impl KvGateway {
    pub fn new() -> Self {
        Self
    }

    async fn connect(uri: &StoreUri) -> GatewayResult<sled::Db> {
        if uri.path().is_empty() {
            return Err(GatewayError::InvalidUri {
                uri: uri.to_string(),
                reason: "kv store needs a directory path".into(),
            });
        }
        let path = uri.path().to_string();
        connections()
            .get_or_try_init(&path, || async {
                let dir = path.clone();
                let db = tokio::task::spawn_blocking(move || sled::open(dir)).await??;
                let versions = db.open_tree(VERSION_TREE)?;
                match versions.get(VERSION_TREE)? {
                    None => {
                        versions.insert(VERSION_TREE, STORAGE_VERSION.as_bytes())?;
                    }
                    Some(found) if found.as_ref() != STORAGE_VERSION.as_bytes() => {
                        warn!(
                            path = %path,
                            found = %String::from_utf8_lossy(&found),
                            expected = STORAGE_VERSION,
                            "kv store version mismatch"
                        );
                    }
                    Some(_) => {}
                }
                info!(path = %path, "kv store opened");
                Ok::<_, GatewayError>(db)
            })
            .await
    }

    async fn tree(uri: &StoreUri) -> GatewayResult<sled::Tree> {
        let name = StoreName::from_uri(uri)?;
        let db = Self::connect(uri).await?;
        Ok(db.open_tree(name.connection_key())?)
    }
}

impl Default for KvGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for KvGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Kv
    }

    async fn start(&self, base: &StoreUri) -> GatewayResult<StoreUri> {
        Self::tree(base).await?;
        Ok(base.with_default_param(param::VERSION, STORAGE_VERSION))
    }

    async fn close(&self, base: &StoreUri) -> GatewayResult<()> {
        Self::tree(base).await?.flush_async().await?;
        Ok(())
    }

    async fn destroy(&self, base: &StoreUri) -> GatewayResult<()> {
        let tree = Self::tree(base).await?;
        debug!(entries = tree.len(), "destroying kv store");
        tree.clear()?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn put(&self, uri: &StoreUri, bytes: &[u8]) -> GatewayResult<()> {
        let key = uri.key()?;
        validate_key(key)?;
        let tree = Self::tree(uri).await?;
        tree.insert(key, bytes)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn get(&self, uri: &StoreUri) -> GatewayResult<Vec<u8>> {
        let key = uri.key()?;
        validate_key(key)?;
        let tree = Self::tree(uri).await?;
        match tree.get(key)? {
            Some(bytes) => Ok(bytes.to_vec()),
            None => Err(GatewayError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn delete(&self, uri: &StoreUri) -> GatewayResult<()> {
        let key = uri.key()?;
        validate_key(key)?;
        let tree = Self::tree(uri).await?;
        tree.remove(key)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn keys(&self, base: &StoreUri) -> GatewayResult<Vec<String>> {
        let tree = Self::tree(base).await?;
        let mut keys = Vec::with_capacity(tree.len());
        for key in tree.iter().keys() {
            keys.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for KvGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvGateway").finish()
    }
}
