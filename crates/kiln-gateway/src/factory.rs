//! Resolution of store URIs to live gateways.
//!
//! [`GatewayFactory::resolve`] maps a `(uri, role)` pair to a started
//! gateway. The first caller for a pair constructs and starts the gateway;
//! later and concurrent callers receive the same instance. Unsupported
//! schemes fail before any I/O.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::backend::GatewayKind;
use crate::error::GatewayResult;
use crate::once::KeyedResolveOnce;
use crate::role::StoreRole;
use crate::traits::Gateway;
use crate::uri::{param, StoreUri};

/// A started gateway bound to one logical store partition.
///
/// Cloning is cheap; clones share the gateway.
#[derive(Clone)]
pub struct StoreHandle {
    gateway: Arc<dyn Gateway>,
    base: StoreUri,
}

impl StoreHandle {
    /// Start `gateway` on `base` and bind the result.
    pub async fn start(gateway: Arc<dyn Gateway>, base: StoreUri) -> GatewayResult<Self> {
        let base = gateway.start(&base).await?;
        Ok(Self { gateway, base })
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// The started base URI.
    pub fn base(&self) -> &StoreUri {
        &self.base
    }

    pub fn role(&self) -> GatewayResult<StoreRole> {
        self.base.store_role()
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> GatewayResult<()> {
        let uri = self.gateway.build_url(&self.base, key)?;
        self.gateway.put(&uri, bytes).await
    }

    pub async fn get(&self, key: &str) -> GatewayResult<Vec<u8>> {
        let uri = self.gateway.build_url(&self.base, key)?;
        self.gateway.get(&uri).await
    }

    pub async fn delete(&self, key: &str) -> GatewayResult<()> {
        let uri = self.gateway.build_url(&self.base, key)?;
        self.gateway.delete(&uri).await
    }

    pub async fn keys(&self) -> GatewayResult<Vec<String>> {
        self.gateway.keys(&self.base).await
    }

    pub async fn destroy(&self) -> GatewayResult<()> {
        self.gateway.destroy(&self.base).await
    }

    pub async fn close(&self) -> GatewayResult<()> {
        self.gateway.close(&self.base).await
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("kind", &self.gateway.kind())
            .field("base", &self.base.to_string())
            .finish()
    }
}

/// Memoizing resolver from `(uri, role)` to a started [`StoreHandle`].
#[derive(Debug, Default)]
pub struct GatewayFactory {
    handles: KeyedResolveOnce<StoreHandle>,
}

impl GatewayFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide factory.
    ///
    /// Every database opened without an explicit factory resolves through
    /// this one, so two opens of the same store share one connection.
    pub fn global() -> &'static GatewayFactory {
        static GLOBAL: OnceLock<GatewayFactory> = OnceLock::new();
        GLOBAL.get_or_init(GatewayFactory::new)
    }

    /// Resolve `uri` for `role`, constructing and starting the gateway on
    /// first use.
    pub async fn resolve(&self, uri: &StoreUri, role: StoreRole) -> GatewayResult<StoreHandle> {
        let base = uri.base().with_param(param::STORE, role.as_str());
        let kind = GatewayKind::from_scheme(base.scheme(), role)?;
        let key = base.to_string();

        self.handles
            .get_or_try_init(&key, || async {
                info!(uri = %key, kind = %kind, "opening store");
                StoreHandle::start(kind.build(), base.clone()).await
            })
            .await
            .inspect(|_| debug!(uri = %key, "store resolved"))
    }

    /// Resolve from a URI string.
    pub async fn resolve_str(&self, uri: &str, role: StoreRole) -> GatewayResult<StoreHandle> {
        self.resolve(&StoreUri::parse(uri)?, role).await
    }

    /// Number of live store handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop the cached handle for `(uri, role)` so the next resolve reopens.
    pub fn evict(&self, uri: &StoreUri, role: StoreRole) -> bool {
        let key = uri.base().with_param(param::STORE, role.as_str()).to_string();
        self.handles.remove(&key)
    }
}
