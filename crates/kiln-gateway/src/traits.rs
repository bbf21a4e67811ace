use async_trait::async_trait;

use crate::backend::GatewayKind;
use crate::error::GatewayResult;
use crate::uri::{param, StoreUri};

/// Durable key → bytes storage for one backend.
///
/// A gateway serves every store whose URI it is handed: the URI's `name`
/// and `store` parameters select the logical store and partition, and the
/// `key` parameter selects the entry.
///
/// All implementations must satisfy these invariants:
/// - `start` is idempotent.
/// - `put` overwrites or creates, and is safe to retry.
/// - `get` never returns partially-written bytes; absent keys fail with
///   [`GatewayError::NotFound`](crate::GatewayError::NotFound).
/// - `delete` of an absent key is not an error.
/// - `destroy` irreversibly removes every entry of the URI's logical store
///   partition, leaving other partitions untouched.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// The backend kind serving this gateway.
    fn kind(&self) -> GatewayKind;

    /// Initialize or validate the backing connection for `base`.
    ///
    /// Returns the effective base URI (with defaulted parameters filled in).
    async fn start(&self, base: &StoreUri) -> GatewayResult<StoreUri>;

    /// Release resources held for `base`.
    async fn close(&self, base: &StoreUri) -> GatewayResult<()>;

    /// Delete every entry stored under `base`.
    async fn destroy(&self, base: &StoreUri) -> GatewayResult<()>;

    /// Derive the address of `key` within `base`.
    fn build_url(&self, base: &StoreUri, key: &str) -> GatewayResult<StoreUri> {
        Ok(base.with_param(param::KEY, key))
    }

    /// Durably write `bytes` at `uri`.
    async fn put(&self, uri: &StoreUri, bytes: &[u8]) -> GatewayResult<()>;

    /// Read the bytes at `uri`.
    async fn get(&self, uri: &StoreUri) -> GatewayResult<Vec<u8>>;

    /// Remove the entry at `uri`.
    async fn delete(&self, uri: &StoreUri) -> GatewayResult<()>;

    /// List every key stored under `base`, sorted.
    async fn keys(&self, base: &StoreUri) -> GatewayResult<Vec<String>>;
}
