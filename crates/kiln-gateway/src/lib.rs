//! Durable storage gateways for Kiln.
//!
//! A gateway is the durable key → bytes boundary for one backend. Every
//! database has three logical partitions ([`StoreRole`]): `data` for
//! content blocks, `meta` for pointer records such as the clock head, and
//! `wal` for the replication log. Each partition is addressed by a
//! [`StoreUri`] and resolved independently through the [`GatewayFactory`].
//!
//! # Backends
//!
//! - [`MemoryGateway`] (`memory://`): process-local maps for tests
//! - [`FileGateway`] (`file://`, or a plain path): one file per key
//! - [`KvGateway`] (`indexdb://`): embedded sled database
//! - [`SqlGateway`] (`sqlite://`): SQLite, one table per role
//!
//! # Design Rules
//!
//! 1. Unsupported schemes fail with a configuration error before any I/O.
//! 2. One live gateway per `(uri, role)`; concurrent resolves share the
//!    in-flight construction.
//! 3. Reads never observe partially-written bytes.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod backend;
pub mod error;
pub mod factory;
pub mod naming;
pub mod once;
pub mod role;
pub mod traits;
pub mod uri;

pub use backend::{FileGateway, GatewayKind, KvGateway, MemoryGateway, SqlGateway, STORAGE_VERSION};
pub use error::{GatewayError, GatewayResult};
pub use factory::{GatewayFactory, StoreHandle};
pub use naming::{join_store_name, unique_store_name, StoreName};
pub use once::KeyedResolveOnce;
pub use role::StoreRole;
pub use traits::Gateway;
pub use uri::{param, StoreUri};
