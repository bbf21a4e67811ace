//! Foundation types for Kiln, an embedded content-addressed document store.
//!
//! Every other Kiln crate depends on `kiln-types`.
//!
//! # Key Types
//!
//! - [`Cid`]: Content identifier (BLAKE3 digest of a block's bytes)
//! - [`Block`]: Immutable byte payload addressed by its [`Cid`]
//! - [`ClockHead`]: Ordered set of DAG tips, the CRDT's convergent state
//! - [`DocUpdate`]: A caller-supplied document write or tombstone
//! - [`BulkResult`]: Outcome of applying a batch of updates

pub mod block;
pub mod cid;
pub mod error;
pub mod head;
pub mod update;

pub use block::Block;
pub use cid::Cid;
pub use error::TypeError;
pub use head::ClockHead;
pub use update::{BulkResult, DocUpdate, DocValue};
