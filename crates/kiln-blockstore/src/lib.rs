//! Transactional content-addressed blockstore for Kiln.
//!
//! Every write happens inside a [`Transaction`]: an isolated, in-memory
//! staging buffer. Committing a transaction flushes its blocks to the
//! durable data store; the committed buffer then stays queryable so that
//! reads see the transaction's blocks without waiting on the backend.
//!
//! # Read path
//!
//! [`TransactionBlockstore::get`] checks committed buffers (most recent
//! first), then the durable data store. Buffers of in-flight transactions
//! are only visible through their own [`Transaction`] handle.
//!
//! # Design Rules
//!
//! 1. Top-level `put` always fails: all mutation is transactional.
//! 2. A failed transaction leaves no trace: nothing joins the committed set.
//! 3. The store never serializes transactions against each other; head
//!    reconciliation belongs to the clock.
//! 4. Durable reads are verified against their cid.

pub mod error;
pub mod store;
pub mod transaction;

pub use error::{BlockstoreError, BlockstoreResult};
pub use store::TransactionBlockstore;
pub use transaction::Transaction;
