//! CRDT engine for Kiln.
//!
//! [`Crdt`] ties the pieces of a database together: every
//! [`bulk`](Crdt::bulk) write runs in a blockstore transaction, the
//! [`UpdateLogic`] turns the updates into DAG nodes inside that transaction,
//! and the resulting head is merged into the Merkle clock against the head
//! the write started from. Concurrent writers are never serialized against
//! each other; the clock's merge makes their heads converge.
//!
//! # Design Rules
//!
//! 1. A bulk write either commits and merges completely or leaves no trace.
//! 2. The starting head is captured inside the transaction, before any
//!    node is written, and passed unchanged to the merge.
//! 3. Deleted documents read as absent; the change feed reports them as
//!    tombstones.
//! 4. Registered indexes are reset whenever concurrent writes merge.
//! 5. The merged head is persisted to the meta store after every write.

pub mod config;
pub mod crdt;
pub mod error;
pub mod index;
pub mod logic;

pub use config::CrdtConfig;
pub use crdt::{Crdt, HEAD_KEY};
pub use error::{CrdtError, CrdtResult};
pub use index::Index;
pub use logic::{DagLog, EventNode, UpdateLogic};
