//! Merkle clock for Kiln.
//!
//! The clock owns the current [`ClockHead`](kiln_types::ClockHead) of a
//! database: the set of DAG roots not superseded by any other root. Every
//! committed transaction hands the clock its new head together with the
//! head it observed when it started. The difference between the clock's
//! head and that starting head is exactly the set of roots committed
//! concurrently by other writers; those are folded back into the result,
//! so writers never need to coordinate.
//!
//! # Design Rules
//!
//! 1. Head mutation and listener notification form one critical section.
//! 2. The merged head is always deduplicated and sorted by canonical cid.
//! 3. Zoom listeners fire before tick listeners, each in registration order.
//! 4. Applying a head equal to the current one (same cids, same order) is a
//!    no-op and notifies nobody.

pub mod clock;
pub mod listeners;

pub use clock::{ApplyOutcome, CrdtClock};
pub use listeners::{ListenerId, TickListener, ZoomListener};
