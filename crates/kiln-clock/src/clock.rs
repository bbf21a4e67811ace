//! The CRDT clock and its head-merge algorithm.

use std::sync::{Arc, Mutex};

use kiln_types::{ClockHead, DocUpdate};
use tracing::{debug, info};

use crate::listeners::{ListenerId, Registry, TickListener, ZoomListener};

/// What an [`CrdtClock::apply_head`] call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// `false` when the incoming head equalled the current one and the call
    /// was a no-op.
    pub changed: bool,
    /// Roots committed by other writers while the transaction was in
    /// flight. Non-empty means zoom listeners fired.
    pub concurrent: ClockHead,
    /// The clock head after the call.
    pub head: ClockHead,
}

impl ApplyOutcome {
    pub fn is_concurrent(&self) -> bool {
        !self.concurrent.is_empty()
    }
}

struct ClockState {
    head: ClockHead,
    ticks: Registry<TickListener>,
    zooms: Registry<ZoomListener>,
}

/// Owner of a database's current head.
///
/// Listeners are invoked while the clock's lock is held and must not call
/// back into the clock.
pub struct CrdtClock {
    state: Mutex<ClockState>,
}

impl CrdtClock {
    /// A clock at genesis (empty head).
    pub fn new() -> Self {
        Self::with_head(ClockHead::new())
    }

    /// A clock starting from a known head, e.g. one loaded from storage.
    pub fn with_head(head: ClockHead) -> Self {
        Self {
            state: Mutex::new(ClockState {
                head,
                ticks: Registry::new(),
                zooms: Registry::new(),
            }),
        }
    }

    /// Snapshot of the current head.
    pub fn head(&self) -> ClockHead {
        self.state.lock().expect("lock poisoned").head.clone()
    }

    /// Replace the head without merging or notifying.
    pub fn set_head(&self, head: ClockHead) {
        let mut state = self.state.lock().expect("lock poisoned");
        debug!(head = %head, "clock head set");
        state.head = head;
    }

    /// Merge the head produced by a committed transaction.
    ///
    /// `prior_head` must be the head the transaction observed before doing
    /// any work. Roots in the current head but not in `prior_head` were
    /// committed concurrently; they are unioned with `new_head` and the
    /// result is sorted. Zoom listeners fire if any such roots exist, then
    /// tick listeners fire with `updates`.
    pub fn apply_head(
        &self,
        new_head: &ClockHead,
        prior_head: &ClockHead,
        updates: &[DocUpdate],
    ) -> ApplyOutcome {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.head == *new_head {
            debug!(head = %new_head, "clock head unchanged");
            return ApplyOutcome {
                changed: false,
                concurrent: ClockHead::new(),
                head: state.head.clone(),
            };
        }

        let original = state.head.clone();
        let concurrent: ClockHead = original
            .iter()
            .filter(|cid| !prior_head.contains(cid))
            .copied()
            .collect();
        let merged: ClockHead = concurrent
            .iter()
            .chain(new_head.iter())
            .copied()
            .collect::<ClockHead>()
            .unique()
            .sorted();
        state.head = merged.clone();

        if !concurrent.is_empty() {
            info!(
                original = %original,
                new = %new_head,
                prior = %prior_head,
                merged = %merged,
                concurrent = %concurrent,
                listeners = state.zooms.len(),
                "ZOOM: concurrent write detected"
            );
            for zoom in state.zooms.iter() {
                zoom();
            }
        }

        debug!(
            head = %merged,
            updates = updates.len(),
            listeners = state.ticks.len(),
            "clock head advanced"
        );
        for tick in state.ticks.iter() {
            tick(updates);
        }

        ApplyOutcome {
            changed: true,
            concurrent,
            head: merged,
        }
    }

    /// Register a change watcher, fired on every head change.
    ///
    /// Listeners run with the clock locked; calling back into the clock
    /// from one deadlocks.
    pub fn on_tick<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[DocUpdate]) + Send + Sync + 'static,
    {
        let listener: TickListener = Arc::new(listener);
        self.state.lock().expect("lock poisoned").ticks.add(listener)
    }

    /// Register a zoom listener, fired only on detected concurrency.
    pub fn on_zoom<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let listener: ZoomListener = Arc::new(listener);
        self.state.lock().expect("lock poisoned").zooms.add(listener)
    }

    pub fn remove_tick(&self, id: ListenerId) -> bool {
        self.state.lock().expect("lock poisoned").ticks.remove(id)
    }

    pub fn remove_zoom(&self, id: ListenerId) -> bool {
        self.state.lock().expect("lock poisoned").zooms.remove(id)
    }
}

impl Default for CrdtClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CrdtClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("CrdtClock")
            .field("head", &state.head)
            .field("ticks", &state.ticks.len())
            .field("zooms", &state.zooms.len())
            .finish()
    }
}
