//! Typed listener registries for clock events.

use std::sync::Arc;

use kiln_types::DocUpdate;

/// Called with the updates of every applied head change.
pub type TickListener = Arc<dyn Fn(&[DocUpdate]) + Send + Sync>;

/// Called with no arguments when a concurrent write is detected.
pub type ZoomListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned on registration; pass it back to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Listeners of one event kind, kept in registration order.
pub(crate) struct Registry<L> {
    entries: Vec<(ListenerId, L)>,
    next: u64,
}

impl<L: Clone> Registry<L> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next: 0,
        }
    }

    pub(crate) fn add(&mut self, listener: L) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &L> {
        self.entries.iter().map(|(_, l)| l)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_removal_is_exact() {
        let mut registry = Registry::<u32>::new();
        let a = registry.add(1);
        let b = registry.add(2);
        let c = registry.add(3);
        assert_ne!(a, b);

        assert!(registry.remove(b));
        assert!(!registry.remove(b));
        assert_eq!(registry.iter().copied().collect::<Vec<_>>(), vec![1, 3]);

        // ids are never reused
        let d = registry.add(4);
        assert!(d > c);
        assert_eq!(registry.len(), 3);
    }
}
