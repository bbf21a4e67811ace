//! Secondary index registry.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// A derived view over the database that must be rebuilt when concurrent
/// writes are merged.
///
/// `reset` runs inside the clock's critical section, so it should only
/// mark the index stale and never block on I/O.
pub trait Index: Send + Sync {
    fn name(&self) -> &str;

    /// Discard derived state; it will be rebuilt from the merged head.
    fn reset(&self);
}

/// Name-keyed set of registered indexes.
#[derive(Clone, Default)]
pub(crate) struct IndexRegistry {
    indexes: Arc<RwLock<BTreeMap<String, Arc<dyn Index>>>>,
}

impl IndexRegistry {
    /// Register `index`, returning any index it replaced.
    pub(crate) fn insert(&self, index: Arc<dyn Index>) -> Option<Arc<dyn Index>> {
        let name = index.name().to_string();
        self.indexes
            .write()
            .expect("lock poisoned")
            .insert(name, index)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes
            .read()
            .expect("lock poisoned")
            .get(name)
            .cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.indexes
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub(crate) fn reset_all(&self) {
        let indexes = self.indexes.read().expect("lock poisoned");
        for (name, index) in indexes.iter() {
            debug!(index = %name, "resetting index after concurrent merge");
            index.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        resets: AtomicUsize,
    }

    impl Index for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(name: &'static str) -> Arc<Counting> {
        Arc::new(Counting {
            name,
            resets: AtomicUsize::new(0),
        })
    }

    #[test]
    fn reset_all_reaches_every_index() {
        let registry = IndexRegistry::default();
        let a = counting("by-date");
        let b = counting("by-owner");
        registry.insert(a.clone());
        registry.insert(b.clone());

        registry.reset_all();
        registry.reset_all();
        assert_eq!(a.resets.load(Ordering::SeqCst), 2);
        assert_eq!(b.resets.load(Ordering::SeqCst), 2);
        assert_eq!(registry.names(), vec!["by-date", "by-owner"]);
    }

    #[test]
    fn same_name_replaces() {
        let registry = IndexRegistry::default();
        assert!(registry.insert(counting("idx")).is_none());
        let replaced = registry.insert(counting("idx"));
        assert!(replaced.is_some());
        assert_eq!(registry.names().len(), 1);
        assert_eq!(registry.get("idx").map(|i| i.name().to_string()), Some("idx".into()));
        assert!(registry.get("missing").is_none());
    }
}
