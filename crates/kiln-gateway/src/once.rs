//! Keyed compute-once cells for async construction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// A map of lazily-initialized values, one per key.
///
/// The first caller for a key runs the initializer; concurrent callers for
/// the same key wait for that in-flight initialization and share its
/// result. A failed initialization is not cached: the next caller retries.
pub struct KeyedResolveOnce<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> KeyedResolveOnce<T> {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Return the value for `key`, initializing it with `init` if needed.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &str, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().expect("lock poisoned");
            Arc::clone(cells.entry(key.to_string()).or_default())
        };
        cell.get_or_try_init(init).await.cloned()
    }

    /// The ready value for `key`, if initialization has completed.
    pub fn get(&self, key: &str) -> Option<T> {
        let cells = self.cells.lock().expect("lock poisoned");
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Forget the value for `key`. Returns `true` if a ready value existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut cells = self.cells.lock().expect("lock poisoned");
        cells
            .remove(key)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of keys with a ready value.
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().expect("lock poisoned");
        cells.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for KeyedResolveOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for KeyedResolveOnce<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.cells.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("KeyedResolveOnce")
            .field("keys", &count)
            .finish()
    }
}
