use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Watched keys and the cancellation scope of each one's worker.
///
/// The single source of truth for "is this key watched". The lock covers the
/// map only and is never held across I/O. Registries are plain values, so
/// independent ones can coexist in one process.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    scopes: Mutex<HashMap<Vec<u8>, CancellationToken>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh scope for `key` and hands it to `launch` before the
    /// lock is released, so no second caller can observe the key as free
    /// while the first one is still starting its worker.
    ///
    /// Returns `false` without calling `launch` if `key` is already present.
    pub fn register_with<F>(
        &self,
        key: &[u8],
        launch: F,
    ) -> bool
    where
        F: FnOnce(CancellationToken),
    {
        let mut scopes = self.scopes.lock();
        if scopes.contains_key(key) {
            debug!(key = ?String::from_utf8_lossy(key), "watch already registered");
            return false;
        }

        let scope = CancellationToken::new();
        scopes.insert(key.to_vec(), scope.clone());
        launch(scope);
        true
    }

    /// Cancels and removes the scope for `key`. Does not wait for the worker.
    pub fn deregister(
        &self,
        key: &[u8],
    ) -> bool {
        match self.scopes.lock().remove(key) {
            Some(scope) => {
                scope.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels and removes every scope in one sweep. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut scopes = self.scopes.lock();
        let count = scopes.len();
        for (_, scope) in scopes.drain() {
            scope.cancel();
        }
        count
    }

    pub fn contains(
        &self,
        key: &[u8],
    ) -> bool {
        self.scopes.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.scopes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.lock().is_empty()
    }
}
