//! Shared cache of constructed engine instances.
//!
//! Construction is keyed by provisioning configuration. Concurrent lookups for
//! one key wait on the same in-flight construction; a failed construction is
//! not cached so the next lookup tries again.

use crate::engine::HighlightEngine;
use crate::error::HighlightError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::OnceCell;

type EngineCell = Arc<OnceCell<Arc<dyn HighlightEngine>>>;

/// Get-or-create cache for engine instances.
#[derive(Default)]
pub struct EngineRegistry {
    entries: Mutex<HashMap<String, EngineCell>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by the bundled entry points.
    pub fn global() -> Arc<EngineRegistry> {
        static GLOBAL: OnceLock<Arc<EngineRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(EngineRegistry::new())).clone()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, EngineCell>>, HighlightError> {
        self.entries.lock().map_err(|_| HighlightError::Poisoned)
    }

    /// Return the engine cached under `key`, constructing it with `init` if needed.
    ///
    /// # Arguments
    /// - `key`: Deterministic provisioning key.
    /// - `init`: Construction future; only awaited by the first caller.
    ///
    /// # Returns
    /// The shared engine for `key`.
    ///
    /// # Errors
    /// Propagates the construction error; the slot stays empty so later calls
    /// retry. Returns [`HighlightError::Poisoned`] when registry state is poisoned.
    pub async fn get_or_try_init<F, Fut>(
        &self,
        key: &str,
        init: F,
    ) -> Result<Arc<dyn HighlightEngine>, HighlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn HighlightEngine>, HighlightError>>,
    {
        let cell = self.entries()?.entry(key.to_string()).or_default().clone();
        let engine = cell.get_or_try_init(init).await?;
        Ok(engine.clone())
    }

    /// Already constructed engine for `key`, without constructing.
    pub fn get(&self, key: &str) -> Option<Arc<dyn HighlightEngine>> {
        self.entries()
            .ok()?
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Drop the cached engine for `key`; in-flight holders keep their `Arc`.
    ///
    /// # Returns
    /// `true` when an entry was removed.
    pub fn dispose(&self, key: &str) -> bool {
        self.entries()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries() {
            entries.clear();
        }
    }

    /// Number of keys with a constructed or in-flight engine.
    pub fn len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("len", &self.len())
            .finish()
    }
}
