use assess_core::model::SessionResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Read cache for downstream views, keyed by tags.
///
/// `invalidate` is fire-and-forget; callers never observe its outcome.
/// `lookup` and `store` default to a cache that holds nothing.
pub trait ResultCache: Send + Sync {
    fn invalidate(&self, tags: &[&str]);

    fn lookup(&self, _key: &str) -> Option<SessionResult> {
        None
    }

    fn store(&self, _key: &str, _tags: &[&str], _result: SessionResult) {}
}

#[derive(Debug, Clone)]
struct CacheEntry {
    tags: Vec<String>,
    result: SessionResult,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    invalidations: Vec<Vec<String>>,
}

/// Process-local tag cache. Invalidating a tag evicts every entry carrying it.
#[derive(Clone, Default)]
pub struct InMemoryResultCache {
    state: Arc<Mutex<CacheState>>,
}

impl InMemoryResultCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `invalidate` call seen so far, in order.
    #[must_use]
    pub fn invalidations(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .map(|s| s.invalidations.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn invalidation_count(&self) -> usize {
        self.state.lock().map_or(0, |s| s.invalidations.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |s| s.entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for InMemoryResultCache {
    fn invalidate(&self, tags: &[&str]) {
        let Ok(mut state) = self.state.lock() else {
            tracing::warn!("result cache lock poisoned; invalidation dropped");
            return;
        };
        state
            .entries
            .retain(|_, entry| !entry.tags.iter().any(|t| tags.contains(&t.as_str())));
        state
            .invalidations
            .push(tags.iter().map(|t| (*t).to_owned()).collect());
        tracing::debug!(?tags, remaining = state.entries.len(), "result cache invalidated");
    }

    fn lookup(&self, key: &str) -> Option<SessionResult> {
        let state = self.state.lock().ok()?;
        state.entries.get(key).map(|entry| entry.result.clone())
    }

    fn store(&self, key: &str, tags: &[&str], result: SessionResult) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.insert(
                key.to_owned(),
                CacheEntry {
                    tags: tags.iter().map(|t| (*t).to_owned()).collect(),
                    result,
                },
            );
        }
    }
}
