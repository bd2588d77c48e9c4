use std::collections::HashMap;
use std::sync::Mutex;

use crate::normalize::ProviderRecord;

/// Storage for successful provider lookups, keyed by the searched name.
pub trait FetchCache: Send + Sync {
    fn get(&self, name: &str) -> Option<ProviderRecord>;
    fn put(&self, name: &str, record: ProviderRecord);
}

/// Keeps every entry for the life of the process. The roster is small, so
/// nothing is ever evicted.
#[derive(Debug, Default)]
pub struct UnboundedCache {
    entries: Mutex<HashMap<String, ProviderRecord>>,
}

impl UnboundedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProviderRecord>> {
        // A panic mid-insert cannot leave a half-written record behind.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FetchCache for UnboundedCache {
    fn get(&self, name: &str) -> Option<ProviderRecord> {
        self.lock().get(&cache_key(name)).cloned()
    }

    fn put(&self, name: &str, record: ProviderRecord) {
        self.lock().insert(cache_key(name), record);
    }
}

/// Same string the provider is queried with.
fn cache_key(name: &str) -> String {
    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_ignores_surrounding_space() {
        let cache = UnboundedCache::new();
        assert!(cache.get("Islam Makhachev").is_none());
        cache.put(" Islam Makhachev ", ProviderRecord::default());
        assert!(cache.get("Islam Makhachev").is_some());
        assert_eq!(cache.len(), 1);
    }
}
