// Bounded, time-expiring cache of localization bundles. Built once at
// bootstrap and shared by every request; a miss only costs a lookup.
use crate::config::CacheConfig;
use crate::metrics_defs::{LOOKUP_CACHE_HIT, LOOKUP_CACHE_MISS};
use moka::sync::Cache;
use shared::counter;
use sheets::LocalizationMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BundleKey {
    pub tenant_id: String,
    pub module: String,
    pub locale: String,
}

impl BundleKey {
    pub fn new(tenant_id: &str, module: &str, locale: &str) -> Self {
        BundleKey {
            tenant_id: tenant_id.to_string(),
            module: module.to_string(),
            locale: locale.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct LookupCache {
    cache: Cache<BundleKey, Arc<LocalizationMap>>,
}

impl LookupCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        LookupCache { cache }
    }

    pub fn get(&self, key: &BundleKey) -> Option<Arc<LocalizationMap>> {
        let hit = self.cache.get(key);
        let metric_def = if hit.is_some() {
            LOOKUP_CACHE_HIT
        } else {
            LOOKUP_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        hit
    }

    pub fn insert(&self, key: BundleKey, bundle: Arc<LocalizationMap>) {
        self.cache.insert(key, bundle);
    }

    pub fn invalidate(&self, key: &BundleKey) {
        self.cache.invalidate(key);
    }
}
