//! # Tenant Store Manager
//!
//! Lazy-opens tenant stores on first access and keeps at most `capacity` of
//! them alive in an LRU cache. Eviction only drops the manager's `Arc`; a
//! store that is mid-request keeps working until its last clone goes away,
//! so eviction can never break an in-flight transaction.
//!
//! One mutex guards the cache. Store handles themselves are internally
//! synchronized, so the lock is held only for the map work plus the
//! (fast, local) open+migrate of a cache miss.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::TenantStore;
use crate::types::TenantId;

/// LRU cache of open tenant stores, keyed by tenant id.
pub struct StoreManager {
    data_dir: PathBuf,
    stores: Mutex<LruCache<TenantId, Arc<TenantStore>>>,
}

impl StoreManager {
    /// Creates a manager rooted at `data_dir`, holding at most `capacity`
    /// open stores. The directory is created if missing.
    pub fn new(data_dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            data_dir,
            stores: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Returns the store for `tenant`, opening and migrating it on first
    /// access.
    ///
    /// A cache hit promotes the entry to most-recently-used. A miss opens
    /// the store, inserts it, and — at capacity — evicts the least-recently
    /// used store. Open/migrate failures are returned and nothing is cached.
    pub async fn open(&self, tenant: &TenantId) -> Result<Arc<TenantStore>> {
        let mut stores = self.stores.lock().await;

        if let Some(store) = stores.get(tenant) {
            return Ok(store.clone());
        }

        let store = Arc::new(TenantStore::open(&self.data_dir, tenant)?);
        if let Some((evicted, _)) = stores.push(tenant.clone(), store.clone()) {
            tracing::info!(tenant = %evicted, "evicted tenant store from cache");
        }
        Ok(store)
    }

    /// Number of stores currently held open.
    pub async fn open_count(&self) -> usize {
        self.stores.lock().await.len()
    }

    /// Releases every cached store handle. Idempotent.
    ///
    /// Connections close when the last `Arc` clone drops, so stores still in
    /// use by a request finish cleanly first.
    pub async fn close_all(&self) {
        let mut stores = self.stores.lock().await;
        if !stores.is_empty() {
            tracing::info!(count = stores.len(), "closing all tenant stores");
        }
        stores.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
