use std::sync::Arc;

use tracing::warn;

use shared_config::AppConfig;

use crate::cache::{LocalCache, MemoryCache, RedisCache};
use crate::memory::InMemoryRecordStore;
use crate::realtime::ChangeFeed;
use crate::store::{RecordStore, SupabaseRecordStore};
use crate::supabase::SupabaseClient;

/// Explicit application state handed to every cell: configuration, the
/// record store, the local cache and the shared change feed.
#[derive(Clone)]
pub struct PortalContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<dyn LocalCache>,
    pub feed: ChangeFeed,
}

impl PortalContext {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let feed = store.changes().clone();
        Self { config, store, cache, feed }
    }

    /// Supabase-backed store; Redis cache when `REDIS_URL` is set and
    /// reachable, memory cache otherwise.
    pub async fn from_config(config: Arc<AppConfig>) -> Self {
        let feed = ChangeFeed::default();
        let supabase = Arc::new(SupabaseClient::new(&config));
        let store: Arc<dyn RecordStore> = Arc::new(SupabaseRecordStore::new(supabase, feed));

        let cache: Arc<dyn LocalCache> = match config.redis_url.as_deref() {
            Some(url) => match RedisCache::connect(url).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    warn!("Redis cache unavailable ({}), using in-process cache", e);
                    Arc::new(MemoryCache::new())
                }
            },
            None => Arc::new(MemoryCache::new()),
        };

        Self::new(config, store, cache)
    }

    /// Fully in-process context.
    pub fn in_memory(config: Arc<AppConfig>) -> (Self, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::default());
        let ctx = Self::new(config, store.clone(), Arc::new(MemoryCache::new()));
        (ctx, store)
    }
}
