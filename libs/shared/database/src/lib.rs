pub mod cache;
pub mod context;
pub mod memory;
pub mod realtime;
pub mod store;
pub mod supabase;

pub use cache::{CacheError, LocalCache, MemoryCache, RedisCache};
pub use context::PortalContext;
pub use memory::InMemoryRecordStore;
pub use realtime::{ChangeEvent, ChangeFeed, ChangeKind, Subscription};
pub use store::{Order, Query, RecordStore, StoreError, StoreResult, SupabaseRecordStore};
pub use supabase::SupabaseClient;
