use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_database::{LocalCache, Order, Query, RecordStore};

use crate::models::RecordsError;

/// A record family kept in the record store and mirrored in the local cache.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Client-supplied fields of a new record.
    type Draft: DeserializeOwned + Send;

    const TABLE: &'static str;
    const CACHE_NAMESPACE: &'static str;
    const OWNER_COLUMN: &'static str = "user_id";

    fn natural_order() -> Order;

    fn from_draft(draft: Self::Draft) -> Result<Self, RecordsError>;

    fn id(&self) -> &str;

    /// Stamps the client-generated id and the owning patient.
    fn assign(&mut self, id: String, owner: &str);
}

/// Remote-first accessor with a local mirror.
///
/// Reads go to the record store and overwrite the owner's cache entry with
/// the raw remote rows; any store failure falls back to that entry. Creates
/// never fail on the remote side: the record lands in the cache either way,
/// and a record whose insert failed stays in an in-process pending set that
/// is merged into reads until the store returns it.
pub struct ReconcilingRepository<E: Entity> {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn LocalCache>,
    pending: Mutex<HashMap<String, Vec<Value>>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ReconcilingRepository<E> {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self {
            store,
            cache,
            pending: Mutex::new(HashMap::new()),
            _entity: PhantomData,
        }
    }

    pub fn cache_key(owner: &str) -> String {
        format!("{}:{}", E::CACHE_NAMESPACE, owner)
    }

    /// The owner's records in natural order. Never fails: an unreachable
    /// store yields the cached mirror, and no mirror yields an empty list.
    pub async fn fetch(&self, owner: &str, auth_token: Option<&str>) -> Vec<E> {
        let query = Query::new()
            .eq(E::OWNER_COLUMN, owner)
            .order(E::natural_order());

        let rows = match self.store.select(E::TABLE, &query, auth_token).await {
            Ok(rows) => {
                debug!("Fetched {} {} rows for {}", rows.len(), E::TABLE, owner);
                self.write_cache(owner, &rows).await;
                self.settle_pending(owner, &rows);
                rows
            }
            Err(e) => {
                if e.is_remote_unavailable() {
                    warn!("{} unavailable ({}), serving cached copy for {}", E::TABLE, e, owner);
                } else {
                    error!("{} read failed ({}), serving cached copy for {}", E::TABLE, e, owner);
                }
                self.read_cache(owner).await
            }
        };

        decode(self.with_pending(owner, rows))
    }

    /// Stores a new record for `owner` and returns it with its assigned id.
    /// Only an unserializable record is an error.
    pub async fn create(
        &self,
        owner: &str,
        mut record: E,
        auth_token: Option<&str>,
    ) -> Result<E, RecordsError> {
        record.assign(Uuid::new_v4().to_string(), owner);
        let row = serde_json::to_value(&record)?;

        let stored = match self.store.insert(E::TABLE, row.clone(), auth_token).await {
            Ok(saved) => {
                info!("Created {} {} for {}", E::TABLE, record.id(), owner);
                saved
            }
            Err(e) => {
                warn!("Insert into {} failed ({}), keeping {} locally", E::TABLE, e, record.id());
                self.lock_pending()
                    .entry(owner.to_string())
                    .or_default()
                    .push(row.clone());
                row
            }
        };

        let mut cached = self.read_cache(owner).await;
        cached.retain(|r| row_id(r) != Some(record.id()));
        cached.push(stored.clone());
        sort_rows(&mut cached, &E::natural_order());
        self.write_cache(owner, &cached).await;

        Ok(serde_json::from_value(stored).unwrap_or(record))
    }

    /// Removes the record remotely (best effort) and locally (always).
    pub async fn delete(&self, owner: &str, id: &str, auth_token: Option<&str>) {
        let query = Query::new().eq("id", id).eq(E::OWNER_COLUMN, owner);
        match self.store.delete(E::TABLE, &query, auth_token).await {
            Ok(rows) => info!("Deleted {} {} row(s) with id {}", rows.len(), E::TABLE, id),
            Err(e) => warn!("Remote delete of {} {} failed: {}", E::TABLE, id, e),
        }

        if let Some(rows) = self.lock_pending().get_mut(owner) {
            rows.retain(|r| row_id(r) != Some(id));
        }

        let mut cached = self.read_cache(owner).await;
        let before = cached.len();
        cached.retain(|r| row_id(r) != Some(id));
        if cached.len() != before {
            self.write_cache(owner, &cached).await;
        }
    }

    /// Records created in this process that the store has not yet accepted.
    pub fn pending_count(&self, owner: &str) -> usize {
        self.lock_pending().get(owner).map(Vec::len).unwrap_or(0)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>> {
        // A poisoned map only means another request panicked mid-update; the
        // data itself is still a valid list of rows.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops pending rows the remote now has.
    fn settle_pending(&self, owner: &str, remote: &[Value]) {
        let mut pending = self.lock_pending();
        if let Some(rows) = pending.get_mut(owner) {
            rows.retain(|p| !remote.iter().any(|r| row_id(r).is_some() && row_id(r) == row_id(p)));
            if rows.is_empty() {
                pending.remove(owner);
            }
        }
    }

    fn with_pending(&self, owner: &str, mut rows: Vec<Value>) -> Vec<Value> {
        let pending = self.lock_pending();
        let Some(extra) = pending.get(owner) else {
            return rows;
        };

        let missing: Vec<Value> = extra
            .iter()
            .filter(|p| !rows.iter().any(|r| row_id(r) == row_id(p)))
            .cloned()
            .collect();
        drop(pending);

        if !missing.is_empty() {
            debug!("Merging {} pending {} rows for {}", missing.len(), E::TABLE, owner);
            rows.extend(missing);
            sort_rows(&mut rows, &E::natural_order());
        }
        rows
    }

    async fn read_cache(&self, owner: &str) -> Vec<Value> {
        let key = Self::cache_key(owner);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Local cache read failed for {}: {}", key, e);
                Vec::new()
            }
        }
    }

    async fn write_cache(&self, owner: &str, rows: &[Value]) {
        let key = Self::cache_key(owner);
        let raw = match serde_json::to_string(rows) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not encode cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(&key, raw).await {
            warn!("Local cache write failed for {}: {}", key, e);
        }
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn sort_key(row: &Value, column: &str) -> Option<String> {
    match row.get(column) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Stable sort by the order column; rows without a value go last.
fn sort_rows(rows: &mut [Value], order: &Order) {
    let column = order.column();
    rows.sort_by(|a, b| {
        let (ka, kb) = (sort_key(a, column), sort_key(b, column));
        match (ka, kb) {
            (Some(x), Some(y)) => match order {
                Order::Asc(_) => x.cmp(&y),
                Order::Desc(_) => y.cmp(&x),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn decode<E: Entity>(rows: Vec<Value>) -> Vec<E> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<E>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed {} row: {}", E::TABLE, e);
                None
            }
        })
        .collect()
}
