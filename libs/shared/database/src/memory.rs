use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::realtime::{row_id_of, ChangeFeed, ChangeKind};
use crate::store::{Order, Query, RecordStore, StoreError, StoreResult};

/// Process-local record store with the same filtering semantics as the
/// PostgREST client. Availability switches simulate an unreachable or
/// misconfigured backend.
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    missing_tables: RwLock<HashSet<String>>,
    reads_available: AtomicBool,
    writes_available: AtomicBool,
    feed: ChangeFeed,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new(ChangeFeed::default())
    }
}

impl InMemoryRecordStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            missing_tables: RwLock::new(HashSet::new()),
            reads_available: AtomicBool::new(true),
            writes_available: AtomicBool::new(true),
            feed,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.reads_available.store(available, AtomicOrdering::SeqCst);
        self.writes_available.store(available, AtomicOrdering::SeqCst);
    }

    pub fn set_writes_available(&self, available: bool) {
        self.writes_available.store(available, AtomicOrdering::SeqCst);
    }

    pub async fn drop_table(&self, table: &str) {
        self.missing_tables.write().await.insert(table.to_string());
    }

    /// Raw rows of a table, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    async fn check(&self, table: &str, write: bool) -> StoreResult<()> {
        let available = if write {
            self.writes_available.load(AtomicOrdering::SeqCst)
        } else {
            self.reads_available.load(AtomicOrdering::SeqCst)
        };
        if !available {
            return Err(StoreError::Network("record store unreachable".to_string()));
        }
        if self.missing_tables.read().await.contains(table) {
            return Err(StoreError::MissingTable(format!("relation \"public.{}\" does not exist", table)));
        }
        Ok(())
    }
}

fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query.filters().iter().all(|(column, expected)| {
        row.get(column)
            .map(|actual| filter_text(actual) == *expected)
            .unwrap_or(false)
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => filter_text(x).cmp(&filter_text(y)),
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        _auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        self.check(table, false).await?;

        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| matches(row, query)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = query.ordering() {
            let column = order.column();
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                match order {
                    Order::Asc(_) => ord,
                    Order::Desc(_) => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.max_rows() {
            rows.truncate(limit);
        }

        debug!("Selected {} row(s) from {}", rows.len(), table);
        Ok(rows)
    }

    async fn insert(
        &self,
        table: &str,
        mut row: Value,
        _auth_token: Option<&str>,
    ) -> StoreResult<Value> {
        self.check(table, true).await?;

        if row_id_of(&row).is_none() {
            merge(&mut row, &serde_json::json!({ "id": Uuid::new_v4().to_string() }));
        }
        let id = row_id_of(&row);

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|existing| row_id_of(existing) == id) {
            return Err(StoreError::Api {
                status: 409,
                message: format!("duplicate key value violates unique constraint \"{}_pkey\"", table),
            });
        }
        rows.push(row.clone());
        drop(tables);

        self.feed.publish_rows(table, ChangeKind::Insert, std::slice::from_ref(&row));
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
        _auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        self.check(table, true).await?;

        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches(row, query)) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        drop(tables);

        self.feed.publish_rows(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(
        &self,
        table: &str,
        query: &Query,
        _auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        self.check(table, true).await?;

        let mut tables = self.tables.write().await;
        let mut removed = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| matches(row, query));
            *rows = kept;
            removed = gone;
        }
        drop(tables);

        self.feed.publish_rows(table, ChangeKind::Delete, &removed);
        Ok(removed)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
        auth_token: Option<&str>,
    ) -> StoreResult<Value> {
        self.check(table, true).await?;

        let key = row.get(on_conflict).map(filter_text);
        let existing = {
            let tables = self.tables.read().await;
            tables
                .get(table)
                .and_then(|rows| {
                    rows.iter()
                        .find(|r| key.is_some() && r.get(on_conflict).map(filter_text) == key)
                        .cloned()
                })
        };

        match (existing, key) {
            (Some(_), Some(key)) => {
                let query = Query::new().eq(on_conflict, key);
                let rows = self.update(table, &query, row, auth_token).await?;
                rows.into_iter().next().ok_or_else(|| StoreError::Api {
                    status: 409,
                    message: format!("{} row vanished during upsert", table),
                })
            }
            _ => self.insert(table, row, auth_token).await,
        }
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let store = InMemoryRecordStore::default();
        for (id, date) in [("a", "2024-03-02"), ("b", "2024-01-15"), ("c", "2024-02-10")] {
            store.insert("appointments", json!({ "id": id, "user_id": "p1", "date": date }), None)
                .await
                .unwrap();
        }
        store.insert("appointments", json!({ "id": "x", "user_id": "p2", "date": "2024-01-01" }), None)
            .await
            .unwrap();

        let rows = store
            .select("appointments", &Query::new().eq("user_id", "p1").order(Order::asc("date")), None)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_boolean_filters_match_text_form() {
        let store = InMemoryRecordStore::default();
        store.insert("appointments", json!({ "id": "a", "reminder_sent": false }), None).await.unwrap();
        let rows = store
            .select("appointments", &Query::new().eq("reminder_sent", false), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_network_error() {
        let store = InMemoryRecordStore::default();
        store.set_available(false);
        let err = store.select("reports", &Query::new(), None).await.unwrap_err();
        assert_matches!(err, StoreError::Network(_));
        assert!(err.is_remote_unavailable());
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = InMemoryRecordStore::default();
        store.drop_table("access_requests").await;
        let err = store.select("access_requests", &Query::new(), None).await.unwrap_err();
        assert_matches!(err, StoreError::MissingTable(_));
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_column() {
        let store = InMemoryRecordStore::default();
        store.upsert("patients", json!({ "user_id": "u1", "name": "Ada" }), "user_id", None).await.unwrap();
        store.upsert("patients", json!({ "user_id": "u1", "condition": "asthma" }), "user_id", None).await.unwrap();

        let rows = store.rows("patients").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Ada");
        assert_eq!(rows[0]["condition"], "asthma");
    }

    #[tokio::test]
    async fn test_writes_publish_change_events() {
        let store = InMemoryRecordStore::default();
        let mut sub = store.changes().subscribe(&["reports"]);

        store.insert("reports", json!({ "id": "r1", "user_id": "p1" }), None).await.unwrap();
        store.delete("reports", &Query::new().eq("id", "r1"), None).await.unwrap();

        assert_eq!(sub.try_next().unwrap().kind, ChangeKind::Insert);
        assert_eq!(sub.try_next().unwrap().kind, ChangeKind::Delete);
    }
}
