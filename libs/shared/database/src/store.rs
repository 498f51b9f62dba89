use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::realtime::{ChangeFeed, ChangeKind};
use crate::supabase::SupabaseClient;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store unreachable: {0}")]
    Network(String),

    #[error("Table missing: {0}")]
    MissingTable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Record store error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Network, schema and policy failures: the cases callers recover from
    /// locally instead of surfacing to the user.
    pub fn is_remote_unavailable(&self) -> bool {
        match self {
            StoreError::Network(_)
            | StoreError::MissingTable(_)
            | StoreError::PermissionDenied(_) => true,
            StoreError::Api { status, .. } => *status >= 500,
            StoreError::Request(_) | StoreError::Serialization(_) => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    Asc(String),
    Desc(String),
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Order::Asc(column.to_string())
    }

    pub fn desc(column: &str) -> Self {
        Order::Desc(column.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Order::Asc(c) | Order::Desc(c) => c,
        }
    }

    fn to_param(&self) -> String {
        match self {
            Order::Asc(c) => format!("{}.asc", c),
            Order::Desc(c) => format!("{}.desc", c),
        }
    }
}

/// Equality-filtered, optionally ordered table query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    filters: Vec<(String, String)>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), value.to_string()));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// PostgREST query string, without the leading `?`.
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = self
            .filters
            .iter()
            .map(|(column, value)| format!("{}=eq.{}", column, urlencoding::encode(value)))
            .collect();
        if let Some(order) = &self.order {
            parts.push(format!("order={}", order.to_param()));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        parts.join("&")
    }
}

/// Table-scoped CRUD against the hosted relational store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>>;

    async fn insert(
        &self,
        table: &str,
        row: Value,
        auth_token: Option<&str>,
    ) -> StoreResult<Value>;

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
        auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>>;

    async fn delete(
        &self,
        table: &str,
        query: &Query,
        auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>>;

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
        auth_token: Option<&str>,
    ) -> StoreResult<Value>;

    fn changes(&self) -> &ChangeFeed;
}

pub struct SupabaseRecordStore {
    supabase: Arc<SupabaseClient>,
    feed: ChangeFeed,
}

impl SupabaseRecordStore {
    pub fn new(supabase: Arc<SupabaseClient>, feed: ChangeFeed) -> Self {
        Self { supabase, feed }
    }

    fn path(table: &str, query: Option<&Query>) -> String {
        match query.map(Query::to_query_string).filter(|q| !q.is_empty()) {
            Some(qs) => format!("/rest/v1/{}?{}", table, qs),
            None => format!("/rest/v1/{}", table),
        }
    }

    fn prefer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static(value));
        headers
    }

    fn first_row(table: &str, rows: Vec<Value>) -> StoreResult<Value> {
        rows.into_iter().next().ok_or_else(|| StoreError::Api {
            status: 200,
            message: format!("{} write returned no representation", table),
        })
    }
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        let path = Self::path(table, Some(query));
        self.supabase.request(Method::GET, &path, auth_token, None).await
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        auth_token: Option<&str>,
    ) -> StoreResult<Value> {
        let path = Self::path(table, None);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            &path,
            auth_token,
            Some(row),
            Some(Self::prefer("return=representation")),
        ).await?;

        self.feed.publish_rows(table, ChangeKind::Insert, &rows);
        Self::first_row(table, rows)
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
        auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        let path = Self::path(table, Some(query));
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            auth_token,
            Some(patch),
            Some(Self::prefer("return=representation")),
        ).await?;

        debug!("Updated {} row(s) in {}", rows.len(), table);
        self.feed.publish_rows(table, ChangeKind::Update, &rows);
        Ok(rows)
    }

    async fn delete(
        &self,
        table: &str,
        query: &Query,
        auth_token: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        let path = Self::path(table, Some(query));
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            auth_token,
            None,
            Some(Self::prefer("return=representation")),
        ).await?;

        debug!("Deleted {} row(s) from {}", rows.len(), table);
        self.feed.publish_rows(table, ChangeKind::Delete, &rows);
        Ok(rows)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
        auth_token: Option<&str>,
    ) -> StoreResult<Value> {
        let path = format!("/rest/v1/{}?on_conflict={}", table, urlencoding::encode(on_conflict));
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            &path,
            auth_token,
            Some(row),
            Some(Self::prefer("resolution=merge-duplicates,return=representation")),
        ).await?;

        self.feed.publish_rows(table, ChangeKind::Update, &rows);
        Self::first_row(table, rows)
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}
