// Typed change feed. Every successful write through a `RecordStore`
// publishes one event; subscribers filter by table and apply the event
// incrementally instead of re-reading whole collections.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub row_id: String,
    pub kind: ChangeKind,
    /// Row image after the change; `None` for deletes.
    pub row: Option<Value>,
}

impl ChangeEvent {
    pub fn from_row(table: &str, kind: ChangeKind, row: &Value) -> Option<Self> {
        let row_id = row_id_of(row)?;
        Some(Self {
            table: table.to_string(),
            row_id,
            kind,
            row: match kind {
                ChangeKind::Delete => None,
                _ => Some(row.clone()),
            },
        })
    }
}

pub(crate) fn row_id_of(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Process-wide change notification channel.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        debug!("Change on {} ({:?}): {}", event.table, event.kind, event.row_id);
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn publish_rows(&self, table: &str, kind: ChangeKind, rows: &[Value]) {
        for row in rows {
            if let Some(event) = ChangeEvent::from_row(table, kind, row) {
                self.publish(event);
            }
        }
    }

    /// Subscribes to the given tables. An empty list means every table.
    pub fn subscribe(&self, tables: &[&str]) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            receiver: self.sender.subscribe(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        };
        debug!("Subscription {} opened for {:?}", subscription.id, tables);
        subscription
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct Subscription {
    id: Uuid,
    receiver: broadcast::Receiver<ChangeEvent>,
    tables: HashSet<String>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn wants(&self, event: &ChangeEvent) -> bool {
        self.tables.is_empty() || self.tables.contains(&event.table)
    }

    /// Waits for the next event on a subscribed table. Returns `None` once
    /// the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, {} events skipped", self.id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `next`.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, {} events skipped", self.id, skipped);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        debug!("Subscription {} closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscription_filters_by_table() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(&["access_requests"]);

        feed.publish_rows("reports", ChangeKind::Insert, &[json!({ "id": "r1" })]);
        feed.publish_rows("access_requests", ChangeKind::Update, &[json!({ "id": "a1", "status": "approved" })]);

        let event = sub.next().await.unwrap();
        assert_eq!(event.table, "access_requests");
        assert_eq!(event.row_id, "a1");
        assert_eq!(event.kind, ChangeKind::Update);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_unsubscribe_releases_receiver() {
        let feed = ChangeFeed::default();
        let sub = feed.subscribe(&[]);
        assert_eq!(feed.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_delete_events_carry_no_row() {
        let event = ChangeEvent::from_row("reports", ChangeKind::Delete, &json!({ "id": 7 })).unwrap();
        assert_eq!(event.row_id, "7");
        assert!(event.row.is_none());
    }

    #[test]
    fn test_rows_without_id_are_not_published() {
        assert!(ChangeEvent::from_row("reports", ChangeKind::Insert, &json!({ "title": "x" })).is_none());
    }
}
