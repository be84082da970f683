//! In-process row-change feed.
//!
//! Admin writes publish the table rows they touch; the catalog cache
//! watches the feed and drops product snapshots when a `products` row
//! changes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CAPACITY: usize = 256;

/// Table whose changes invalidate the product snapshot.
pub const PRODUCTS_TABLE: &str = "products";

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row changed in a backend table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    pub kind: ChangeKind,
    /// The row after the change, when known.
    pub record: Option<serde_json::Value>,
}

impl RowChange {
    /// A change to the `products` table.
    #[must_use]
    pub fn product(kind: ChangeKind, record: Option<serde_json::Value>) -> Self {
        Self {
            table: PRODUCTS_TABLE.to_string(),
            kind,
            record,
        }
    }
}

/// Broadcast channel of [`RowChange`] events.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<RowChange>,
}

impl ChangeFeed {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Publish a change. Returns how many subscribers received it.
    pub fn publish(&self, change: RowChange) -> usize {
        debug!(table = %change.table, kind = ?change.kind, "Publishing row change");
        self.tx.send(change).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.publish(RowChange::product(ChangeKind::Delete, None)), 0);
    }

    #[test]
    fn test_subscribers_receive_changes() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        feed.publish(RowChange::product(
            ChangeKind::Update,
            Some(serde_json::json!({"id": "w1"})),
        ));

        let change = rx.try_recv().unwrap();
        assert_eq!(change.table, PRODUCTS_TABLE);
        assert_eq!(change.kind, ChangeKind::Update);
    }
}
