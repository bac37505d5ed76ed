//! Tracked query record.

use serde::{Deserialize, Serialize};

use crate::{QueryId, QueryKind, SubscriptionRequest};

/// Where results of a query go and how they are correlated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMetadata {
    pub event_name: String,
    pub event_topic: String,
    pub cookie: String,
}

/// A query tracked by the registry.
///
/// # Fields
///
/// - `query_id`: unique within the registry's lifetime
/// - `query`: query text; unique among SCHEDULE entries
/// - `kind`: ONETIME or SCHEDULE
/// - `metadata`: response event name, topic and cookie
/// - `interval`, `added`, `removed`, `snapshot`: recurrence descriptor
/// - `created_at` / `updated_at`: Unix epoch milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub query_id: QueryId,
    pub query: String,
    pub kind: QueryKind,
    pub metadata: SubscriptionMetadata,
    pub interval: u64,
    pub added: bool,
    pub removed: bool,
    pub snapshot: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QueryEntry {
    /// Build an entry from an accepted request.
    pub fn from_request(query_id: QueryId, request: &SubscriptionRequest, kind: QueryKind) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            query_id,
            query: request.query.clone(),
            kind,
            metadata: SubscriptionMetadata {
                event_name: request.response_event.clone(),
                event_topic: request.response_topic.clone(),
                cookie: request.cookie.clone(),
            },
            interval: request.interval,
            added: request.added,
            removed: request.removed,
            snapshot: request.snapshot,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this entry with metadata and recurrence taken from `request`.
    ///
    /// Identity (`query_id`, `query`, `kind`, `created_at`) is preserved.
    pub fn resubscribed(&self, request: &SubscriptionRequest) -> Self {
        let mut entry = self.clone();
        entry.metadata = SubscriptionMetadata {
            event_name: request.response_event.clone(),
            event_topic: request.response_topic.clone(),
            cookie: request.cookie.clone(),
        };
        entry.interval = request.interval;
        entry.added = request.added;
        entry.removed = request.removed;
        entry.snapshot = request.snapshot;
        entry.updated_at = chrono::Utc::now().timestamp_millis().max(self.updated_at);
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_request_copies_metadata() {
        let req = SubscriptionRequest::new("SELECT 1", "ev", "/topic").with_cookie("c1");
        let entry = QueryEntry::from_request(QueryId::new("1"), &req, QueryKind::Schedule);
        assert_eq!(entry.metadata.event_name, "ev");
        assert_eq!(entry.metadata.event_topic, "/topic");
        assert_eq!(entry.metadata.cookie, "c1");
        assert_eq!(entry.interval, 10);
        assert!(entry.created_at > 0);
    }

    #[test]
    fn test_resubscribed_preserves_identity() {
        let req = SubscriptionRequest::new("SELECT 1", "ev", "/topic").with_cookie("c1");
        let entry = QueryEntry::from_request(QueryId::new("1"), &req, QueryKind::Schedule);

        let again = SubscriptionRequest::new("SELECT 1", "ev2", "/topic2")
            .with_cookie("c2")
            .with_interval(60);
        let updated = entry.resubscribed(&again);

        assert_eq!(updated.query_id, entry.query_id);
        assert_eq!(updated.created_at, entry.created_at);
        assert_eq!(updated.metadata.cookie, "c2");
        assert_eq!(updated.metadata.event_name, "ev2");
        assert_eq!(updated.interval, 60);
        assert!(updated.updated_at >= entry.updated_at);
    }
}
