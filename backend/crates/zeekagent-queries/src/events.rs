//! Inbound subscription events from the remote controller.
//!
//! ```json
//! {"type": "subscribe", "kind": "SCHEDULE", "request": {"query": "...", ...}}
//! {"type": "unsubscribe", "query": "..."}
//! ```

use crate::error::{QueryError, Result};
use crate::manager::QueryManager;
use serde::{Deserialize, Serialize};
use zeekagent_commons::{QueryId, QueryKind, SubscriptionRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    Subscribe {
        request: SubscriptionRequest,
        kind: QueryKind,
    },
    Unsubscribe {
        query: String,
    },
}

impl SubscriptionEvent {
    /// Decode an event. Unknown types or kinds and missing fields are
    /// reported as `InvalidArgument`.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| QueryError::InvalidArgument(format!("malformed subscription event: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Scheduled query tracked and the schedule refreshed
    Scheduled(QueryId),
    /// One-time query tracked; the caller runs it now
    OneTime(QueryId),
    /// Entry removed
    Unsubscribed(QueryId),
}

impl QueryManager {
    /// Apply one inbound event.
    ///
    /// Scheduled subscriptions and removals of scheduled entries refresh the
    /// schedule; a scheduler rejection is returned after the registry change
    /// has been kept.
    pub fn handle_event(&self, event: SubscriptionEvent) -> Result<EventOutcome> {
        match event {
            SubscriptionEvent::Subscribe { request, kind } => {
                let id = match (&request.query_id, kind) {
                    (Some(id), QueryKind::Schedule) => {
                        match self.find_scheduled(&request.query) {
                            Some(existing) if existing == *id => {
                                self.add_schedule_query_entry(&request)?
                            }
                            _ => {
                                self.add_query_entry(id, &request, kind)?;
                                id.clone()
                            }
                        }
                    }
                    (Some(id), QueryKind::OneTime) => {
                        self.add_query_entry(id, &request, kind)?;
                        id.clone()
                    }
                    (None, QueryKind::Schedule) => self.add_schedule_query_entry(&request)?,
                    (None, QueryKind::OneTime) => self.add_one_time_query_entry(&request)?,
                };

                if kind.is_schedule() {
                    self.update_schedule()?;
                    Ok(EventOutcome::Scheduled(id))
                } else {
                    Ok(EventOutcome::OneTime(id))
                }
            }
            SubscriptionEvent::Unsubscribe { query } => {
                let entry = self.remove_query_entry(&query)?;
                if entry.kind.is_schedule() {
                    self.update_schedule()?;
                }
                Ok(EventOutcome::Unsubscribed(entry.query_id))
            }
        }
    }

    fn find_scheduled(&self, query: &str) -> Option<QueryId> {
        let id = self.find_id_for_query(query).ok()?;
        match self.find_query_and_type(&id) {
            Ok((QueryKind::Schedule, _)) => Some(id),
            _ => None,
        }
    }
}
