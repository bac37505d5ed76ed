//! Subscription request received from the remote controller.
//!
//! A request names the query to run, where its results are published
//! (response event name + topic), and an opaque cookie that is echoed back
//! with every result so the controller can correlate them.
//!
//! The recurrence fields (`interval`, `added`, `removed`, `snapshot`) only
//! matter for SCHEDULE subscriptions and are carried into the projected
//! schedule unchanged.

use serde::{Deserialize, Serialize};

use crate::QueryId;

fn default_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Subscription request, immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Query text
    pub query: String,

    /// Name of the event results are published as
    pub response_event: String,

    /// Topic results are published on
    pub response_topic: String,

    /// Correlation token echoed back with results
    #[serde(default)]
    pub cookie: String,

    /// Seconds between executions (SCHEDULE only)
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Report rows added since the previous run
    #[serde(default = "default_true")]
    pub added: bool,

    /// Report rows removed since the previous run
    #[serde(default)]
    pub removed: bool,

    /// Report full snapshots instead of differentials
    #[serde(default)]
    pub snapshot: bool,

    /// Identifier requested by the controller, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<QueryId>,
}

impl SubscriptionRequest {
    /// Create a request with default recurrence settings and an empty cookie.
    pub fn new(
        query: impl Into<String>,
        response_event: impl Into<String>,
        response_topic: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            response_event: response_event.into(),
            response_topic: response_topic.into(),
            cookie: String::new(),
            interval: default_interval(),
            added: true,
            removed: false,
            snapshot: false,
            query_id: None,
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_query_id(mut self, query_id: impl Into<QueryId>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }
}
