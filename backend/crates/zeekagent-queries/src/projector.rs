//! Schedule projection.
//!
//! Turns the current SCHEDULE entries into the osquery configuration the
//! local scheduler consumes:
//!
//! ```json
//! {"schedule": {"<query_id>": {"query": "...", "interval": 10,
//!   "added": true, "removed": false, "snapshot": false}}}
//! ```
//!
//! Jobs are keyed by query id so results can be correlated back to the
//! subscription. Output is independent of input order.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use zeekagent_commons::{QueryEntry, QueryId};

#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduleProjector;

impl ScheduleProjector {
    pub fn new() -> Self {
        Self
    }

    /// Project `entries`, skipping ONETIME entries and anything in `excluded`.
    pub fn project<'a, I>(&self, entries: I, excluded: &HashSet<QueryId>) -> Value
    where
        I: IntoIterator<Item = &'a QueryEntry>,
    {
        let jobs: BTreeMap<&str, Value> = entries
            .into_iter()
            .filter(|e| e.kind.is_schedule() && !excluded.contains(&e.query_id))
            .map(|e| {
                (
                    e.query_id.as_str(),
                    json!({
                        "query": e.query,
                        "interval": e.interval,
                        "added": e.added,
                        "removed": e.removed,
                        "snapshot": e.snapshot,
                    }),
                )
            })
            .collect();

        let schedule: Map<String, Value> = jobs
            .into_iter()
            .map(|(id, job)| (id.to_string(), job))
            .collect();
        json!({ "schedule": schedule })
    }

    /// Serialized form of [`ScheduleProjector::project`].
    pub fn render<'a, I>(&self, entries: I, excluded: &HashSet<QueryId>) -> String
    where
        I: IntoIterator<Item = &'a QueryEntry>,
    {
        self.project(entries, excluded).to_string()
    }
}

/// Job keys of a rendered schedule document, in document order.
pub fn scheduled_ids(config: &str) -> Vec<QueryId> {
    serde_json::from_str::<Value>(config)
        .ok()
        .and_then(|doc| {
            doc.get("schedule")
                .and_then(Value::as_object)
                .map(|jobs| jobs.keys().map(|k| QueryId::new(k.as_str())).collect())
        })
        .unwrap_or_default()
}
