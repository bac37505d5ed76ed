//! Durable partitions and the query-string index.
//!
//! ## Indexes
//!
//! 1. **QueryStringIndex** - entries by query text
//!    - Key: `{query}\x00{query_id}`
//!    - Value: `query_id`
//!    - Used by: recovery cross-check of the in-memory query-string map

use std::sync::Arc;
use zeekagent_commons::storage_key::composite_key;
use zeekagent_commons::{QueryEntry, QueryId};
use zeekagent_store::{IndexDefinition, Partition};

/// Column families owned by the query tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryPartition {
    /// Entries keyed by query id
    Queries,
    /// Query-string index over `Queries`
    QueriesQueryIdx,
    /// Per-query artifacts keyed by `{query}\x00{name}`
    Artifacts,
    /// Tracker bookkeeping (identifier high-water mark)
    Meta,
}

impl QueryPartition {
    pub const ALL: [QueryPartition; 4] = [
        QueryPartition::Queries,
        QueryPartition::QueriesQueryIdx,
        QueryPartition::Artifacts,
        QueryPartition::Meta,
    ];

    /// Returns the partition (column family) name
    pub fn name(&self) -> &'static str {
        match self {
            QueryPartition::Queries => "zeek_queries",
            QueryPartition::QueriesQueryIdx => "zeek_queries_query_idx",
            QueryPartition::Artifacts => "zeek_query_artifacts",
            QueryPartition::Meta => "zeek_meta",
        }
    }

    pub fn partition(&self) -> Partition {
        Partition::new(self.name())
    }

    /// Names of every partition, for opening the database.
    pub fn all_names() -> Vec<&'static str> {
        Self::ALL.iter().map(QueryPartition::name).collect()
    }
}

/// Meta key holding the identifier high-water mark.
pub const QUERY_ID_SEQ_KEY: &[u8] = b"query_id_seq";

/// Index position for QueryStringIndex in the indexes array
pub const QUERY_STRING_INDEX: usize = 0;

/// Index over the query text of every entry, ONETIME and SCHEDULE alike.
pub struct QueryStringIndex;

impl IndexDefinition<QueryId, QueryEntry> for QueryStringIndex {
    fn partition(&self) -> &str {
        QueryPartition::QueriesQueryIdx.name()
    }

    fn extract_key(&self, primary_key: &QueryId, entry: &QueryEntry) -> Option<Vec<u8>> {
        Some(composite_key(&entry.query, primary_key.as_str()))
    }
}

pub fn create_query_indexes() -> Vec<Arc<dyn IndexDefinition<QueryId, QueryEntry>>> {
    vec![Arc::new(QueryStringIndex)]
}
