//! # zeekagent-queries
//!
//! The query subscription tracker behind the agent's query manager.
//!
//! ## Architecture
//!
//! ```text
//! SubscriptionEvent ──► QueryManager ──► EntryRegistry ──► IndexedEntityStore
//!                            │                │
//!                            │                └── IdGenerator
//!                            ├── ScheduleProjector ──► ScheduleSink
//!                            └── QueryArtifacts
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use zeekagent_commons::SubscriptionRequest;
//! use zeekagent_queries::{MemoryScheduleSink, QueryManager};
//! use zeekagent_store::test_utils::InMemoryBackend;
//!
//! let sink = Arc::new(MemoryScheduleSink::new());
//! let manager = QueryManager::open(Arc::new(InMemoryBackend::new()), sink.clone()).unwrap();
//!
//! let request = SubscriptionRequest::new("SELECT * FROM processes", "host_processes", "/zeek/osquery")
//!     .with_cookie("c1");
//! let id = manager.add_schedule_query_entry(&request).unwrap();
//! manager.update_schedule().unwrap();
//!
//! assert_eq!(manager.get_event_cookie(&id).unwrap(), "c1");
//! assert!(sink.last_applied().unwrap().contains("SELECT * FROM processes"));
//! ```

pub mod artifacts;
pub mod error;
pub mod events;
pub mod id_generator;
pub mod indexes;
pub mod manager;
pub mod projector;
pub mod registry;
pub mod scheduler;

pub use artifacts::QueryArtifacts;
pub use error::{QueryError, Result};
pub use events::{EventOutcome, SubscriptionEvent};
pub use id_generator::IdGenerator;
pub use indexes::QueryPartition;
pub use manager::{PurgeOutcome, QueryManager};
pub use projector::{scheduled_ids, ScheduleProjector};
pub use registry::{EntryRegistry, RecoveryStats, Upsert};
pub use scheduler::{MemoryScheduleSink, ScheduleRejection, ScheduleSink};
