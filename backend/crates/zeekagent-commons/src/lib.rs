//! # zeekagent-commons
//!
//! Shared types used across the zeekagent crates.
//!
//! ## Type-Safe Wrappers
//!
//! - `QueryId`: identifier of a tracked query subscription
//! - `QueryKind`: ONETIME vs SCHEDULE classification
//!
//! ## Subscription Models
//!
//! - `SubscriptionRequest`: what the remote controller asks for
//! - `QueryEntry`: the tracked record the registry owns
//!
//! ## Example Usage
//!
//! ```rust
//! use zeekagent_commons::{QueryId, QueryKind, SubscriptionRequest};
//!
//! let request = SubscriptionRequest::new("SELECT * FROM processes", "host_processes", "/zeek/osquery");
//! assert_eq!(request.interval, 10);
//!
//! let id = QueryId::new("7");
//! assert_eq!(id.as_str(), "7");
//! assert_eq!(QueryKind::Schedule.as_str(), "SCHEDULE");
//! ```

pub mod models;
pub mod storage_key;

pub use models::{QueryEntry, QueryId, QueryKind, SubscriptionMetadata, SubscriptionRequest};
pub use storage_key::StorageKey;
