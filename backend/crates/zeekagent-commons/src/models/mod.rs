//! Subscription models shared by the store, the query tracker and the agent.

mod query_entry;
mod query_id;
mod query_kind;
mod subscription;

pub use query_entry::{QueryEntry, SubscriptionMetadata};
pub use query_id::QueryId;
pub use query_kind::QueryKind;
pub use subscription::SubscriptionRequest;
