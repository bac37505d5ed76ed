//! Seam to the local scheduler that consumes projected configurations.

use parking_lot::Mutex;
use std::fmt;
use zeekagent_commons::QueryId;

/// Why a scheduler refused a configuration.
///
/// `rejected` names the job keys (query ids) at fault, when the scheduler
/// can tell. An empty list means the document as a whole was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRejection {
    pub reason: String,
    pub rejected: Vec<QueryId>,
}

impl ScheduleRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            rejected: Vec::new(),
        }
    }

    pub fn with_rejected(mut self, ids: impl IntoIterator<Item = QueryId>) -> Self {
        self.rejected.extend(ids);
        self
    }
}

impl fmt::Display for ScheduleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rejected.is_empty() {
            return write!(f, "{}", self.reason);
        }
        let ids: Vec<&str> = self.rejected.iter().map(QueryId::as_str).collect();
        write!(f, "{} (jobs: {})", self.reason, ids.join(", "))
    }
}

/// Receives the projected schedule document.
pub trait ScheduleSink: Send + Sync {
    fn apply(&self, config: &str) -> Result<(), ScheduleRejection>;
}

/// Sink that keeps accepted documents in memory.
#[derive(Debug, Default)]
pub struct MemoryScheduleSink {
    applied: Mutex<Vec<String>>,
    reject: Mutex<Option<ScheduleRejection>>,
}

impl MemoryScheduleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every document with `rejection` until cleared with `None`.
    pub fn set_rejection(&self, rejection: Option<ScheduleRejection>) {
        *self.reject.lock() = rejection;
    }

    pub fn last_applied(&self) -> Option<String> {
        self.applied.lock().last().cloned()
    }

    pub fn applied_count(&self) -> usize {
        self.applied.lock().len()
    }
}

impl ScheduleSink for MemoryScheduleSink {
    fn apply(&self, config: &str) -> Result<(), ScheduleRejection> {
        if let Some(rejection) = self.reject.lock().clone() {
            return Err(rejection);
        }
        self.applied.lock().push(config.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_and_rejects() {
        let sink = MemoryScheduleSink::new();
        sink.apply(r#"{"schedule":{}}"#).unwrap();
        assert_eq!(sink.applied_count(), 1);

        sink.set_rejection(Some(ScheduleRejection::new("bad query")));
        assert!(sink.apply("{}").is_err());
        assert_eq!(sink.applied_count(), 1);
        assert_eq!(sink.last_applied().as_deref(), Some(r#"{"schedule":{}}"#));

        sink.set_rejection(None);
        sink.apply("{}").unwrap();
        assert_eq!(sink.applied_count(), 2);
    }

    #[test]
    fn test_rejection_display() {
        let rejection =
            ScheduleRejection::new("syntax error").with_rejected([QueryId::new("3"), QueryId::new("7")]);
        assert_eq!(rejection.to_string(), "syntax error (jobs: 3, 7)");
        assert_eq!(ScheduleRejection::new("down").to_string(), "down");
    }
}
