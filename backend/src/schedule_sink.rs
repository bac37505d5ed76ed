//! Scheduler sink that hands the projected schedule to the local scheduler
//! through a configuration file.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use zeekagent_commons::QueryId;
use zeekagent_queries::{ScheduleRejection, ScheduleSink};

/// Longest interval (seconds) the local scheduler accepts for a job.
pub const MAX_JOB_INTERVAL: u64 = 604_800;

/// Writes each accepted document to `path`, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileScheduleSink {
    path: PathBuf,
}

impl FileScheduleSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, config: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, config)?;
        fs::rename(&tmp, &self.path)
    }
}

/// Jobs the local scheduler would refuse to run.
fn invalid_jobs(doc: &Value) -> Vec<QueryId> {
    let Some(schedule) = doc.get("schedule").and_then(Value::as_object) else {
        return Vec::new();
    };

    schedule
        .iter()
        .filter(|(_, job)| {
            let interval = job.get("interval").and_then(Value::as_u64).unwrap_or(0);
            let query = job.get("query").and_then(Value::as_str).unwrap_or("");
            interval == 0 || interval > MAX_JOB_INTERVAL || query.trim().is_empty()
        })
        .map(|(id, _)| QueryId::new(id.as_str()))
        .collect()
}

impl ScheduleSink for FileScheduleSink {
    fn apply(&self, config: &str) -> Result<(), ScheduleRejection> {
        let doc: Value = serde_json::from_str(config)
            .map_err(|e| ScheduleRejection::new(format!("malformed schedule document: {}", e)))?;

        if doc.get("schedule").map_or(true, |s| !s.is_object()) {
            return Err(ScheduleRejection::new("schedule document has no schedule object"));
        }

        let invalid = invalid_jobs(&doc);
        if !invalid.is_empty() {
            return Err(ScheduleRejection::new("invalid scheduled jobs").with_rejected(invalid));
        }

        self.write_atomic(config).map_err(|e| {
            ScheduleRejection::new(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        log::debug!("Wrote schedule document to {}", self.path.display());
        Ok(())
    }
}
