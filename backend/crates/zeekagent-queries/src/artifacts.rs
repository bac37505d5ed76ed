//! Per-query artifacts held on behalf of the execution engine.
//!
//! Artifacts (accumulated differential state, last result sets, ...) are
//! keyed by query text rather than query id, so they outlive a single
//! subscription and can be purged even after the entry itself is gone.
//!
//! Key: `{query}\x00{artifact name}`

use crate::error::{QueryError, Result};
use crate::indexes::QueryPartition;
use parking_lot::Mutex;
use std::sync::Arc;
use zeekagent_commons::storage_key::{composite_key, composite_prefix, split_composite};
use zeekagent_store::{Operation, Partition, StorageBackend, StorageError};

#[derive(Clone)]
pub struct QueryArtifacts {
    backend: Arc<dyn StorageBackend>,
    partition: Partition,
    /// Held by writers so a purge sees every artifact it deletes.
    writes: Arc<Mutex<()>>,
}

impl QueryArtifacts {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let partition = QueryPartition::Artifacts.partition();
        backend.create_partition(&partition)?;
        Ok(Self {
            backend,
            partition,
            writes: Arc::new(Mutex::new(())),
        })
    }

    /// Store (or replace) artifact `name` for `query`.
    pub fn record(&self, query: &str, name: &str, value: &[u8]) -> Result<()> {
        validate_component("query", query)?;
        validate_component("artifact name", name)?;
        let _guard = self.writes.lock();
        self.backend
            .put(&self.partition, &composite_key(query, name), value)?;
        Ok(())
    }

    pub fn get(&self, query: &str, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.backend.get(&self.partition, &composite_key(query, name))?)
    }

    /// Names of every artifact recorded for `query`, ascending.
    pub fn list(&self, query: &str) -> Result<Vec<String>> {
        let prefix = composite_prefix(query);
        let mut names = Vec::new();
        for (key, _) in self.backend.scan(&self.partition, Some(&prefix), None, None)? {
            let (_, name) = split_composite(&key).map_err(StorageError::SerializationError)?;
            names.push(name);
        }
        Ok(names)
    }

    /// Delete every artifact of `query` through `commit`.
    ///
    /// `commit` receives the delete operations and must write them, usually
    /// alongside its own, in a single batch. Recording is blocked until it
    /// returns. Yields `commit`'s value and how many artifacts were deleted.
    pub fn purge_with<T>(
        &self,
        query: &str,
        commit: impl FnOnce(Vec<Operation>) -> Result<T>,
    ) -> Result<(T, usize)> {
        let _guard = self.writes.lock();

        let prefix = composite_prefix(query);
        let ops: Vec<Operation> = self
            .backend
            .scan(&self.partition, Some(&prefix), None, None)?
            .map(|(key, _)| Operation::Delete {
                partition: self.partition.clone(),
                key,
            })
            .collect();

        let count = ops.len();
        let committed = commit(ops)?;
        Ok((committed, count))
    }
}

fn validate_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(QueryError::InvalidArgument(format!("{} must not be empty", what)));
    }
    if value.contains('\0') {
        return Err(QueryError::InvalidArgument(format!(
            "{} must not contain NUL",
            what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeekagent_store::test_utils::InMemoryBackend;

    fn artifacts() -> QueryArtifacts {
        QueryArtifacts::new(Arc::new(InMemoryBackend::new())).unwrap()
    }

    #[test]
    fn test_record_list_get() {
        let artifacts = artifacts();
        artifacts.record("SELECT 1", "previous_results", b"[]").unwrap();
        artifacts.record("SELECT 1", "epoch", b"3").unwrap();
        artifacts.record("SELECT 12", "epoch", b"1").unwrap();

        assert_eq!(
            artifacts.list("SELECT 1").unwrap(),
            vec!["epoch".to_string(), "previous_results".to_string()]
        );
        assert_eq!(artifacts.get("SELECT 1", "epoch").unwrap(), Some(b"3".to_vec()));
        assert_eq!(artifacts.get("SELECT 1", "missing").unwrap(), None);
    }

    fn commit_to(
        backend: &Arc<InMemoryBackend>,
    ) -> impl Fn(Vec<Operation>) -> Result<()> + '_ {
        move |ops| {
            if !ops.is_empty() {
                backend.batch(ops)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_purge_scoped_to_query() {
        let backend = Arc::new(InMemoryBackend::new());
        let artifacts = QueryArtifacts::new(backend.clone()).unwrap();
        artifacts.record("SELECT 1", "a", b"1").unwrap();
        artifacts.record("SELECT 1", "b", b"2").unwrap();
        artifacts.record("SELECT 12", "a", b"3").unwrap();

        assert_eq!(artifacts.purge_with("SELECT 1", commit_to(&backend)).unwrap().1, 2);
        assert_eq!(artifacts.purge_with("SELECT 1", commit_to(&backend)).unwrap().1, 0);
        assert_eq!(artifacts.list("SELECT 12").unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_failed_commit_keeps_artifacts() {
        let artifacts = artifacts();
        artifacts.record("SELECT 1", "a", b"1").unwrap();

        let err = artifacts
            .purge_with("SELECT 1", |ops| -> Result<()> {
                assert_eq!(ops.len(), 1);
                Err(QueryError::Store(StorageError::IoError("disk full".to_string())))
            })
            .unwrap_err();
        assert!(matches!(err, QueryError::Store(_)));
        assert_eq!(artifacts.list("SELECT 1").unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_record_validates_components() {
        let artifacts = artifacts();
        assert!(matches!(
            artifacts.record("", "a", b"1"),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            artifacts.record("SELECT 1", "a\0b", b"1"),
            Err(QueryError::InvalidArgument(_))
        ));
    }
}
