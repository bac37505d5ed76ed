//! Entry registry: the canonical `query_id → QueryEntry` mapping and the
//! secondary `query string → query_id` index.
//!
//! Both in-memory maps live behind one `RwLock`. Every mutation builds a
//! single storage batch (entity, index keys and the identifier high-water
//! mark), writes it, and only then touches the maps, all while holding the
//! write lock. A failed write leaves both the maps and the store unchanged.

use crate::error::{QueryError, Result};
use crate::id_generator::{IdGenerator, MAX_SEQUENCE};
use crate::indexes::{create_query_indexes, QueryPartition, QUERY_ID_SEQ_KEY, QUERY_STRING_INDEX};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use zeekagent_commons::storage_key::composite_key;
use zeekagent_commons::{QueryEntry, QueryId, QueryKind, SubscriptionRequest};
use zeekagent_store::{EntityStore, IndexedEntityStore, Operation, StorageBackend, StorageError};

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<QueryId, QueryEntry>,
    /// Ids per query string, oldest first.
    by_query: HashMap<String, Vec<QueryId>>,
}

impl RegistryState {
    /// The entry a query string resolves to: its SCHEDULE entry if any,
    /// otherwise the oldest ONETIME entry.
    fn resolve(&self, query: &str) -> Option<&QueryEntry> {
        let ids = self.by_query.get(query)?;
        let mut entries = ids.iter().filter_map(|id| self.entries.get(id));
        let first = entries.next()?;
        if first.kind.is_schedule() {
            return Some(first);
        }
        entries.find(|e| e.kind.is_schedule()).or(Some(first))
    }

    fn schedule_entry(&self, query: &str) -> Option<&QueryEntry> {
        self.by_query
            .get(query)?
            .iter()
            .filter_map(|id| self.entries.get(id))
            .find(|e| e.kind.is_schedule())
    }

    fn add(&mut self, entry: QueryEntry) {
        self.by_query
            .entry(entry.query.clone())
            .or_default()
            .push(entry.query_id.clone());
        self.entries.insert(entry.query_id.clone(), entry);
    }

    fn remove(&mut self, id: &QueryId) -> Option<QueryEntry> {
        let entry = self.entries.remove(id)?;
        if let Some(ids) = self.by_query.get_mut(&entry.query) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.by_query.remove(&entry.query);
            }
        }
        Some(entry)
    }
}

/// Outcome of [`EntryRegistry::recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryStats {
    pub entries: usize,
    pub repaired_index_keys: usize,
    pub dropped_duplicates: usize,
    pub high_water: u64,
}

/// Result of [`EntryRegistry::upsert_schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Created(QueryId),
    Updated(QueryId),
}

impl Upsert {
    pub fn query_id(&self) -> &QueryId {
        match self {
            Upsert::Created(id) | Upsert::Updated(id) => id,
        }
    }
}

pub struct EntryRegistry {
    store: IndexedEntityStore<QueryId, QueryEntry>,
    backend: Arc<dyn StorageBackend>,
    ids: IdGenerator,
    state: RwLock<RegistryState>,
}

impl EntryRegistry {
    /// Creates an empty registry over `backend`, creating partitions when
    /// missing. Call [`EntryRegistry::recover`] to load durable state.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        backend.create_partition(&QueryPartition::Meta.partition())?;
        let store = IndexedEntityStore::new(
            Arc::clone(&backend),
            QueryPartition::Queries.name(),
            create_query_indexes(),
        )?;

        Ok(Self {
            store,
            backend,
            ids: IdGenerator::new(),
            state: RwLock::new(RegistryState::default()),
        })
    }

    /// Rebuild the in-memory maps from the durable mirror.
    ///
    /// Index keys without an entry are deleted, missing ones are re-added,
    /// and the identifier generator resumes above everything ever issued.
    pub fn recover(&self) -> Result<RecoveryStats> {
        let mut state = self.state.write();

        let mut stored = self.store.scan_all()?;
        stored.sort_by(|(a_id, a), (b_id, b)| {
            (a.created_at, a_id.sequence(), a_id).cmp(&(b.created_at, b_id.sequence(), b_id))
        });

        let mut stats = RecoveryStats::default();
        let mut repairs = Vec::new();
        let mut fresh = RegistryState::default();

        for (id, mut entry) in stored {
            if entry.query_id != id {
                log::warn!(
                    "Entry stored under '{}' claims id '{}'; keeping the storage key",
                    id,
                    entry.query_id
                );
                entry.query_id = id.clone();
            }
            self.ids.observe(&id);

            if entry.kind.is_schedule() {
                if let Some(existing) = fresh.schedule_entry(&entry.query) {
                    log::warn!(
                        "Dropping duplicate scheduled entry {} for query already scheduled as {}",
                        id,
                        existing.query_id
                    );
                    repairs.extend(self.store.delete_ops(&id, &entry));
                    stats.dropped_duplicates += 1;
                    continue;
                }
            }

            fresh.add(entry);
        }

        let expected: HashSet<Vec<u8>> = fresh
            .entries
            .values()
            .map(|e| composite_key(&e.query, e.query_id.as_str()))
            .collect();
        let present: HashSet<Vec<u8>> = self
            .store
            .scan_index_raw(QUERY_STRING_INDEX, None, None, None)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();

        let index_partition = QueryPartition::QueriesQueryIdx.partition();
        for stale in present.difference(&expected) {
            repairs.push(Operation::Delete {
                partition: index_partition.clone(),
                key: stale.clone(),
            });
            stats.repaired_index_keys += 1;
        }
        for entry in fresh.entries.values() {
            let key = composite_key(&entry.query, entry.query_id.as_str());
            if !present.contains(&key) {
                repairs.push(Operation::Put {
                    partition: index_partition.clone(),
                    key,
                    value: entry.query_id.as_bytes().to_vec(),
                });
                stats.repaired_index_keys += 1;
            }
        }

        self.ids.resume(self.read_high_water()?);

        if !repairs.is_empty() {
            self.backend.batch(repairs)?;
        }

        stats.entries = fresh.entries.len();
        stats.high_water = self.ids.high_water();
        *state = fresh;

        log::info!(
            "Recovered {} query entries (high water {}, {} index keys repaired, {} duplicates dropped)",
            stats.entries,
            stats.high_water,
            stats.repaired_index_keys,
            stats.dropped_duplicates
        );
        Ok(stats)
    }

    fn read_high_water(&self) -> Result<u64> {
        let raw = self
            .backend
            .get(&QueryPartition::Meta.partition(), QUERY_ID_SEQ_KEY)?;
        let Some(raw) = raw else {
            return Ok(0);
        };
        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                QueryError::Store(StorageError::SerializationError(format!(
                    "corrupt identifier high-water mark: {:?}",
                    String::from_utf8_lossy(&raw)
                )))
            })
    }

    fn high_water_op(&self) -> Operation {
        Operation::Put {
            partition: QueryPartition::Meta.partition(),
            key: QUERY_ID_SEQ_KEY.to_vec(),
            value: self.ids.high_water().to_string().into_bytes(),
        }
    }

    fn mint(&self) -> Result<QueryId> {
        self.ids
            .next()
            .ok_or(QueryError::IdSpaceExhausted(MAX_SEQUENCE))
    }

    /// Insert an entry for `request` under a freshly issued identifier.
    ///
    /// The identifier is issued under the write lock, after every id already
    /// present has been observed, so it never collides with a tracked entry.
    pub fn insert_new(&self, request: &SubscriptionRequest, kind: QueryKind) -> Result<QueryId> {
        let mut state = self.state.write();

        if kind.is_schedule() {
            if let Some(existing) = state.schedule_entry(&request.query) {
                return Err(QueryError::DuplicateScheduleQuery {
                    query: request.query.clone(),
                    existing: existing.query_id.clone(),
                });
            }
        }

        let entry = QueryEntry::from_request(self.mint()?, request, kind);
        let mut ops = self.store.insert_ops(&entry.query_id, &entry)?;
        ops.push(self.high_water_op());
        self.backend.batch(ops)?;

        let id = entry.query_id.clone();
        log::debug!("Tracked {} query {} for '{}'", kind, id, entry.query);
        state.add(entry);
        Ok(id)
    }

    /// Insert a new entry.
    ///
    /// Fails with `DuplicateId` when the id is taken and with
    /// `DuplicateScheduleQuery` when a SCHEDULE entry already owns the
    /// query string.
    pub fn insert(&self, entry: QueryEntry) -> Result<()> {
        let mut state = self.state.write();

        if state.entries.contains_key(&entry.query_id) {
            return Err(QueryError::DuplicateId(entry.query_id));
        }
        if entry.kind.is_schedule() {
            if let Some(existing) = state.schedule_entry(&entry.query) {
                return Err(QueryError::DuplicateScheduleQuery {
                    query: entry.query,
                    existing: existing.query_id.clone(),
                });
            }
        }

        self.ids.observe(&entry.query_id);
        let mut ops = self.store.insert_ops(&entry.query_id, &entry)?;
        ops.push(self.high_water_op());
        self.backend.batch(ops)?;

        log::debug!(
            "Tracked {} query {} for '{}'",
            entry.kind,
            entry.query_id,
            entry.query
        );
        state.add(entry);
        Ok(())
    }

    /// Insert a SCHEDULE entry for `request`, or overwrite the metadata of
    /// the one already scheduled for the same query string.
    pub fn upsert_schedule(&self, request: &SubscriptionRequest) -> Result<Upsert> {
        let mut state = self.state.write();

        if let Some(existing) = state.schedule_entry(&request.query) {
            let updated = existing.resubscribed(request);
            let ops = self
                .store
                .update_ops(&updated.query_id, Some(existing), &updated)?;
            self.backend.batch(ops)?;

            let id = updated.query_id.clone();
            state.entries.insert(id.clone(), updated);
            return Ok(Upsert::Updated(id));
        }

        let entry = QueryEntry::from_request(self.mint()?, request, QueryKind::Schedule);
        let mut ops = self.store.insert_ops(&entry.query_id, &entry)?;
        ops.push(self.high_water_op());
        self.backend.batch(ops)?;

        let id = entry.query_id.clone();
        state.add(entry);
        Ok(Upsert::Created(id))
    }

    pub fn find_by_query_string(&self, query: &str) -> Result<QueryId> {
        self.state
            .read()
            .resolve(query)
            .map(|e| e.query_id.clone())
            .ok_or_else(|| QueryError::NotFound(format!("query '{}'", query)))
    }

    pub fn find_by_id(&self, id: &QueryId) -> Result<(String, QueryKind)> {
        self.get(id).map(|e| (e.query, e.kind))
    }

    /// Copy of the entry tracked under `id`.
    pub fn get(&self, id: &QueryId) -> Result<QueryEntry> {
        self.state
            .read()
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| QueryError::NotFound(format!("query id {}", id)))
    }

    /// Remove the entry `query` resolves to.
    pub fn remove(&self, query: &str) -> Result<QueryEntry> {
        let mut state = self.state.write();

        let entry = state
            .resolve(query)
            .ok_or_else(|| QueryError::NotFound(format!("query '{}'", query)))?;
        self.backend
            .batch(self.store.delete_ops(&entry.query_id, entry))?;

        let id = entry.query_id.clone();
        state
            .remove(&id)
            .ok_or_else(|| QueryError::NotFound(format!("query id {}", id)))
    }

    /// Remove every entry tracked for `query`, whatever its kind.
    ///
    /// `extra` is written in the same batch as the entry deletions, so either
    /// all of it lands or none of it does. Returns the removed entries; empty
    /// when nothing matched.
    pub fn remove_query_with(
        &self,
        query: &str,
        extra: Vec<Operation>,
    ) -> Result<Vec<QueryEntry>> {
        let mut state = self.state.write();

        let ids = state.by_query.get(query).cloned().unwrap_or_default();
        let mut ops = extra;
        ops.reserve(ids.len() * 2);
        for id in &ids {
            if let Some(entry) = state.entries.get(id) {
                ops.extend(self.store.delete_ops(id, entry));
            }
        }
        if !ops.is_empty() {
            self.backend.batch(ops)?;
        }

        Ok(ids.iter().filter_map(|id| state.remove(id)).collect())
    }

    /// Drop every entry. The identifier high-water mark is kept.
    pub fn remove_all(&self) -> Result<usize> {
        let mut state = self.state.write();

        let mut ops = Vec::with_capacity(state.entries.len() * 2);
        for (id, entry) in &state.entries {
            ops.extend(self.store.delete_ops(id, entry));
        }
        if !ops.is_empty() {
            self.backend.batch(ops)?;
        }

        let removed = state.entries.len();
        *state = RegistryState::default();
        Ok(removed)
    }

    /// Snapshot of all tracked ids in ascending order.
    pub fn list_ids(&self) -> Vec<QueryId> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Snapshot of every SCHEDULE entry in ascending id order.
    pub fn schedule_entries(&self) -> Vec<QueryEntry> {
        self.state
            .read()
            .entries
            .values()
            .filter(|e| e.kind.is_schedule())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeekagent_store::test_utils::InMemoryBackend;

    fn registry() -> (Arc<InMemoryBackend>, EntryRegistry) {
        let backend = Arc::new(InMemoryBackend::new());
        let registry = EntryRegistry::new(backend.clone()).unwrap();
        (backend, registry)
    }

    fn entry(id: &str, query: &str, kind: QueryKind) -> QueryEntry {
        QueryEntry::from_request(QueryId::new(id), &request(query), kind)
    }

    fn request(query: &str) -> SubscriptionRequest {
        SubscriptionRequest::new(query, "ev", "/topic")
    }

    #[test]
    fn test_insert_and_lookup_both_ways() {
        let (_, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::OneTime)).unwrap();

        assert_eq!(registry.find_by_query_string("SELECT 1").unwrap(), QueryId::new("1"));
        assert_eq!(
            registry.find_by_id(&QueryId::new("1")).unwrap(),
            ("SELECT 1".to_string(), QueryKind::OneTime)
        );
        assert!(registry.find_by_query_string("SELECT 2").unwrap_err().is_not_found());
        assert!(registry.find_by_id(&QueryId::new("2")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (_, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::OneTime)).unwrap();

        let err = registry
            .insert(entry("1", "SELECT 2", QueryKind::OneTime))
            .unwrap_err();
        assert_eq!(err, QueryError::DuplicateId(QueryId::new("1")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_schedule_query_rejected() {
        let (_, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::Schedule)).unwrap();

        let err = registry
            .insert(entry("2", "SELECT 1", QueryKind::Schedule))
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::DuplicateScheduleQuery {
                query: "SELECT 1".to_string(),
                existing: QueryId::new("1"),
            }
        );

        // The same text may still be tracked as a one-time query
        registry.insert(entry("3", "SELECT 1", QueryKind::OneTime)).unwrap();
    }

    #[test]
    fn test_resolve_prefers_schedule_then_oldest() {
        let (_, registry) = registry();
        registry.insert(entry("5", "SELECT 1", QueryKind::OneTime)).unwrap();
        registry.insert(entry("3", "SELECT 1", QueryKind::OneTime)).unwrap();
        assert_eq!(registry.find_by_query_string("SELECT 1").unwrap(), QueryId::new("5"));

        registry.insert(entry("9", "SELECT 1", QueryKind::Schedule)).unwrap();
        assert_eq!(registry.find_by_query_string("SELECT 1").unwrap(), QueryId::new("9"));

        assert_eq!(registry.remove("SELECT 1").unwrap().query_id, QueryId::new("9"));
        assert_eq!(registry.remove("SELECT 1").unwrap().query_id, QueryId::new("5"));
        assert_eq!(registry.remove("SELECT 1").unwrap().query_id, QueryId::new("3"));
        assert!(registry.remove("SELECT 1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_query_takes_every_kind() {
        let (_, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::OneTime)).unwrap();
        registry.insert(entry("2", "SELECT 1", QueryKind::Schedule)).unwrap();
        registry.insert(entry("3", "SELECT 2", QueryKind::OneTime)).unwrap();

        let removed: Vec<_> = registry
            .remove_query_with("SELECT 1", Vec::new())
            .unwrap()
            .into_iter()
            .map(|e| e.query_id)
            .collect();
        assert_eq!(removed, vec![QueryId::new("1"), QueryId::new("2")]);
        assert!(registry.find_by_query_string("SELECT 1").is_err());
        assert_eq!(registry.list_ids(), vec![QueryId::new("3")]);
        assert!(registry
            .remove_query_with("SELECT 1", Vec::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_remove_query_with_commits_extra_ops_atomically() {
        let (backend, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::Schedule)).unwrap();
        let meta = QueryPartition::Meta.partition();
        let marker = || Operation::Put {
            partition: QueryPartition::Meta.partition(),
            key: b"marker".to_vec(),
            value: b"1".to_vec(),
        };

        // A bad extra op sinks the entry deletions with it
        let bad = Operation::Delete {
            partition: zeekagent_store::Partition::new("missing"),
            key: b"x".to_vec(),
        };
        assert!(matches!(
            registry.remove_query_with("SELECT 1", vec![marker(), bad]),
            Err(QueryError::Store(_))
        ));
        assert_eq!(registry.list_ids(), vec![QueryId::new("1")]);
        assert_eq!(backend.get(&meta, b"marker").unwrap(), None);

        backend.set_fail_writes(true);
        assert!(registry.remove_query_with("SELECT 1", vec![marker()]).is_err());
        backend.set_fail_writes(false);
        assert_eq!(registry.find_by_query_string("SELECT 1").unwrap(), QueryId::new("1"));

        let removed = registry.remove_query_with("SELECT 1", vec![marker()]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(backend.get(&meta, b"marker").unwrap(), Some(b"1".to_vec()));

        // Extra ops are written even when no entry matched
        let extra = vec![Operation::Delete {
            partition: QueryPartition::Meta.partition(),
            key: b"marker".to_vec(),
        }];
        assert!(registry.remove_query_with("SELECT 1", extra).unwrap().is_empty());
        assert_eq!(backend.get(&meta, b"marker").unwrap(), None);
    }

    #[test]
    fn test_insert_new_skips_caller_numeric_ids() {
        let (_, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::OneTime)).unwrap();
        registry.insert(entry("7", "SELECT 2", QueryKind::OneTime)).unwrap();

        let id = registry.insert_new(&request("SELECT 3"), QueryKind::OneTime).unwrap();
        assert_eq!(id, QueryId::new("8"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_insert_new_refuses_second_schedule() {
        let (_, registry) = registry();
        let id = registry.insert_new(&request("SELECT 1"), QueryKind::Schedule).unwrap();

        assert_eq!(
            registry
                .insert_new(&request("SELECT 1"), QueryKind::Schedule)
                .unwrap_err(),
            QueryError::DuplicateScheduleQuery {
                query: "SELECT 1".to_string(),
                existing: id,
            }
        );
        registry.insert_new(&request("SELECT 1"), QueryKind::OneTime).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_exhausted_id_space_is_an_error() {
        let (_, registry) = registry();
        registry.ids.resume(MAX_SEQUENCE);

        assert_eq!(
            registry
                .insert_new(&request("SELECT 1"), QueryKind::OneTime)
                .unwrap_err(),
            QueryError::IdSpaceExhausted(MAX_SEQUENCE)
        );
        assert_eq!(
            registry.upsert_schedule(&request("SELECT 1")).unwrap_err(),
            QueryError::IdSpaceExhausted(MAX_SEQUENCE)
        );
        assert!(registry.is_empty());

        // Caller-chosen ids still work
        registry.insert(entry("remote-1", "SELECT 1", QueryKind::OneTime)).unwrap();
    }

    #[test]
    fn test_concurrent_insert_new_and_caller_ids_never_collide() {
        let (_, registry) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        if t % 2 == 0 {
                            registry
                                .insert_new(&request(&format!("SELECT {} {}", t, i)), QueryKind::OneTime)
                                .unwrap();
                        } else {
                            // Caller ids land just ahead of the generator
                            let id = (registry.ids.high_water() + 1).to_string();
                            match registry.insert(entry(&id, "SELECT caller", QueryKind::OneTime)) {
                                Ok(()) | Err(QueryError::DuplicateId(_)) => {}
                                Err(e) => panic!("unexpected error: {}", e),
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let minted = registry
            .list_ids()
            .into_iter()
            .filter(|id| registry.get(id).unwrap().query != "SELECT caller")
            .count();
        assert_eq!(minted, 400);
    }

    #[test]
    fn test_upsert_schedule_preserves_id() {
        let (_, registry) = registry();
        let first = SubscriptionRequest::new("SELECT 1", "ev", "/topic").with_cookie("c1");
        let created = registry.upsert_schedule(&first).unwrap();
        assert!(matches!(created, Upsert::Created(_)));

        let again = SubscriptionRequest::new("SELECT 1", "ev2", "/topic2").with_cookie("c2");
        let updated = registry.upsert_schedule(&again).unwrap();
        assert_eq!(updated, Upsert::Updated(created.query_id().clone()));

        let stored = registry.get(created.query_id()).unwrap();
        assert_eq!(stored.metadata.cookie, "c2");
        assert_eq!(stored.metadata.event_name, "ev2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let (backend, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::Schedule)).unwrap();

        backend.set_fail_writes(true);
        let err = registry
            .insert(entry("2", "SELECT 2", QueryKind::OneTime))
            .unwrap_err();
        assert!(matches!(err, QueryError::Store(_)));
        assert!(registry.remove("SELECT 1").is_err());
        assert!(registry.remove_all().is_err());
        backend.set_fail_writes(false);

        assert_eq!(registry.list_ids(), vec![QueryId::new("1")]);
        assert!(registry.find_by_query_string("SELECT 2").is_err());
    }

    #[test]
    fn test_remove_all_keeps_high_water() {
        let (backend, registry) = registry();
        for _ in 0..3 {
            registry.insert_new(&request("SELECT 1"), QueryKind::OneTime).unwrap();
        }

        assert_eq!(registry.remove_all().unwrap(), 3);
        assert!(registry.list_ids().is_empty());
        assert_eq!(registry.remove_all().unwrap(), 0);

        let recovered = EntryRegistry::new(backend).unwrap();
        let stats = recovered.recover().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.high_water, 3);
        assert_eq!(
            recovered.insert_new(&request("SELECT 1"), QueryKind::OneTime).unwrap(),
            QueryId::new("4")
        );
    }

    #[test]
    fn test_recover_rebuilds_maps_and_resumes_ids() {
        let (backend, registry) = registry();
        registry.insert_new(&request("SELECT a"), QueryKind::OneTime).unwrap();
        registry.insert(entry("custom", "SELECT b", QueryKind::Schedule)).unwrap();
        registry.insert(entry("20", "SELECT c", QueryKind::OneTime)).unwrap();

        let recovered = EntryRegistry::new(backend).unwrap();
        let stats = recovered.recover().unwrap();

        assert_eq!(stats.entries, 3);
        assert_eq!(stats.repaired_index_keys, 0);
        assert_eq!(recovered.find_by_query_string("SELECT b").unwrap(), QueryId::new("custom"));
        assert_eq!(recovered.schedule_entries().len(), 1);
        assert_eq!(
            recovered.insert_new(&request("SELECT d"), QueryKind::OneTime).unwrap(),
            QueryId::new("21")
        );
    }

    #[test]
    fn test_recover_keeps_every_entry_of_a_large_registry() {
        let (backend, registry) = registry();
        let total = 100_001;
        for i in 0..total {
            registry
                .insert_new(&request(&format!("SELECT {}", i)), QueryKind::OneTime)
                .unwrap();
        }

        let recovered = EntryRegistry::new(backend).unwrap();
        let stats = recovered.recover().unwrap();
        assert_eq!(stats.entries, total);
        assert_eq!(stats.repaired_index_keys, 0);
        assert_eq!(stats.high_water, total as u64);
        assert_eq!(
            recovered.find_by_query_string(&format!("SELECT {}", total - 1)).unwrap(),
            QueryId::new(total.to_string())
        );
    }

    #[test]
    fn test_recover_ignores_out_of_range_numeric_ids() {
        let (backend, registry) = registry();
        registry
            .insert(entry(&u64::MAX.to_string(), "SELECT big", QueryKind::OneTime))
            .unwrap();

        let recovered = EntryRegistry::new(backend).unwrap();
        let stats = recovered.recover().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(
            recovered.insert_new(&request("SELECT 1"), QueryKind::OneTime).unwrap(),
            QueryId::new("1")
        );
    }

    #[test]
    fn test_recover_repairs_index() {
        let (backend, registry) = registry();
        registry.insert(entry("1", "SELECT 1", QueryKind::OneTime)).unwrap();

        let idx = QueryPartition::QueriesQueryIdx.partition();
        backend.delete(&idx, &composite_key("SELECT 1", "1")).unwrap();
        backend
            .put(&idx, &composite_key("SELECT ghost", "77"), b"77")
            .unwrap();

        let recovered = EntryRegistry::new(backend.clone()).unwrap();
        let stats = recovered.recover().unwrap();
        assert_eq!(stats.repaired_index_keys, 2);

        let keys: Vec<_> = backend
            .scan(&idx, None, None, None)
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![composite_key("SELECT 1", "1")]);
    }

    #[test]
    fn test_recover_rejects_corrupt_high_water() {
        let (backend, _registry) = registry();
        backend
            .put(&QueryPartition::Meta.partition(), QUERY_ID_SEQ_KEY, b"not-a-number")
            .unwrap();

        let recovered = EntryRegistry::new(backend).unwrap();
        assert!(matches!(recovered.recover(), Err(QueryError::Store(_))));
    }
}
