//! `QueryManager`: the public contract of the query tracker.
//!
//! Composes the entry registry, identifier generator, schedule projector,
//! artifact store and scheduler sink. Constructed explicitly with its
//! storage backend and sink; there is no process-wide instance.

use crate::artifacts::QueryArtifacts;
use crate::error::{QueryError, Result};
use crate::id_generator::MAX_SEQUENCE;
use crate::projector::{scheduled_ids, ScheduleProjector};
use crate::registry::{EntryRegistry, RecoveryStats, Upsert};
use crate::scheduler::ScheduleSink;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use zeekagent_commons::{QueryEntry, QueryId, QueryKind, SubscriptionMetadata, SubscriptionRequest};
use zeekagent_store::StorageBackend;

/// What `purge_query` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub entries: Vec<QueryId>,
    pub artifacts: usize,
}

pub struct QueryManager {
    registry: EntryRegistry,
    artifacts: QueryArtifacts,
    projector: ScheduleProjector,
    sink: Arc<dyn ScheduleSink>,
    /// Scheduled ids the sink refused; left out of projections.
    quarantine: RwLock<HashSet<QueryId>>,
    /// Serializes project-then-apply so documents reach the sink in order.
    /// Quarantine lifts take it too, so a rejection of an older document
    /// cannot land after a re-subscription cleared it.
    schedule_lock: Mutex<()>,
    recovery: RecoveryStats,
}

impl QueryManager {
    /// Open the tracker over `backend` and restore any durable state.
    pub fn open(backend: Arc<dyn StorageBackend>, sink: Arc<dyn ScheduleSink>) -> Result<Self> {
        let registry = EntryRegistry::new(Arc::clone(&backend))?;
        let recovery = registry.recover()?;
        let artifacts = QueryArtifacts::new(backend)?;

        Ok(Self {
            registry,
            artifacts,
            projector: ScheduleProjector::new(),
            sink,
            quarantine: RwLock::new(HashSet::new()),
            schedule_lock: Mutex::new(()),
            recovery,
        })
    }

    /// What recovery found when the tracker was opened.
    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery
    }

    pub fn artifacts(&self) -> &QueryArtifacts {
        &self.artifacts
    }

    /// Drop `ids` from the quarantine once no schedule apply is in flight.
    fn lift_quarantine<'a>(&self, ids: impl IntoIterator<Item = &'a QueryId>) {
        let _guard = self.schedule_lock.lock();
        let mut quarantine = self.quarantine.write();
        for id in ids {
            if quarantine.remove(id) {
                log::debug!("Lifted quarantine of {}", id);
            }
        }
    }

    /// Forget every tracked entry. Identifiers are never reissued.
    pub fn reset(&self) -> Result<()> {
        let removed = self.registry.remove_all()?;
        {
            let _guard = self.schedule_lock.lock();
            self.quarantine.write().clear();
        }
        log::info!("Query tracker reset ({} entries dropped)", removed);
        Ok(())
    }

    pub fn add_one_time_query_entry(&self, request: &SubscriptionRequest) -> Result<QueryId> {
        validate_request(request, QueryKind::OneTime)?;
        let id = self.registry.insert_new(request, QueryKind::OneTime)?;

        log::info!("Accepted one-time query {} for '{}'", id, request.query);
        Ok(id)
    }

    /// Track a scheduled query, or refresh the subscription metadata of the
    /// one already scheduled for the same text.
    pub fn add_schedule_query_entry(&self, request: &SubscriptionRequest) -> Result<QueryId> {
        validate_request(request, QueryKind::Schedule)?;
        let upsert = self.registry.upsert_schedule(request)?;
        self.lift_quarantine([upsert.query_id()]);

        match &upsert {
            Upsert::Created(id) => {
                log::info!("Accepted scheduled query {} for '{}'", id, request.query)
            }
            Upsert::Updated(id) => {
                log::info!("Re-subscribed scheduled query {} for '{}'", id, request.query)
            }
        }
        Ok(upsert.query_id().clone())
    }

    /// Track `request` under a caller-chosen identifier.
    pub fn add_query_entry(
        &self,
        query_id: &QueryId,
        request: &SubscriptionRequest,
        kind: QueryKind,
    ) -> Result<()> {
        validate_query_id(query_id)?;
        validate_request(request, kind)?;
        self.registry
            .insert(QueryEntry::from_request(query_id.clone(), request, kind))?;

        log::info!("Accepted {} query {} for '{}'", kind, query_id, request.query);
        Ok(())
    }

    pub fn find_id_for_query(&self, query: &str) -> Result<QueryId> {
        self.registry.find_by_query_string(query)
    }

    pub fn find_query_and_type(&self, query_id: &QueryId) -> Result<(QueryKind, String)> {
        let (query, kind) = self.registry.find_by_id(query_id)?;
        Ok((kind, query))
    }

    /// Stop tracking the entry `query` resolves to. Artifacts are kept.
    pub fn remove_query_entry(&self, query: &str) -> Result<QueryEntry> {
        let entry = self.registry.remove(query)?;
        self.lift_quarantine([&entry.query_id]);

        log::info!("Removed {} query {} for '{}'", entry.kind, entry.query_id, query);
        Ok(entry)
    }

    /// Remove every entry tracked for `query` and delete its artifacts in
    /// one storage batch.
    ///
    /// Succeeds when either existed; `NotFound` when neither did.
    pub fn purge_query(&self, query: &str) -> Result<PurgeOutcome> {
        let (removed, artifacts) = self
            .artifacts
            .purge_with(query, |ops| self.registry.remove_query_with(query, ops))?;
        self.lift_quarantine(removed.iter().map(|e| &e.query_id));

        if removed.is_empty() && artifacts == 0 {
            return Err(QueryError::NotFound(format!("query '{}'", query)));
        }

        let outcome = PurgeOutcome {
            entries: removed.into_iter().map(|e| e.query_id).collect(),
            artifacts,
        };
        log::info!(
            "Purged '{}' ({} entries, {} artifacts)",
            query,
            outcome.entries.len(),
            outcome.artifacts
        );
        Ok(outcome)
    }

    /// The schedule document for every scheduled, non-quarantined entry.
    pub fn get_query_config_string(&self) -> String {
        let entries = self.registry.schedule_entries();
        let quarantine = self.quarantine.read();
        self.projector.render(&entries, &quarantine)
    }

    /// Hand the current schedule document to the scheduler.
    ///
    /// On rejection the registry is unchanged; jobs the scheduler names are
    /// quarantined until re-subscribed or removed.
    pub fn update_schedule(&self) -> Result<()> {
        let _guard = self.schedule_lock.lock();
        let config = self.get_query_config_string();

        match self.sink.apply(&config) {
            Ok(()) => {
                log::debug!("Schedule applied ({} jobs)", scheduled_ids(&config).len());
                Ok(())
            }
            Err(rejection) => {
                let offered: HashSet<QueryId> = scheduled_ids(&config).into_iter().collect();
                let mut quarantine = self.quarantine.write();
                for id in rejection.rejected.iter().filter(|id| offered.contains(*id)) {
                    if quarantine.insert(id.clone()) {
                        log::warn!("Quarantined scheduled query {}", id);
                    }
                }
                log::warn!("Scheduler rejected configuration: {}", rejection);
                Err(QueryError::SchedulerRejected(rejection.to_string()))
            }
        }
    }

    /// Ids currently left out of the projection.
    pub fn quarantined(&self) -> Vec<QueryId> {
        let mut ids: Vec<_> = self.quarantine.read().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get_entry(&self, query_id: &QueryId) -> Result<QueryEntry> {
        self.registry.get(query_id)
    }

    pub fn get_subscription(&self, query_id: &QueryId) -> Result<SubscriptionMetadata> {
        Ok(self.registry.get(query_id)?.metadata)
    }

    pub fn get_event_cookie(&self, query_id: &QueryId) -> Result<String> {
        Ok(self.get_subscription(query_id)?.cookie)
    }

    pub fn get_event_name(&self, query_id: &QueryId) -> Result<String> {
        Ok(self.get_subscription(query_id)?.event_name)
    }

    pub fn get_event_topic(&self, query_id: &QueryId) -> Result<String> {
        Ok(self.get_subscription(query_id)?.event_topic)
    }

    pub fn get_query_ids(&self) -> Vec<QueryId> {
        self.registry.list_ids()
    }
}

fn validate_request(request: &SubscriptionRequest, kind: QueryKind) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(QueryError::InvalidArgument(
            "query text must not be empty".to_string(),
        ));
    }
    if request.query.contains('\0') {
        return Err(QueryError::InvalidArgument(
            "query text must not contain NUL".to_string(),
        ));
    }
    if kind.is_schedule() && request.interval == 0 {
        return Err(QueryError::InvalidArgument(format!(
            "scheduled query '{}' needs an interval > 0",
            request.query
        )));
    }
    Ok(())
}

fn validate_query_id(query_id: &QueryId) -> Result<()> {
    if query_id.is_empty() {
        return Err(QueryError::InvalidArgument("query id must not be empty".to_string()));
    }
    if query_id.as_str().contains('\0') {
        return Err(QueryError::InvalidArgument(
            "query id must not contain NUL".to_string(),
        ));
    }
    let numeric = query_id.as_str().bytes().all(|b| b.is_ascii_digit());
    if numeric && query_id.sequence().map_or(true, |seq| seq > MAX_SEQUENCE) {
        return Err(QueryError::InvalidArgument(format!(
            "numeric query id {} is above {}",
            query_id, MAX_SEQUENCE
        )));
    }
    Ok(())
}
