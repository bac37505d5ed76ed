//! Agent lifecycle management helpers.
//!
//! Bootstraps storage and the query tracker, bridges inbound subscription
//! events, drives the periodic schedule refresh and coordinates shutdown.

use crate::config::AgentConfig;
use crate::schedule_sink::FileScheduleSink;
use anyhow::Result;
use log::{debug, info, warn};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use zeekagent_queries::{EventOutcome, QueryManager, QueryPartition, SubscriptionEvent};
use zeekagent_store::{RocksDBBackend, RocksDbInit};

/// Components shared between the event bridge, the tick and shutdown.
pub struct AgentComponents {
    pub manager: Arc<QueryManager>,
    pub backend: Arc<RocksDBBackend>,
}

/// Counters reported when the event input closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub processed: usize,
    pub failed: usize,
}

/// Open RocksDB with every tracker partition and restore the query tracker.
pub async fn bootstrap(config: &AgentConfig) -> Result<AgentComponents> {
    let phase_start = std::time::Instant::now();
    let db_path = Path::new(&config.storage.rocksdb_path);
    std::fs::create_dir_all(db_path)?;

    let db = RocksDbInit::new(config.storage.rocksdb_path.clone(), config.storage.rocksdb.clone())
        .with_partitions(QueryPartition::all_names())
        .open()?;
    info!(
        "RocksDB initialized at {} ({:.2}ms)",
        db_path.display(),
        phase_start.elapsed().as_secs_f64() * 1000.0
    );

    let backend = Arc::new(RocksDBBackend::new(db));
    let sink = Arc::new(FileScheduleSink::new(&config.schedule.config_path));
    let manager = QueryManager::open(backend.clone(), sink)?;

    let stats = manager.recovery_stats();
    info!(
        "Query tracker recovered: {} entries, {} index keys repaired, {} duplicates dropped, next id after {}",
        stats.entries, stats.repaired_index_keys, stats.dropped_duplicates, stats.high_water
    );

    Ok(AgentComponents {
        manager: Arc::new(manager),
        backend,
    })
}

/// Decode one newline-delimited event, filling in `default_interval` for
/// subscriptions that carry no interval.
pub fn parse_event_line(line: &str, default_interval: u64) -> Result<SubscriptionEvent> {
    let mut value: Value = serde_json::from_str(line)?;
    if let Some(request) = value.get_mut("request").and_then(Value::as_object_mut) {
        request
            .entry("interval")
            .or_insert_with(|| Value::from(default_interval));
    }
    Ok(SubscriptionEvent::from_value(value)?)
}

/// Dispatch events read from `reader` until it reaches end of input.
///
/// Malformed lines and rejected events are logged and counted; they do not
/// stop the bridge.
pub async fn run_event_bridge<R>(
    manager: Arc<QueryManager>,
    reader: R,
    default_interval: u64,
) -> Result<BridgeStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = BridgeStats::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match parse_event_line(line, default_interval) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring malformed event: {}", e);
                stats.failed += 1;
                continue;
            }
        };

        let mgr = Arc::clone(&manager);
        match tokio::task::spawn_blocking(move || mgr.handle_event(event)).await? {
            Ok(outcome) => {
                match &outcome {
                    EventOutcome::Scheduled(id) => info!("Scheduled query {}", id),
                    EventOutcome::OneTime(id) => info!("One-time query {} ready to run", id),
                    EventOutcome::Unsubscribed(id) => info!("Unsubscribed query {}", id),
                }
                stats.processed += 1;
            }
            Err(e) => {
                warn!("Subscription event failed: {}", e);
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

/// Re-apply the schedule every `period`.
pub fn spawn_schedule_tick(manager: Arc<QueryManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let mgr = Arc::clone(&manager);
            match tokio::task::spawn_blocking(move || mgr.update_schedule()).await {
                Ok(Ok(())) => debug!("Schedule refreshed"),
                Ok(Err(e)) => warn!("Schedule refresh failed: {}", e),
                Err(e) => log::error!("Schedule refresh task panicked: {}", e),
            }
        }
    })
}

/// Run until ctrl-c or until stdin closes.
pub async fn run(config: &AgentConfig, components: AgentComponents) -> Result<()> {
    let AgentComponents { manager, backend } = components;

    // Hand the recovered schedule over before taking new events
    if let Err(e) = manager.update_schedule() {
        warn!("Initial schedule apply failed: {}", e);
    }

    let tick = spawn_schedule_tick(
        Arc::clone(&manager),
        Duration::from_secs(config.agent.schedule_refresh_seconds),
    );
    info!(
        "Schedule refresh every {}s, writing {}",
        config.agent.schedule_refresh_seconds, config.schedule.config_path
    );

    let bridge = run_event_bridge(
        Arc::clone(&manager),
        BufReader::new(tokio::io::stdin()),
        config.schedule.default_interval,
    );

    tokio::select! {
        result = bridge => {
            match result {
                Ok(stats) => info!(
                    "Event input closed ({} processed, {} failed)",
                    stats.processed, stats.failed
                ),
                Err(e) => log::error!("Event bridge failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
    }

    tick.abort();
    shutdown(&backend)?;

    info!("Agent shutdown complete");
    Ok(())
}

/// Flush every tracker partition to disk.
pub fn shutdown(backend: &RocksDBBackend) -> Result<()> {
    let partitions: Vec<_> = QueryPartition::ALL.iter().map(QueryPartition::partition).collect();
    backend
        .flush(&partitions)
        .map_err(|e| anyhow::anyhow!("Failed to flush storage: {}", e))?;
    debug!("Flushed {} partitions", partitions.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeekagent_commons::QueryKind;
    use zeekagent_queries::QueryError;

    #[test]
    fn test_parse_fills_default_interval() {
        let event = parse_event_line(
            r#"{"type":"subscribe","kind":"SCHEDULE","request":{"query":"SELECT 1","response_event":"ev","response_topic":"/t"}}"#,
            45,
        )
        .unwrap();
        match event {
            SubscriptionEvent::Subscribe { request, kind } => {
                assert_eq!(kind, QueryKind::Schedule);
                assert_eq!(request.interval, 45);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_keeps_explicit_interval() {
        let event = parse_event_line(
            r#"{"type":"subscribe","kind":"SCHEDULE","request":{"query":"SELECT 1","response_event":"ev","response_topic":"/t","interval":300}}"#,
            45,
        )
        .unwrap();
        match event {
            SubscriptionEvent::Subscribe { request, .. } => assert_eq!(request.interval, 300),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_unsubscribe_and_garbage() {
        let event = parse_event_line(r#"{"type":"unsubscribe","query":"SELECT 1"}"#, 10).unwrap();
        assert!(matches!(event, SubscriptionEvent::Unsubscribe { .. }));

        assert!(parse_event_line("{", 10).is_err());
        assert!(parse_event_line(r#"{"type":"publish"}"#, 10).is_err());
    }

    #[test]
    fn test_parse_unknown_kind_is_invalid_argument() {
        let err = parse_event_line(
            r#"{"type":"subscribe","kind":"RECURRING","request":{"query":"SELECT 1","response_event":"ev","response_topic":"/t"}}"#,
            10,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueryError>(),
            Some(QueryError::InvalidArgument(_))
        ));
    }
}
