//! Concurrent inserts from several threads against one RocksDB-backed
//! tracker.

mod common;

use common::{config_in, init_logs, request};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use zeekagent_commons::QueryKind;
use zeekagent_queries::{scheduled_ids, QueryError};
use zeekagent_server::lifecycle::bootstrap;

#[tokio::test]
async fn test_concurrent_one_time_inserts_get_unique_ids() {
    init_logs();
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let components = bootstrap(&config_in(dir.path())).await.expect("bootstrap");
    let manager = Arc::clone(&components.manager);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        manager
                            .add_one_time_query_entry(&request(&format!("SELECT {} FROM t{}", i, t)))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id), "duplicate id issued");
        }
    }

    assert_eq!(all.len(), 200);
    let listed: HashSet<_> = manager.get_query_ids().into_iter().collect();
    assert_eq!(listed, all);
}

#[tokio::test]
async fn test_concurrent_schedule_of_same_query_keeps_one_entry() {
    init_logs();
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let components = bootstrap(&config_in(dir.path())).await.expect("bootstrap");
    let manager = Arc::clone(&components.manager);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .add_schedule_query_entry(
                        &request("SELECT * FROM listening_ports").with_cookie(format!("c{}", t)),
                    )
                    .unwrap()
            })
        })
        .collect();

    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);

    let config = manager.get_query_config_string();
    assert_eq!(scheduled_ids(&config).len(), 1);
    let id = manager.find_id_for_query("SELECT * FROM listening_ports").unwrap();
    assert_eq!(
        manager.find_query_and_type(&id).unwrap().0,
        QueryKind::Schedule
    );
}

#[tokio::test]
async fn test_readers_run_alongside_writers() {
    init_logs();
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let components = bootstrap(&config_in(dir.path())).await.expect("bootstrap");
    let manager = Arc::clone(&components.manager);

    let writer = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for i in 0..50 {
                let query = format!("SELECT {}", i);
                manager.add_schedule_query_entry(&request(&query)).unwrap();
                if i % 2 == 0 {
                    manager.remove_query_entry(&query).unwrap();
                }
            }
        })
    };

    let reader = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for _ in 0..200 {
                for id in manager.get_query_ids() {
                    // An id may be removed between listing and lookup
                    match manager.get_event_topic(&id) {
                        Ok(topic) => assert_eq!(topic, "/zeek/osquery/results"),
                        Err(QueryError::NotFound(_)) => {}
                        Err(e) => panic!("unexpected error {}", e),
                    }
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(manager.get_query_ids().len(), 25);
}
