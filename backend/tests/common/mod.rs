#![allow(dead_code)]
//! Shared helpers for agent integration tests.

use std::path::Path;
use zeekagent_commons::SubscriptionRequest;
use zeekagent_server::config::AgentConfig;

pub fn init_logs() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}

/// Default config with every on-disk path placed under `root`.
pub fn config_in(root: &Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.storage.rocksdb_path = root.join("rocksdb").to_string_lossy().into_owned();
    config.schedule.config_path = root.join("osquery.conf").to_string_lossy().into_owned();
    config.logging.logs_path = root.join("logs").to_string_lossy().into_owned();
    config
}

pub fn request(query: &str) -> SubscriptionRequest {
    SubscriptionRequest::new(query, "zeek_osquery_result", "/zeek/osquery/results")
}
