// Configuration module
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use zeekagent_store::RocksDbSettings;

/// Main agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Agent identity and timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Seconds between periodic schedule refreshes
    #[serde(default = "default_schedule_refresh_seconds")]
    pub schedule_refresh_seconds: u64,
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_rocksdb_path")]
    pub rocksdb_path: String,
    #[serde(default)]
    pub rocksdb: RocksDbSettings,
}

/// Where the projected schedule goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_schedule_config_path")]
    pub config_path: String,
    /// Interval applied to inbound subscriptions that carry none
    #[serde(default = "default_interval")]
    pub default_interval: u64,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Per-target level overrides, e.g. `zeekagent_store = "warn"`
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl LoggingSettings {
    /// The agent's log file inside `logs_path`.
    pub fn log_file(&self) -> PathBuf {
        Path::new(&self.logs_path).join("zeekagent.log")
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            schedule_refresh_seconds: default_schedule_refresh_seconds(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            rocksdb_path: default_rocksdb_path(),
            rocksdb: RocksDbSettings::default(),
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            config_path: default_schedule_config_path(),
            default_interval: default_interval(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}

fn default_node_id() -> String {
    "zeekagent".to_string()
}

fn default_schedule_refresh_seconds() -> u64 {
    60
}

fn default_rocksdb_path() -> String {
    "./data/rocksdb".to_string()
}

fn default_schedule_config_path() -> String {
    "./data/osquery.conf".to_string()
}

fn default_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_logs_path() -> String {
    "./logs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::from_toml_str(&content)
    }

    /// Load from `path`, or from defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path);
        }

        let mut config = AgentConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: AgentConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        // Override with environment variables if present
        config.apply_env_overrides()?;

        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// - ZEEKAGENT_LOG_LEVEL: Override logging.level
    /// - ZEEKAGENT_LOG_TO_CONSOLE: Override logging.log_to_console
    /// - ZEEKAGENT_DATA_DIR: Override storage.rocksdb_path
    /// - ZEEKAGENT_SCHEDULE_PATH: Override schedule.config_path
    ///
    /// Environment variables take precedence over config.toml values
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        use std::env;

        if let Ok(level) = env::var("ZEEKAGENT_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Ok(val) = env::var("ZEEKAGENT_LOG_TO_CONSOLE") {
            self.logging.log_to_console = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        if let Ok(path) = env::var("ZEEKAGENT_DATA_DIR") {
            self.storage.rocksdb_path = path;
        }

        if let Ok(path) = env::var("ZEEKAGENT_SCHEDULE_PATH") {
            self.schedule.config_path = path;
        }

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.storage.rocksdb_path.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.rocksdb_path cannot be empty"));
        }

        if self.schedule.config_path.trim().is_empty() {
            return Err(anyhow::anyhow!("schedule.config_path cannot be empty"));
        }

        if self.logging.logs_path.trim().is_empty() {
            return Err(anyhow::anyhow!("logging.logs_path cannot be empty"));
        }

        if self.agent.schedule_refresh_seconds == 0 {
            return Err(anyhow::anyhow!("agent.schedule_refresh_seconds cannot be 0"));
        }

        if self.schedule.default_interval == 0 {
            return Err(anyhow::anyhow!("schedule.default_interval cannot be 0"));
        }

        Ok(())
    }
}
