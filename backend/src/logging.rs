// Logging setup for the agent process
//
// Library crates log through the `log` facade; `tracing_log::LogTracer`
// routes those records into the subscriber assembled here from
// `[logging]` in config.toml.

use std::fs::{self, File, OpenOptions};
use std::str::FromStr;

use anyhow::Context;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingSettings;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Crates whose chatter is capped at `warn` unless a target override says otherwise.
const QUIET_TARGETS: &[&str] = &["rocksdb", "tokio", "mio"];

/// How records are written to the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `timestamp LEVEL target: message`
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Unknown log format '{}'", other)),
        }
    }
}

/// Base level, then the quiet crates, then `[logging.targets]` in target order.
fn build_env_filter(settings: &LoggingSettings) -> anyhow::Result<EnvFilter> {
    let level: LevelFilter = settings
        .level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", settings.level))?;
    let mut filter = EnvFilter::default().add_directive(level.into());

    let mut overrides: Vec<(&str, &str)> = QUIET_TARGETS
        .iter()
        .filter(|target| !settings.targets.contains_key(**target))
        .map(|target| (*target, "warn"))
        .collect();
    let mut targets: Vec<_> = settings
        .targets
        .iter()
        .map(|(target, level)| (target.as_str(), level.as_str()))
        .collect();
    targets.sort();
    overrides.extend(targets);

    for (target, level) in overrides {
        let directive: Directive = format!("{}={}", target, level)
            .parse()
            .with_context(|| format!("Invalid level '{}' for target '{}'", level, target))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn console_layer(settings: &LoggingSettings) -> anyhow::Result<BoxedLayer> {
    Ok(tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(build_env_filter(settings)?)
        .boxed())
}

fn file_layer(
    settings: &LoggingSettings,
    format: LogFormat,
    file: File,
) -> anyhow::Result<BoxedLayer> {
    let filter = build_env_filter(settings)?;
    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file)
            .with_span_events(FmtSpan::CLOSE)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(file)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter)
            .boxed(),
    };
    Ok(layer)
}

/// Install the global subscriber described by `settings`.
///
/// The log file is created under `logs_path` when missing. Fails if a
/// subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let format: LogFormat = settings.format.parse()?;
    let path = settings.log_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Cannot open log file {}", path.display()))?;

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if settings.log_to_console {
        layers.push(console_layer(settings)?);
    }
    layers.push(file_layer(settings, format, file)?);

    // Already set when a test harness installed its own logger
    tracing_log::LogTracer::init().ok();

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        level = %settings.level,
        console = settings.log_to_console,
        file = %path.display(),
        "logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str) -> LoggingSettings {
        LoggingSettings {
            level: level.to_string(),
            ..LoggingSettings::default()
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("jsonl".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("pretty".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_env_filter_orders_overrides() {
        let mut settings = settings("info");
        settings
            .targets
            .insert("zeekagent_queries".to_string(), "debug".to_string());
        settings.targets.insert("rocksdb".to_string(), "error".to_string());

        let rendered = build_env_filter(&settings).unwrap().to_string();
        assert!(rendered.contains("zeekagent_queries=debug"));
        assert!(rendered.contains("tokio=warn"));
        // A configured target replaces the quiet default for the same crate
        assert!(rendered.contains("rocksdb=error"));
        assert!(!rendered.contains("rocksdb=warn"));
        assert!(rendered.contains("info"));
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        assert!(build_env_filter(&settings("loud")).is_err());

        let mut settings = settings("info");
        settings
            .targets
            .insert("zeekagent_store".to_string(), "not a level".to_string());
        assert!(build_env_filter(&settings).is_err());
    }
}
