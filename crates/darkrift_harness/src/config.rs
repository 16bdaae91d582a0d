//! Configuration management for the harness.
//!
//! Settings are loaded from a TOML file. A missing file is written out with
//! the defaults so there is always something to edit.

use std::path::Path;

use darkrift::CacheSettings;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::CliArgs;

/// Application configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pool sizing handed straight to the object cache
    pub cache: CacheSettings,
    pub dispatcher: DispatcherSettings,
    pub workload: WorkloadSettings,
    pub logging: LoggingSettings,
}

/// How received messages reach the handling thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Run handlers inline on the producer threads instead of queueing them
    pub invoke_directly: bool,
    /// Surface handler failures from each pump instead of only logging them
    pub report_failures: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            invoke_directly: false,
            report_failures: true,
        }
    }
}

/// Simulated network load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSettings {
    /// Threads standing in for network I/O threads
    pub producer_threads: usize,
    pub messages_per_producer: u32,
    /// Every nth message is sent as a ping (0 disables pings)
    pub ping_every: u32,
    /// Interval between dispatcher pumps in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            producer_threads: 4,
            messages_per_producer: 10_000,
            ping_every: 64,
            tick_interval_ms: 16,
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating it with the defaults
    /// if it doesn't exist.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command line overrides on top of the loaded file.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if let Some(producers) = args.producers {
            self.workload.producer_threads = producers;
        }
        if let Some(messages) = args.messages {
            self.workload.messages_per_producer = messages;
        }
    }

    /// Checks the configuration for values the harness cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if let Err(e) = self.cache.validate() {
            return Err(format!("Invalid cache settings: {e}"));
        }

        if self.workload.producer_threads == 0 {
            return Err("At least one producer thread is required".to_string());
        }
        if self.workload.tick_interval_ms == 0 {
            return Err("Tick interval must be greater than zero".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
