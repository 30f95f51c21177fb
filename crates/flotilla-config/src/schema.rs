// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so enabled-by-default fields need a named function.
fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./agent_logs")
}

fn default_monitor_interval() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default working directory handed to every agent.  `None` means the
    /// orchestrator's own cwd.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Default model id for new agents.
    #[serde(default = "default_model")]
    pub model: String,

    /// Default max output tokens per agent response.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_directory: None,
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            logging: LoggingConfig::default(),
            monitor: MonitorConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Per-agent file logging (prompt/text/tools/summary sink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Root directory for per-agent log directories.
    /// Overridden by the `AGENT_LOG_DIR` environment variable.
    #[serde(default = "default_log_dir")]
    pub agent_log_dir: PathBuf,

    /// Whether agent file logging is on at all.
    /// Overridden by the `ENABLE_AGENT_LOGGING` environment variable.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            agent_log_dir: default_log_dir(),
            enabled: true,
        }
    }
}

/// Fleet monitor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Enable the periodic fleet monitor.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between monitor ticks.  `stop()` waits at most one tick.
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_monitor_interval(),
        }
    }
}

/// Relational store for dashboard entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path.  `None` disables persistence.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Apply the environment-variable overrides the core recognises.
    ///
    /// All other environment variables belong to the external API adapter.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("AGENT_LOG_DIR") {
            if !dir.is_empty() {
                self.logging.agent_log_dir = PathBuf::from(dir);
            }
        }
        if let Ok(enabled) = std::env::var("ENABLE_AGENT_LOGGING") {
            match enabled.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => self.logging.enabled = false,
                "1" | "true" | "yes" | "on" => self.logging.enabled = true,
                _ => {}
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
