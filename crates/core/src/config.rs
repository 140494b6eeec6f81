use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            storage: StorageConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            runner: RunnerConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  server:     {}:{}",
            self.server.host,
            self.server.port
        );
        tracing::info!("  storage:    data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  scheduler:  timeout={}min, monitor_period={}s, poll_timeout={}s",
            self.scheduler.default_timeout_minutes,
            self.scheduler.monitor_period_secs,
            self.scheduler.runner_poll_timeout_secs
        );
        tracing::info!(
            "  runner:     command={}, workdir={}",
            self.runner.command,
            self.runner
                .workdir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(inherit)".to_string())
        );
    }
}

// ── Sections ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 8040),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for task logs and the report store.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("DATA_DIR", "./data")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timeout stamped on every task at creation (minutes).
    pub default_timeout_minutes: u32,
    /// Period of the heartbeat/timeout monitor loop (seconds).
    pub monitor_period_secs: u64,
    /// Upper bound for any single runner start/stop/poll call (seconds).
    pub runner_poll_timeout_secs: u64,
}

impl SchedulerConfig {
    fn from_env() -> Self {
        Self {
            default_timeout_minutes: env_u32("DEFAULT_TIMEOUT_MINUTES", 30),
            monitor_period_secs: env_u64("MONITOR_PERIOD_SECS", 5),
            runner_poll_timeout_secs: env_u64("RUNNER_POLL_TIMEOUT_SECS", 2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Analyzer command spawned for each task. Receives
    /// `--ecosystem <e> --package <n> --version <v>` arguments.
    pub command: String,
    /// Working directory for the analyzer process.
    pub workdir: Option<PathBuf>,
}

impl RunnerConfig {
    fn from_env() -> Self {
        Self {
            command: env_or("RUNNER_COMMAND", "package-analyze"),
            workdir: env_opt("RUNNER_WORKDIR").map(PathBuf::from),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────
