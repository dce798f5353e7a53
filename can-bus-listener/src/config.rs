//! Configuration loading and parsing

use anyhow::{ensure, Context, Result};
use pgn_decoder::{PgnDefinition, PgnTable};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Extra PGN definitions merged over the built-in table
    #[serde(default, rename = "pgn")]
    pub pgns: Vec<PgnEntryConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub teardown_with_sudo: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            bitrate: default_bitrate(),
            receive_timeout_ms: default_receive_timeout(),
            wait_timeout_secs: default_wait_timeout(),
            poll_interval_ms: default_poll_interval(),
            teardown_with_sudo: true,
        }
    }
}

impl BusConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
    #[serde(default = "default_pipe_path")]
    pub pipe_path: PathBuf,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            pipe_path: default_pipe_path(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl PublisherConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log file; stderr when absent
    pub file: Option<PathBuf>,
}

/// A `[[pgn]]` table entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PgnEntryConfig {
    pub id: u32,
    #[serde(flatten)]
    pub definition: PgnDefinition,
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    500_000
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_wait_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_pipe_path() -> PathBuf {
    PathBuf::from("/tmp/canbus_pipe")
}

fn default_heartbeat_interval() -> u64 {
    5
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

impl AppConfig {
    /// Reject timing values the receive loop cannot run with
    ///
    /// A zero read timeout blocks the socket indefinitely, a zero poll
    /// interval spins on `ip link show`, and a zero heartbeat interval emits
    /// a heartbeat on every loop pass.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.bus.receive_timeout_ms > 0,
            "bus.receive_timeout_ms must be greater than zero"
        );
        ensure!(
            self.bus.poll_interval_ms > 0,
            "bus.poll_interval_ms must be greater than zero"
        );
        ensure!(
            self.publisher.heartbeat_interval_secs > 0,
            "publisher.heartbeat_interval_secs must be greater than zero"
        );
        Ok(())
    }

    /// Build the PGN table: built-in entries, then configured ones on top
    pub fn build_table(&self) -> Result<PgnTable> {
        let mut table = PgnTable::standard();
        for entry in &self.pgns {
            table
                .insert(entry.id, entry.definition.clone())
                .with_context(|| format!("Invalid [[pgn]] entry for PGN {}", entry.id))?;
            log::info!("Configured PGN {}: {}", entry.id, entry.definition.name);
        }
        Ok(table)
    }
}
