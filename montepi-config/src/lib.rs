//! Runner configuration: a JSON or TOML file, validated on load, with
//! command line overrides layered on top.

use montepi_core::config::{Mode, Pacing, SimulationConfig};
use serde::Deserialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// --- Error Type ---
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

// --- Enums for Choices ---
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializerType {
    #[default]
    Json,
    Binary,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    #[default]
    Stdio,
    File,
    Null,
    WebSocket,
}

// --- Configuration Sections ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    #[serde(default = "default_total_points")]
    pub total_points: u64,
    #[serde(default)]
    pub mode: Mode,
    /// Logical workers for the multi-worker modes; detected when absent.
    pub workers: Option<usize>,
    pub seed: Option<u64>,
    #[serde(default)]
    pub pacing: Pacing,
}

fn default_total_points() -> u64 { 1_000_000 }

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            total_points: default_total_points(),
            mode: Mode::default(),
            workers: None,
            seed: None,
            pacing: Pacing::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SerializerConfig {
    #[serde(rename = "type")]
    pub serializer_type: SerializerType,
    pub options: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SenderConfig {
    #[serde(rename = "type")]
    pub sender_type: SenderType,
    pub options: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TransportConfig {
    #[serde(default)]
    pub serializer: SerializerConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    /// Send every Nth progress frame. State changes and the final frame
    /// are always sent.
    #[serde(default = "default_update_frequency")]
    pub update_frequency: u32,
}

fn default_update_frequency() -> u32 { 1 }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            serializer: SerializerConfig::default(),
            sender: SenderConfig::default(),
            update_frequency: default_update_frequency(),
        }
    }
}

// --- Top-Level Config Struct ---

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub transport: TransportConfig,
}

// --- Sender Options ---

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WebSocketOptions {
    #[serde(default = "default_ws_host")]
    pub host: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
}

fn default_ws_host() -> String { "127.0.0.1".to_string() }
fn default_ws_port() -> u16 { 8080 }

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            host: default_ws_host(),
            port: default_ws_port(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub path: PathBuf,
    #[serde(default)]
    pub append: bool,
}

impl SenderConfig {
    pub fn get_websocket_options(&self) -> WebSocketOptions {
        if let Some(value) = &self.options {
            if let Ok(options) = serde_json::from_value(value.clone()) {
                return options;
            }
        }
        WebSocketOptions::default()
    }

    /// File senders have no sensible default target, so a missing path is an error.
    pub fn get_file_options(&self) -> Result<FileOptions, ConfigError> {
        let value = self.options.clone().ok_or_else(|| {
            ConfigError::Validation("File sender requires an options.path entry.".to_string())
        })?;
        serde_json::from_value(value)
            .map_err(|e| ConfigError::Validation(format!("Invalid file sender options: {}", e)))
    }
}

// --- Helper Methods ---

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.update_frequency == 0 {
            return Err(ConfigError::Validation(
                "Update frequency must be greater than 0".to_string(),
            ));
        }

        if self.simulation.workers == Some(0) {
            return Err(ConfigError::Validation(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.transport.sender.sender_type == SenderType::File {
            self.transport.sender.get_file_options()?;
        }

        Ok(())
    }

    /// Builds the engine configuration. Point and worker counts outside the
    /// supported range are clamped here rather than rejected.
    pub fn simulation_config(&self) -> SimulationConfig {
        let settings = &self.simulation;
        let mut config = SimulationConfig::new(settings.total_points, settings.mode)
            .with_pacing(settings.pacing);
        if let Some(workers) = settings.workers {
            config = config.with_workers(workers);
        }
        if let Some(seed) = settings.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

// --- Command Line Overrides ---

/// Flags that take precedence over the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CliOverrides {
    /// Total points to sample (clamped to 1,000..=10,000,000)
    #[arg(short, long)]
    pub points: Option<u64>,

    /// Scheduling mode: sequential, parallel or threaded
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Logical workers for the multi-worker modes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Release batches on the virtual clock instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Send every Nth progress frame
    #[arg(long)]
    pub update_frequency: Option<u32>,
}

impl CliOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(points) = self.points {
            config.simulation.total_points = points;
        }
        if let Some(mode) = self.mode {
            config.simulation.mode = mode;
        }
        if let Some(workers) = self.workers {
            config.simulation.workers = Some(workers);
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = Some(seed);
        }
        if self.realtime {
            config.simulation.pacing = Pacing::RealTime;
        }
        if let Some(frequency) = self.update_frequency {
            config.transport.update_frequency = frequency;
        }
    }
}

// --- Loading Function ---

/// Loads and validates a config file. `.toml` files are read as TOML,
/// everything else as JSON.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: Config = match path.extension().and_then(OsStr::to_str) {
        Some("toml") => toml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn load_valid_json_config() {
        let file = write_json(
            r#"{
              "simulation": { "total_points": 250000, "mode": "parallel", "workers": 4, "seed": 42 },
              "transport": {
                "serializer": { "type": "binary", "options": null },
                "sender": { "type": "stdio", "options": null },
                "update_frequency": 5
              }
            }"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.simulation.total_points, 250_000);
        assert_eq!(config.simulation.mode, Mode::SimulatedParallel);
        assert_eq!(config.simulation.workers, Some(4));
        assert_eq!(config.simulation.pacing, Pacing::Unthrottled);
        assert_eq!(config.transport.serializer.serializer_type, SerializerType::Binary);
        assert_eq!(config.transport.sender.sender_type, SenderType::Stdio);
        assert_eq!(config.transport.update_frequency, 5);

        let simulation = config.simulation_config();
        assert_eq!(simulation.worker_count(), 4);
        assert_eq!(simulation.seed(), Some(42));
    }

    #[test]
    fn load_valid_toml_config() {
        let file = assert_fs::NamedTempFile::new("montepi.toml").unwrap();
        file.write_str(
            r#"
[simulation]
total_points = 5000
mode = "threaded"
pacing = "real_time"

[transport]
update_frequency = 2

[transport.sender]
type = "websocket"
options = { port = 9001 }
"#,
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.simulation.mode, Mode::Threaded);
        assert_eq!(config.simulation.pacing, Pacing::RealTime);
        assert_eq!(config.transport.serializer.serializer_type, SerializerType::Json);
        assert_eq!(config.transport.sender.sender_type, SenderType::WebSocket);

        let ws = config.transport.sender.get_websocket_options();
        assert_eq!(ws.host, "127.0.0.1");
        assert_eq!(ws.port, 9001);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_json("{}");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.simulation, SimulationSettings::default());
        assert_eq!(config.transport.update_frequency, 1);
        assert_eq!(config.simulation_config().total_points(), 1_000_000);
    }

    #[test]
    fn out_of_range_points_are_clamped_not_rejected() {
        let file = write_json(r#"{ "simulation": { "total_points": 12 } }"#);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.simulation_config().total_points(), 1_000);
    }

    #[test]
    fn load_invalid_update_frequency() {
        let file = write_json(r#"{ "transport": { "update_frequency": 0 } }"#);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_invalid_worker_count() {
        let file = write_json(r#"{ "simulation": { "workers": 0 } }"#);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn file_sender_requires_a_path() {
        let file = write_json(r#"{ "transport": { "sender": { "type": "file" } } }"#);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Validation(_))));

        let file = write_json(
            r#"{ "transport": { "sender": { "type": "file", "options": { "path": "frames.jsonl" } } } }"#,
        );
        let config = load_config(file.path()).unwrap();
        let options = config.transport.sender.get_file_options().unwrap();
        assert_eq!(options.path, PathBuf::from("frames.jsonl"));
        assert!(!options.append);
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let file = write_json(r#"{ "simulation": { "mode": "gpu" } }"#);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Json(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = assert_fs::TempDir::new().unwrap();
        let missing = dir.child("absent.json");
        assert!(matches!(load_config(missing.path()), Err(ConfigError::Io(_))));
    }

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        overrides: CliOverrides,
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let cli = TestCli::try_parse_from([
            "montepi",
            "--points",
            "20000",
            "--mode",
            "parallel",
            "--workers",
            "3",
            "--seed",
            "7",
            "--realtime",
        ])
        .unwrap();

        let mut config = Config::default();
        config.simulation.seed = Some(1);
        cli.overrides.apply(&mut config);

        assert_eq!(config.simulation.total_points, 20_000);
        assert_eq!(config.simulation.mode, Mode::SimulatedParallel);
        assert_eq!(config.simulation.workers, Some(3));
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.simulation.pacing, Pacing::RealTime);
        assert_eq!(config.transport.update_frequency, 1);
    }

    #[test]
    fn cli_rejects_unknown_mode() {
        assert!(TestCli::try_parse_from(["montepi", "--mode", "gpu"]).is_err());
    }
}
