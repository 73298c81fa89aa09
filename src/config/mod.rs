//! Configuration module for PredVis-RS
//!
//! This module handles application configuration:
//! - Serial link bootstrap (serialdump binary, baud rate, device, mote buffer size)
//! - External predicate compiler and assembler commands
//! - Topology round retention
//! - Logging output
//! - Predicates to preload at startup
//!
//! # Config Location
//!
//! The default config file lives in the platform-appropriate config directory
//! under `predvis-rs/config.toml`:
//!
//! - **Linux**: `~/.config/predvis-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/predvis-rs/config.toml`
//! - **Windows**: `%APPDATA%\predvis-rs\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use predvis_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.link.device = "/dev/ttyUSB1".to_string();
//! config.save(predvis_rs::config::default_config_path().unwrap())?;
//! ```

use crate::error::{PredVisError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "predvis-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Receive buffer of the sink mote, including the trailing newline
pub const MOTE_BUFFER_SIZE: usize = 127;

/// Baud rate the sink mote firmware is built for
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bound on joining the link reader thread
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;

/// Default capacity of the link event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Smallest buffer that still fits a one-byte chunk line (`b00\n`)
const MIN_BUFFER_SIZE: usize = 4;

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Link ====================

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Path to the serialdump binary that bridges the serial device to stdio
    pub serialdump: PathBuf,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Serial device of the sink mote
    pub device: String,

    /// Outbound line ceiling in bytes, including the newline
    pub buffer_size: usize,

    /// How long `close` waits for the reader thread
    pub join_timeout_ms: u64,

    /// Capacity of the event channel between the reader and consumers
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            serialdump: PathBuf::from("serialdump-linux"),
            baud_rate: DEFAULT_BAUD_RATE,
            device: "/dev/ttyUSB0".to_string(),
            buffer_size: MOTE_BUFFER_SIZE,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Arguments passed to the serialdump binary
    pub fn serialdump_args(&self) -> Vec<String> {
        vec![format!("-b{}", self.baud_rate), self.device.clone()]
    }

    pub fn join_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.join_timeout_ms)
    }
}

// ==================== Compiler ====================

/// An external program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Predicate compiler and assembler settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Directory predicate scripts are stored in
    pub script_directory: Option<PathBuf>,

    /// Script compiler; reads the script on stdin, writes JSON on stdout
    pub compiler_command: Option<CommandSpec>,

    /// Assembler; reads assembly on stdin, writes bytecode on stdout
    pub assembler_command: Option<CommandSpec>,
}

impl CompilerConfig {
    /// Resolve a relative script path against `script_directory`
    pub fn resolve_script(&self, script: &Path) -> PathBuf {
        match &self.script_directory {
            Some(dir) if script.is_relative() => dir.join(script),
            _ => script.to_path_buf(),
        }
    }
}

// ==================== Topology ====================

/// Topology history settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Keep at most this many rounds, evicting the lowest round numbers
    pub max_rounds: Option<usize>,
}

// ==================== Logging ====================

/// Logging output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a daily rolling log file into this directory
    pub directory: Option<PathBuf>,

    /// Filter used when `RUST_LOG` is not set
    pub filter: Option<String>,
}

// ==================== Predicates ====================

/// A predicate to register at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateEntry {
    pub name: String,
    pub script: PathBuf,
    #[serde(default)]
    pub deploy_on_connect: bool,
}

// ==================== App Config ====================

/// The full application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub compiler: CompilerConfig,
    pub topology: TopologyConfig,
    pub logging: LoggingConfig,
    pub predicates: Vec<PredicateEntry>,
}

impl AppConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredVisError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            PredVisError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .map_err(|e| PredVisError::Serialization(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PredVisError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        std::fs::write(path, content)
            .map_err(|e| PredVisError::Config(format!("Failed to write config file: {}", e)))
    }

    /// Reject settings the link cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.link.buffer_size < MIN_BUFFER_SIZE {
            return Err(PredVisError::Config(format!(
                "link.buffer_size must be at least {}, got {}",
                MIN_BUFFER_SIZE, self.link.buffer_size
            )));
        }
        if self.link.baud_rate == 0 {
            return Err(PredVisError::Config("link.baud_rate must be non-zero".to_string()));
        }
        if self.link.event_capacity == 0 {
            return Err(PredVisError::Config(
                "link.event_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
