//! TOML-based configuration for the agent.
//!
//! Reads and writes [`AgentConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\PairLink\config.toml`
//! - Linux:    `~/.config/pairlink/config.toml`
//! - macOS:    `~/Library/Application Support/PairLink/config.toml`
//!
//! A full config file looks like this:
//!
//! ```toml
//! [agent]
//! log_level = "info"
//!
//! [gateway]
//! url = "ws://127.0.0.1:7447/link"
//! handshake_timeout_secs = 15
//!
//! [login]
//! code_timeout_ms = 30000
//! completion_timeout_ms = 120000
//! ```
//!
//! # Serde default values
//!
//! Every field carries a `#[serde(default = "some_fn")]` fallback and every
//! section is itself `#[serde(default)]`, so a missing file, an empty file,
//! and a file written by an older agent version all load cleanly. First run
//! therefore needs no `init` step: [`load_config`] simply returns
//! [`AgentConfig::default()`] when no file exists yet.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pairlink_core::domain::linking::{CODE_WAIT_DEFAULT_MS, COMPLETION_WAIT_DEFAULT_MS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level agent configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub login: LoginSection,
}

/// General agent behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// `tracing` log level used when `RUST_LOG` is unset: `"error"`,
    /// `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Link gateway endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    /// WebSocket URL of the link gateway.
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Budget for the TCP connect plus WebSocket upgrade, in seconds.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl GatewaySection {
    /// The handshake budget as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Default wait budgets for the two linking operations.
///
/// CLI flags override these per invocation; the floors enforced by
/// `pairlink-core` still apply underneath.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginSection {
    /// How long to wait for the gateway to issue a linking code, in ms.
    #[serde(default = "default_code_timeout_ms")]
    pub code_timeout_ms: u64,
    /// How long one completion poll waits before reporting back, in ms.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_gateway_url() -> String {
    "ws://127.0.0.1:7447/link".to_string()
}
fn default_handshake_timeout_secs() -> u64 {
    15
}
fn default_code_timeout_ms() -> u64 {
    CODE_WAIT_DEFAULT_MS
}
fn default_completion_timeout_ms() -> u64 {
    COMPLETION_WAIT_DEFAULT_MS
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            code_timeout_ms: default_code_timeout_ms(),
            completion_timeout_ms: default_completion_timeout_ms(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AgentConfig`] from the platform-default path, returning
/// `AgentConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AgentConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`AgentConfig`] from an explicit path (the `--config` override).
///
/// A missing file yields `AgentConfig::default()` just like the default
/// location does.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AgentConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AgentConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AgentConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform-default path.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AgentConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Persists `config` to an explicit path, creating parent directories as
/// needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AgentConfig) -> Result<(), ConfigError> {
    // Ensure directory exists before writing.
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `PairLink`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PairLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("pairlink"))
    }

    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/PairLink
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PairLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        // Fallback for unsupported platforms.
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
