//! Configuration types and loading
//!
//! Settings come from a YAML file (explicit path, project-local, or user
//! config, in that order), then environment variables override the file, and
//! CLI flags override everything.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;

/// Default TCP port the coordinator listens on.
pub const DEFAULT_PORT: u16 = 53646;

/// Log verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse the original `AGENT_FARM_LOG_LEVEL` spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Coordinator server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host the coordinator listens on
    #[serde(rename = "listen-host")]
    pub listen_host: String,

    /// TCP port the coordinator listens on
    #[serde(rename = "listen-port")]
    pub listen_port: u16,

    /// Log verbosity
    #[serde(rename = "log-level")]
    pub log_level: LogLevel,

    /// Advisory reconnect delay handed to clients, in seconds
    #[serde(rename = "reconnect-hint-secs")]
    pub reconnect_hint_secs: u64,

    /// Coordinator tuning
    pub coordinator: CoordinatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "localhost".to_string(),
            listen_port: DEFAULT_PORT,
            log_level: LogLevel::Info,
            reconnect_hint_secs: 30,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with the fallback chain, then apply environment
    /// overrides.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If an explicit config path is provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .agentfarm.yml
        let local_config = PathBuf::from(".agentfarm.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/agentfarm/agentfarm.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentfarm").join("agentfarm.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!(
                            "Failed to load config from {}: {}",
                            user_config.display(),
                            e
                        );
                    }
                }
            }
        }

        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `AGENT_FARM_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("AGENT_FARM_PORT") {
            match port.parse() {
                Ok(port) => self.listen_port = port,
                Err(_) => tracing::warn!("Invalid AGENT_FARM_PORT: {port}, keeping {}", self.listen_port),
            }
        }
        if let Ok(host) = std::env::var("AGENT_FARM_HOST")
            && !host.is_empty()
        {
            self.listen_host = host;
        }
        if let Ok(level) = std::env::var("AGENT_FARM_LOG_LEVEL") {
            match LogLevel::parse(&level) {
                Some(level) => self.log_level = level,
                None => tracing::warn!("Invalid AGENT_FARM_LOG_LEVEL: {level}, keeping current"),
            }
        }
        if let Ok(hint) = std::env::var("AGENT_FARM_RECONNECT_HINT") {
            match hint.parse() {
                Ok(secs) => self.reconnect_hint_secs = secs,
                Err(_) => tracing::warn!("Invalid AGENT_FARM_RECONNECT_HINT: {hint}, keeping current"),
            }
        }
    }

    /// Full listen address, `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            bail!("invalid listen port: 0 (must be 1-65535)");
        }
        if self.listen_host.is_empty() {
            bail!("listen host cannot be empty");
        }
        if self.reconnect_hint_secs == 0 {
            bail!("reconnect hint must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_host, "localhost");
        assert_eq!(config.listen_port, 53646);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.reconnect_hint_secs, 30);
        assert_eq!(config.address(), "localhost:53646");
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
listen-host: 0.0.0.0
listen-port: 8080
log-level: DEBUG
reconnect-hint-secs: 5

coordinator:
  channel-buffer: 64
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.coordinator.channel_buffer, 64);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = "listen-port: 9000\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.listen_host, "localhost");
        assert_eq!(config.coordinator.peer_channel_buffer, 32);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("farm.yml");
        fs::write(&path, "listen-port: 4444\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.listen_port, 4444);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/agentfarm.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let config = Config {
            listen_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = Config {
            listen_host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
    }
}
