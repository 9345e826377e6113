// Configuration management for the dglab-relay CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/dglab-relay/config.json
// - Linux: ~/.config/dglab-relay/config.json
// - Windows: %APPDATA%\dglab-relay\config.json

use anyhow::{Context, Result};
use dglab_relay_core::RelayServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface the hub listens on
    pub host: String,

    /// Port the hub listens on
    pub port: u16,

    /// Seconds between heartbeat rounds (0 = no heartbeats)
    pub heartbeat_interval_secs: u64,

    /// Inbound queue capacity of local terminals
    pub local_queue_capacity: usize,

    /// Longest MESSAGE body relayed (0 = no limit)
    pub max_message_length: usize,

    /// Address apps should dial, used in QR payloads
    pub public_uri: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let server = RelayServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
            heartbeat_interval_secs: server
                .heartbeat_interval
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            local_queue_capacity: server.local_queue_capacity,
            max_message_length: server.max_message_length.unwrap_or_default(),
            public_uri: None,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("dglab-relay");

        std::fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, creating a default file if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "host" => {
                anyhow::ensure!(!value.is_empty(), "Host must not be empty");
                self.host = value.to_string();
            }
            "port" => {
                self.port = value.parse()
                    .context("Invalid port number")?;
            }
            "heartbeat_interval_secs" => {
                self.heartbeat_interval_secs = value.parse()
                    .context("Invalid number of seconds")?;
            }
            "local_queue_capacity" => {
                let capacity: usize = value.parse()
                    .context("Invalid number")?;
                anyhow::ensure!(capacity > 0, "Queue capacity must be at least 1");
                self.local_queue_capacity = capacity;
            }
            "max_message_length" => {
                self.max_message_length = value.parse()
                    .context("Invalid number")?;
            }
            "public_uri" => {
                self.public_uri = if value.is_empty() {
                    None
                } else {
                    Some(value.trim_end_matches('/').to_string())
                };
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "host" => Some(self.host.clone()),
            "port" => Some(self.port.to_string()),
            "heartbeat_interval_secs" => Some(self.heartbeat_interval_secs.to_string()),
            "local_queue_capacity" => Some(self.local_queue_capacity.to_string()),
            "max_message_length" => Some(self.max_message_length.to_string()),
            "public_uri" => self.public_uri.clone(),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let heartbeat = match self.heartbeat_interval_secs {
            0 => "(disabled)".to_string(),
            secs => format!("{}s", secs),
        };
        let max_message_length = match self.max_message_length {
            0 => "(unlimited)".to_string(),
            len => len.to_string(),
        };
        vec![
            ("host".to_string(), self.host.clone()),
            ("port".to_string(), self.port.to_string()),
            ("heartbeat_interval_secs".to_string(), heartbeat),
            ("local_queue_capacity".to_string(), self.local_queue_capacity.to_string()),
            ("max_message_length".to_string(), max_message_length),
            ("public_uri".to_string(), self.public_uri.clone().unwrap_or_else(|| "(listener)".to_string())),
        ]
    }

    /// Hub settings derived from this file
    pub fn server_config(&self) -> RelayServerConfig {
        RelayServerConfig {
            host: self.host.clone(),
            port: self.port,
            heartbeat_interval: match self.heartbeat_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            local_queue_capacity: self.local_queue_capacity,
            max_message_length: match self.max_message_length {
                0 => None,
                len => Some(len),
            },
        }
    }
}
