//! Configuration management for waylink.
//!
//! Uses figment to merge configuration from multiple sources:
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables (`WAYLINK_`, nested keys split on `__`)
//! 4. Command-line arguments

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use waylink_client::ConnectionConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How to reach the display server
    #[serde(default)]
    pub connection: ConnectionConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        } else if let Some(path) = default_config_path().filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("WAYLINK_").split("__"))
            .extract()
    }

    /// Override log level from CLI
    pub fn with_log_level(mut self, log_level: Option<String>) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        self
    }

    /// Override the display name from CLI
    pub fn with_display(mut self, display: Option<String>) -> Self {
        self.connection = self.connection.with_display(display);
        self
    }

    /// Override the socket path from CLI
    pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
        self.connection = self.connection.with_socket(socket);
        self
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("waylink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                log_level = "debug"

                [connection]
                display = "wayland-5"
                recv_chunk_size = 1024
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.connection.display.as_deref(), Some("wayland-5"));
        assert_eq!(config.connection.recv_chunk_size, 1024);
        assert!(config.connection.socket.is_none());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let path = std::env::temp_dir().join("waylink-no-such-config.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.connection.recv_chunk_size, 4096);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_log_level(Some("trace".to_string()))
            .with_display(Some("wayland-9".to_string()))
            .with_socket(None);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.connection.display.as_deref(), Some("wayland-9"));
        assert!(config.connection.socket.is_none());
    }
}
