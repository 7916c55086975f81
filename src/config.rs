//! Client configuration
//!
//! Connection settings and timeout defaults, stored as JSON. The file location
//! follows the usual override chain:
//! 1) `RTE_CLIENT_CONFIG` env var
//! 2) the platform config dir, e.g. `~/.config/rte-client/config.json`
//! 3) `./rte-client.json`

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{Protocol, SecurityMode, TerminalType};

pub const CONFIG_ENV_VAR: &str = "RTE_CLIENT_CONFIG";

pub const DEFAULT_CONNECT_TIMEOUT_MILLIS: u64 = 60_000;
pub const DEFAULT_STABLE_TIMEOUT_MILLIS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// TERMINAL-TYPE id; the protocol's default model when absent
    pub terminal_type: Option<String>,
    pub security: SecurityMode,
    /// Extra trusted CA certificates (PEM or DER) for TLS sessions
    pub ca_bundle: Option<PathBuf>,
    /// Bounds the TCP connect and the wait for the first usable screen
    pub connect_timeout_millis: u64,
    pub stable_timeout_millis: u64,
    /// Default overall timeout for waits built from this config
    pub wait_timeout_millis: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 23,
            protocol: Protocol::Tn5250,
            terminal_type: None,
            security: SecurityMode::None,
            ca_bundle: None,
            connect_timeout_millis: DEFAULT_CONNECT_TIMEOUT_MILLIS,
            stable_timeout_millis: DEFAULT_STABLE_TIMEOUT_MILLIS,
            wait_timeout_millis: DEFAULT_CONNECT_TIMEOUT_MILLIS,
        }
    }
}

impl ClientConfig {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
            ..Self::default()
        }
    }

    /// The configured terminal model, checked against the protocol
    pub fn resolve_terminal_type(&self) -> Result<TerminalType, ConfigError> {
        match &self.terminal_type {
            None => Ok(self.protocol.default_terminal_type()),
            Some(id) => self
                .protocol
                .terminal_type_by_id(id)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "terminal_type".to_string(),
                    value: id.clone(),
                }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
        };
        if self.host.trim().is_empty() {
            return invalid("host", self.host.clone());
        }
        if self.port == 0 {
            return invalid("port", self.port.to_string());
        }
        if self.connect_timeout_millis == 0 {
            return invalid("connect_timeout_millis", "0".to_string());
        }
        if self.wait_timeout_millis == 0 {
            return invalid("wait_timeout_millis", "0".to_string());
        }
        self.resolve_terminal_type().map(|_| ())
    }
}

/// Where the configuration lives when no path is given
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    match dirs::config_dir() {
        Some(dir) => dir.join("rte-client").join("config.json"),
        None => PathBuf::from("rte-client.json"),
    }
}

pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let display = path.display().to_string();
    let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let config: ClientConfig = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
        path: display.clone(),
        message: e.to_string(),
    })?;
    config.validate()?;
    debug!("Loaded configuration from {}", display);
    Ok(config)
}

/// Configuration at the default path, or defaults when there is none or it
/// cannot be used
pub fn load_default_config() -> ClientConfig {
    let path = default_config_path();
    if !path.exists() {
        return ClientConfig::default();
    }
    match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring configuration file: {}", e);
            ClientConfig::default()
        }
    }
}

pub fn save_config(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }
    let json = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    fs::write(path, json).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout_millis, 60_000);
        assert_eq!(config.stable_timeout_millis, 1_000);
        assert_eq!(config.resolve_terminal_type().unwrap().id, "IBM-3179-2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = ClientConfig::new(Protocol::Tn3270, "mainframe.example.com", 992);
        config.security = SecurityMode::Tls;
        config.terminal_type = Some("IBM-3278-5".to_string());

        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "host": "as400.local", "terminal_type": "IBM-3477-FC" }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.host, "as400.local");
        assert_eq!(config.port, 23);
        assert_eq!(config.resolve_terminal_type().unwrap().alternate_columns, 132);
    }

    #[test]
    fn test_unknown_terminal_type_rejected() {
        let mut config = ClientConfig::default();
        config.terminal_type = Some("IBM-3278-2".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "terminal_type"
        ));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_config(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load_config(&broken), Err(ConfigError::Parse { .. })));

        let zero_port = dir.path().join("zero.json");
        fs::write(&zero_port, r#"{ "port": 0 }"#).unwrap();
        assert!(matches!(load_config(&zero_port), Err(ConfigError::InvalidValue { .. })));
    }
}
