//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via AMC_CONFIG or --config)
//! 3. Environment variables

use crate::transport::TransportConfig;
use amc_protocol::{DEFAULT_DATAGRAM_PORT, DEFAULT_STREAM_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// OSC address of the project, e.g. `/MyProject`. Prefixed to custom
    /// message addresses and sent as the project name.
    pub base_address: String,
    /// Host name or IP address of the Asset Manager.
    pub host: String,
    /// TCP destination port.
    pub stream_port: u16,
    /// UDP destination port.
    pub datagram_port: u16,
    /// Transport used for the built-in control messages.
    pub core_transport: CoreTransport,
    /// Timeout for each TCP connection attempt, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Behaviour when the client is closed or dropped.
    pub on_close: CloseConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_address: String::new(),
            host: "127.0.0.1".to_string(),
            stream_port: DEFAULT_STREAM_PORT,
            datagram_port: DEFAULT_DATAGRAM_PORT,
            core_transport: CoreTransport::Stream,
            connect_timeout_ms: 5000,
            on_close: CloseConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `base_address` on `host` with default
    /// ports.
    pub fn new(base_address: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            base_address: base_address.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from `path` (or AMC_CONFIG if `path` is `None`),
    /// then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("AMC_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides looked up by variable name.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("AMC_HOST") {
            self.host = host;
        }
        if let Some(base) = lookup("AMC_BASE_ADDRESS") {
            self.base_address = base;
        }
        if let Some(port) = lookup("AMC_STREAM_PORT") {
            if let Ok(port) = port.parse() {
                self.stream_port = port;
            }
        }
        if let Some(port) = lookup("AMC_DATAGRAM_PORT") {
            if let Ok(port) = port.parse() {
                self.datagram_port = port;
            }
        }
        if let Some(protocol) = lookup("AMC_PROTOCOL") {
            if let Ok(transport) = protocol.parse() {
                self.core_transport = transport;
            }
        }
        if let Some(unload) = lookup("AMC_UNLOAD_ON_CLOSE") {
            self.on_close.unload = unload == "1" || unload.to_lowercase() == "true";
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_address.is_empty() && !self.base_address.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "base address '{}' must start with '/'",
                self.base_address
            )));
        }
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host is empty".to_string()));
        }
        if self.stream_port == 0 || self.datagram_port == 0 {
            return Err(ConfigError::Validation(
                "ports must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the connection timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Settings for the TCP transport.
    pub fn stream_transport(&self) -> TransportConfig {
        self.transport_config(self.stream_port)
    }

    /// Settings for the UDP transport.
    pub fn datagram_transport(&self) -> TransportConfig {
        self.transport_config(self.datagram_port)
    }

    fn transport_config(&self, port: u16) -> TransportConfig {
        TransportConfig::new(self.host.clone(), port)
            .with_connect_timeout(self.connect_timeout())
            .with_close_policy(self.on_close.policy)
            .with_drain_timeout(self.on_close.drain_timeout())
    }
}

/// Transport carrying the built-in control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreTransport {
    #[default]
    #[serde(alias = "tcp")]
    Stream,
    #[serde(alias = "udp")]
    Datagram,
}

impl FromStr for CoreTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" | "stream" => Ok(CoreTransport::Stream),
            "udp" | "datagram" => Ok(CoreTransport::Datagram),
            other => Err(ConfigError::Validation(format!(
                "unrecognized protocol: {}",
                other
            ))),
        }
    }
}

/// What happens to queued messages when a transport goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Wait (bounded) for queued messages before closing.
    #[default]
    DrainFirst,
    /// Close at once, discarding queued messages.
    CloseImmediately,
}

/// Close behaviour of the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseConfig {
    /// Send `/AM/Unload` for the project before closing.
    pub unload: bool,
    /// Whether to drain before closing.
    pub policy: ClosePolicy,
    /// Bound on the drain, in milliseconds.
    pub drain_timeout_ms: u64,
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            unload: false,
            policy: ClosePolicy::DrainFirst,
            drain_timeout_ms: 5000,
        }
    }
}

impl CloseConfig {
    /// Returns the drain bound as Duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.stream_port, 15002);
        assert_eq!(config.datagram_port, 15003);
        assert_eq!(config.core_transport, CoreTransport::Stream);
        assert!(!config.on_close.unload);
        assert_eq!(config.on_close.policy, ClosePolicy::DrainFirst);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transport_configs() {
        let mut config = ClientConfig::new("/Proj", "localhost");
        config.on_close.policy = ClosePolicy::CloseImmediately;
        config.connect_timeout_ms = 100;

        let stream = config.stream_transport();
        assert_eq!(stream.host, "localhost");
        assert_eq!(stream.port, DEFAULT_STREAM_PORT);
        assert_eq!(stream.connect_timeout, Duration::from_millis(100));
        assert_eq!(stream.close_policy, ClosePolicy::CloseImmediately);

        assert_eq!(config.datagram_transport().port, DEFAULT_DATAGRAM_PORT);
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "base_address: /Show\nhost: 10.0.0.5\ncore_transport: udp\non_close:\n  unload: true\n  policy: close_immediately"
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_address, "/Show");
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.core_transport, CoreTransport::Datagram);
        assert!(config.on_close.unload);
        assert_eq!(config.on_close.policy, ClosePolicy::CloseImmediately);
        // Unset fields keep their defaults.
        assert_eq!(config.stream_port, DEFAULT_STREAM_PORT);
        assert_eq!(config.on_close.drain_timeout_ms, 5000);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amc.yaml");

        let mut config = ClientConfig::new("/Roundtrip", "example.com");
        config.datagram_port = 9000;
        config.save(&path).unwrap();

        assert_eq!(ClientConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_address: /Loaded\ndatagram_port: 9100").unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        if std::env::var("AMC_BASE_ADDRESS").is_err() {
            assert_eq!(config.base_address, "/Loaded");
        }
        if std::env::var("AMC_DATAGRAM_PORT").is_err() {
            assert_eq!(config.datagram_port, 9100);
        }

        let missing = ClientConfig::load(Some(Path::new("/nonexistent/amc.yaml")));
        assert!(matches!(missing, Err(ConfigError::Io(..))));
    }

    #[test]
    fn test_file_errors() {
        let err = ClientConfig::from_file("/nonexistent/amc.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stream_port: not-a-number").unwrap();
        let err = ClientConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_overrides() {
        let mut config = ClientConfig::default();
        config.apply_overrides(lookup(&[
            ("AMC_HOST", "192.168.1.20"),
            ("AMC_BASE_ADDRESS", "/Env"),
            ("AMC_STREAM_PORT", "7000"),
            ("AMC_DATAGRAM_PORT", "bogus"),
            ("AMC_PROTOCOL", "UDP"),
            ("AMC_UNLOAD_ON_CLOSE", "1"),
        ]));

        assert_eq!(config.host, "192.168.1.20");
        assert_eq!(config.base_address, "/Env");
        assert_eq!(config.stream_port, 7000);
        assert_eq!(config.datagram_port, DEFAULT_DATAGRAM_PORT);
        assert_eq!(config.core_transport, CoreTransport::Datagram);
        assert!(config.on_close.unload);
    }

    #[test]
    fn test_validation() {
        assert!(ClientConfig::new("", "localhost").validate().is_ok());
        assert!(ClientConfig::new("/a/b", "localhost").validate().is_ok());

        let err = ClientConfig::new("NoSlash", "localhost")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));

        assert!(ClientConfig::new("/a", "").validate().is_err());

        let mut config = ClientConfig::default();
        config.stream_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_core_transport_from_str() {
        assert_eq!("tcp".parse::<CoreTransport>().unwrap(), CoreTransport::Stream);
        assert_eq!("TCP".parse::<CoreTransport>().unwrap(), CoreTransport::Stream);
        assert_eq!("udp".parse::<CoreTransport>().unwrap(), CoreTransport::Datagram);
        assert!("sctp".parse::<CoreTransport>().is_err());
    }
}
