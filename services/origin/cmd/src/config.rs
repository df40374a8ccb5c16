//! Configuration handling for the Origin client.
//!
//! Settings come from a YAML file, then environment variables, then command
//! line flags, each layer overriding the previous one.

use anyhow::Result;
use origin_session::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Origin client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Controller host, optionally with port
    pub host: String,
    /// Default command timeout (seconds)
    pub command_timeout_secs: f64,
    /// Verification timeout during connect (seconds)
    pub verify_timeout_secs: f64,
    /// Heartbeat interval (seconds)
    pub heartbeat_interval_secs: f64,
    /// Heartbeat reply timeout (seconds)
    pub heartbeat_timeout_secs: f64,
    /// Reconnect backoff base (seconds)
    pub backoff_base_secs: f64,
    /// Reconnect backoff ceiling (seconds)
    pub backoff_max_secs: f64,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Reconnect automatically after a loss
    pub auto_reconnect: bool,
    /// Where downloaded captures are stored
    pub observations_dir: Option<PathBuf>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.10".to_string(),
            command_timeout_secs: 10.0,
            verify_timeout_secs: 10.0,
            heartbeat_interval_secs: 5.0,
            heartbeat_timeout_secs: 5.0,
            backoff_base_secs: 1.0,
            backoff_max_secs: 30.0,
            max_reconnect_attempts: 10,
            auto_reconnect: true,
            observations_dir: None,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    origin: Option<ScopeConfig>,
}

fn secs(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(fallback)
}

impl ScopeConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    info!("Loaded configuration from {:?}", config_path);
                    root.origin.unwrap_or_default()
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path, e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path);
                Self::default()
            }
        };

        config.apply_environment_overrides();

        info!(
            "Final configuration: host={}, command_timeout={}s, heartbeat={}s, max_reconnect_attempts={}",
            config.host,
            config.command_timeout_secs,
            config.heartbeat_interval_secs,
            config.max_reconnect_attempts
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("ORIGIN_HOST") {
            info!("Host overridden by environment: {}", host);
            self.host = host;
        }

        if let Some(value) = lookup("ORIGIN_COMMAND_TIMEOUT_SECS") {
            if let Ok(timeout) = value.parse::<f64>() {
                self.command_timeout_secs = timeout;
                info!("Command timeout overridden by environment: {}s", timeout);
            }
        }

        if let Some(value) = lookup("ORIGIN_HEARTBEAT_INTERVAL_SECS") {
            if let Ok(interval) = value.parse::<f64>() {
                self.heartbeat_interval_secs = interval;
                info!("Heartbeat interval overridden by environment: {}s", interval);
            }
        }

        if let Some(value) = lookup("ORIGIN_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = value.parse::<u32>() {
                self.max_reconnect_attempts = attempts;
                info!("Max reconnect attempts overridden by environment: {}", attempts);
            }
        }
    }

    /// Build the session configuration
    pub fn to_client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            command_timeout: secs(self.command_timeout_secs, defaults.command_timeout),
            verify_timeout: secs(self.verify_timeout_secs, defaults.verify_timeout),
            heartbeat_interval: secs(self.heartbeat_interval_secs, defaults.heartbeat_interval),
            heartbeat_timeout: secs(self.heartbeat_timeout_secs, defaults.heartbeat_timeout),
            backoff_base: secs(self.backoff_base_secs, defaults.backoff_base),
            backoff_max: secs(self.backoff_max_secs, defaults.backoff_max),
            max_reconnect_attempts: self.max_reconnect_attempts,
            auto_reconnect: self.auto_reconnect,
            ..ClientConfig::for_host(&self.host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ScopeConfig::default();
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(config.auto_reconnect);

        let client = config.to_client_config();
        assert_eq!(client.command_timeout, Duration::from_secs(10));
        assert_eq!(client.backoff_max, Duration::from_secs(30));
        assert_eq!(
            client.url,
            "ws://192.168.1.10/SmartScope-1.0/mountControlEndpoint"
        );
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
origin:
  host: "10.1.2.3:8080"
  heartbeat_interval_secs: 2.5
  max_reconnect_attempts: 4
  observations_dir: /tmp/observations
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = ScopeConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.heartbeat_interval_secs, 2.5);
        assert_eq!(config.command_timeout_secs, 10.0);
        assert_eq!(
            config.observations_dir.as_deref(),
            Some(Path::new("/tmp/observations"))
        );

        let client = config.to_client_config();
        assert_eq!(client.heartbeat_interval, Duration::from_millis(2500));
        assert!(client.url.starts_with("ws://"));
    }

    #[test]
    fn test_unparseable_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"origin: [not, a, map").unwrap();

        let config = ScopeConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.verify_timeout_secs, 10.0);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("ORIGIN_HOST", "scope.local"),
            ("ORIGIN_COMMAND_TIMEOUT_SECS", "3"),
            ("ORIGIN_MAX_RECONNECT_ATTEMPTS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ScopeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.host, "scope.local");
        assert_eq!(config.command_timeout_secs, 3.0);
        assert_eq!(config.max_reconnect_attempts, 10);
    }
}
