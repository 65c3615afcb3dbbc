//! Daemon configuration, read from `<home>/config.json`.
//!
//! Every field is optional in the file; missing ones take the defaults
//! below. A missing file is the same as `{}`.

use std::path::Path;
use std::time::Duration;

use eyre::WrapErr;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial `EnvFilter` directive; `RUST_LOG` wins when set
    pub log_filter: String,
    pub discovery_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    /// Default `limit` for message history reads
    pub history_limit: usize,
    pub discovery_cache_size: usize,
    pub max_frame_length: usize,
    /// Topic used by `announce_file` when none is given
    pub file_announce_topic: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            discovery_timeout_ms: 10_000,
            ping_timeout_ms: 5_000,
            history_limit: 50,
            discovery_cache_size: crate::registry::DEFAULT_DISCOVERY_CACHE_SIZE,
            max_frame_length: meshctl_net::framing::DEFAULT_MAX_FRAME_LENGTH,
            file_announce_topic: "meshctl/files".to_string(),
        }
    }
}

impl Config {
    #[tracing::instrument]
    pub fn load(home: &Path) -> eyre::Result<Self> {
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        eyre::ensure!(config.max_frame_length > 0, "max_frame_length must be positive");
        Ok(config)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"history_limit": 10, "file_announce_topic": "files"}"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.file_announce_topic, "files");
        assert_eq!(config.ping_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
