//! Configuration surface.
//!
//! Layered loader: compiled-in defaults, then an optional TOML file, then
//! `ENGINE_`-prefixed environment variable overrides — same precedence
//! order and `config`-crate usage as the reference codebase's loader.

use std::path::Path;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub providers: ProvidersConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            providers: ProvidersConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_pending_per_user: usize,
    pub duplicate_threshold_queue_len: usize,
    pub fairness_mode: FairnessMode,
    pub idle_detach_seconds: u64,
    pub max_track_duration_seconds: u64,
    pub max_queue_length: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending_per_user: 1,
            duplicate_threshold_queue_len: 5,
            fairness_mode: FairnessMode::Strict,
            idle_detach_seconds: 300,
            max_track_duration_seconds: 3600,
            max_queue_length: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FairnessMode {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub youtube_enabled: bool,
    pub bilibili_enabled: bool,
    pub netease_enabled: bool,
    pub soundcloud_enabled: bool,
    pub catbox_enabled: bool,
    pub generic_enabled: bool,
    pub netease: NeteaseConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            youtube_enabled: true,
            bilibili_enabled: true,
            netease_enabled: true,
            soundcloud_enabled: true,
            catbox_enabled: true,
            generic_enabled: true,
            netease: NeteaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NeteaseConfig {
    /// Host/protocol overrides for domain substitution when the default
    /// `music.163.com` endpoints are unreachable from the deployment.
    pub proxy_host: Option<String>,
    pub proxy_protocol: Option<String>,
    /// Opaque membership cookie used to unlock premium catalog tracks.
    pub member_cookie: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub data_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, config::FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build()?;
        let config: Self = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_pending_per_user == 0 {
            return Err(ConfigError::Message(
                "queue.max_pending_per_user must be at least 1".to_string(),
            ));
        }
        if self.queue.max_queue_length == 0 {
            return Err(ConfigError::Message(
                "queue.max_queue_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.queue.max_pending_per_user, 1);
        assert_eq!(cfg.queue.duplicate_threshold_queue_len, 5);
        assert_eq!(cfg.queue.fairness_mode, FairnessMode::Strict);
        assert_eq!(cfg.queue.idle_detach_seconds, 300);
        assert_eq!(cfg.queue.max_track_duration_seconds, 3600);
        assert_eq!(cfg.queue.max_queue_length, 100);
    }

    #[test]
    fn rejects_zero_pending_cap() {
        let mut cfg = Config::default();
        cfg.queue.max_pending_per_user = 0;
        assert!(cfg.validate().is_err());
    }
}
