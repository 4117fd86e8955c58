//! On-disk configuration (TOML), layered under CLI flags (§6 "persisted
//! state: none" — this file only seeds defaults; nothing is written
//! back at runtime).

use crate::stream_config::UserMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Read-only status endpoint port (§7); independent of the
    /// protocol listener.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub background: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: default_port(),
                http_port: default_http_port(),
                mode: default_mode(),
                background: false,
            },
            audio: AudioConfig { enabled: true, sample_rate: default_sample_rate(), channels: default_channels() },
            logging: LoggingConfig { level: default_log_level() },
        }
    }
}

impl Config {
    /// Load from `path`; a missing file is not an error, it yields
    /// defaults (there is no persisted state requirement, §6).
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if UserMode::parse(&capitalize(&self.server.mode)).is_none() {
            return Err(format!("unknown mode {:?}", self.server.mode).into());
        }
        if self.audio.channels == 0 || self.audio.channels > 2 {
            return Err("audio channels must be 1 or 2".into());
        }
        if self.audio.sample_rate == 0 {
            return Err("audio sample rate must be non-zero".into());
        }
        Ok(())
    }

    pub fn user_mode(&self) -> UserMode {
        UserMode::parse(&capitalize(&self.server.mode)).unwrap_or(UserMode::Balanced)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn default_port() -> u16 {
    8080
}

fn default_http_port() -> u16 {
    8081
}

fn default_mode() -> String {
    "balanced".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn unknown_mode_fails_validation() {
        let mut cfg = Config::default();
        cfg.server.mode = "turbo".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(&PathBuf::from("/nonexistent/macmirror.toml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }
}
