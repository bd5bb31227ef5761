// src/config.rs
//! Configuration management with a JSON file under the user's config directory

use crate::error::{GpsError, Result};
use crate::gps::reader::DEFAULT_MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub staleness_threshold_ms: u64,
    pub gsv_timeout_ms: u64,
    pub refresh_interval_ms: u64,
    pub max_line_length: usize,
    pub channel_capacity: usize,
    pub web_port: u16,
    pub raw_history: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_ms: 5_000,
            gsv_timeout_ms: 2_000,
            refresh_interval_ms: 1_000,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            channel_capacity: 1024,
            web_port: 8080,
            raw_history: 5,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the default location, falling back to defaults
    /// when no file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Load from an explicit path; a missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GpsError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            GpsError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GpsError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| GpsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// `$HOME/.config/nmea-monitor/config.json` (`%USERPROFILE%` on Windows)
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| GpsError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("nmea-monitor")
            .join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_line_length < 16 {
            return Err(GpsError::Config(format!(
                "max_line_length {} is too small for any NMEA sentence",
                self.max_line_length
            )));
        }
        if self.channel_capacity == 0 {
            return Err(GpsError::Config("channel_capacity must be at least 1".to_string()));
        }
        if self.refresh_interval_ms == 0 || self.gsv_timeout_ms == 0 {
            return Err(GpsError::Config(
                "refresh_interval_ms and gsv_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    pub fn gsv_timeout(&self) -> Duration {
        Duration::from_millis(self.gsv_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Unchanged values are republished this often so they never look stale.
    pub fn freshness_refresh(&self) -> Duration {
        self.staleness_threshold() / 2
    }

    pub fn update_staleness(&mut self, threshold: Duration) {
        self.staleness_threshold_ms = duration_ms(threshold);
    }

    pub fn update_gsv_timeout(&mut self, timeout: Duration) {
        self.gsv_timeout_ms = duration_ms(timeout);
    }

    pub fn update_refresh(&mut self, interval: Duration) {
        self.refresh_interval_ms = duration_ms(interval);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.staleness_threshold(), Duration::from_secs(5));
        assert_eq!(config.gsv_timeout(), Duration::from_secs(2));
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.freshness_refresh(), Duration::from_millis(2500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = MonitorConfig::default();
        config.update_staleness(Duration::from_secs(10));
        config.web_port = 9090;
        config.save_to(&path).unwrap();

        let loaded = MonitorConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "gsv_timeout_ms": 500 }"#).unwrap();

        let loaded = MonitorConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gsv_timeout(), Duration::from_millis(500));
        assert_eq!(loaded.web_port, 8080);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(
            MonitorConfig::load_from(&path),
            Err(GpsError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = MonitorConfig {
            channel_capacity: 0,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
