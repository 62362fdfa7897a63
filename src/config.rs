//! Configuration for path monitors.
//!
//! Layered the usual way:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PATHMON_` and use double
//! underscores to separate nested levels:
//! - `PATHMON_MONITOR__QUIESCENCE_MS=250` sets `monitor.quiescence_ms`
//! - `PATHMON_MONITOR__STRICT_START=true` sets `monitor.strict_start`
//! - `PATHMON_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    /// Path monitor behaviour
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Quiet period (ms) that ends a batch
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,

    /// Fail a second `start()` with `AlreadyRunning` instead of ignoring it
    #[serde(default = "default_false")]
    pub strict_start: bool,

    /// Report changes below the direct children of each root
    #[serde(default = "default_true")]
    pub include_nested: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level for everything not listed in `modules`
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `pathmon::monitor = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_quiescence_ms() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            strict_start: false,
            include_nested: true,
        }
    }
}

impl MonitorConfig {
    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// Reads `pathmon.toml` from the current directory when present.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific file, then apply env overrides.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name.
            .merge(Env::prefixed("PATHMON_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Default location used by `load`.
    pub fn default_path() -> PathBuf {
        PathBuf::from("pathmon.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.monitor.quiescence_ms, 100);
        assert_eq!(
            settings.monitor.quiescence_window(),
            Duration::from_millis(100)
        );
        assert!(!settings.monitor.strict_start);
        assert!(settings.monitor.include_nested);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("pathmon.toml");

        let toml_content = r#"
[monitor]
quiescence_ms = 50
strict_start = true
include_nested = false

[logging]
default = "info"

[logging.modules]
"pathmon::monitor" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.monitor.quiescence_ms, 50);
        assert!(settings.monitor.strict_start);
        assert!(!settings.monitor.include_nested);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["pathmon::monitor"], "debug");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("pathmon.toml");

        // Only specify one setting
        fs::write(&config_path, "[monitor]\nquiescence_ms = 500\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified value
        assert_eq!(settings.monitor.quiescence_ms, 500);

        // Default values should still be present
        assert!(settings.monitor.include_nested);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_saved_default_path_round_trips_through_load_from() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(Settings::default_path());
        assert!(config_path.ends_with("pathmon.toml"));

        let mut settings = Settings::default();
        settings.monitor.strict_start = true;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert!(loaded.monitor.strict_start);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("pathmon.toml");

        let mut settings = Settings::default();
        settings.monitor.quiescence_ms = 75;
        settings.monitor.strict_start = true;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.monitor.quiescence_ms, 75);
        assert!(loaded.monitor.strict_start);
    }
}
