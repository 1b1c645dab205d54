//! Configuration file support for Lift.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/lift/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub plans: PlansConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    /// Location of the workout log inside a data directory
    pub fn log_path(data_dir: &Path) -> PathBuf {
        data_dir.join("log").join("workouts.jsonl")
    }

    /// Default CSV export target inside a data directory
    pub fn csv_path(data_dir: &Path) -> PathBuf {
        data_dir.join("workouts.csv")
    }
}

/// Live session parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between timer ticks; the rest countdown drops one second per tick
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Seconds added by a bare "extend rest" request
    #[serde(default = "default_rest_extension_seconds")]
    pub rest_extension_seconds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            rest_extension_seconds: default_rest_extension_seconds(),
        }
    }
}

/// Streak and progress reporting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Bucket sessions into local calendar days instead of UTC days
    #[serde(default = "default_use_local_time")]
    pub use_local_time: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            use_local_time: default_use_local_time(),
        }
    }
}

/// Extra plan sources
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PlansConfig {
    #[serde(default)]
    pub extra_dirs: Vec<PathBuf>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("lift")
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_rest_extension_seconds() -> u32 {
    30
}

fn default_use_local_time() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the session runner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.session.tick_millis == 0 {
            return Err(Error::Config("session.tick_millis must be positive".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("lift").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Tick interval as a std duration for the timer source
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.session.tick_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.tick_millis, 1000);
        assert_eq!(config.session.rest_extension_seconds, 30);
        assert!(config.analytics.use_local_time);
        assert!(config.plans.extra_dirs.is_empty());
        assert!(config.data.data_dir.ends_with("lift"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[session]
rest_extension_seconds = 15
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.rest_extension_seconds, 15);
        assert_eq!(config.session.tick_millis, 1000); // default
        assert!(config.analytics.use_local_time);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.analytics.use_local_time = false;
        config.plans.extra_dirs.push(temp_dir.path().join("plans"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(!loaded.analytics.use_local_time);
        assert_eq!(loaded.plans.extra_dirs, config.plans.extra_dirs);
    }

    #[test]
    fn test_zero_tick_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[session]\ntick_millis = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_data_paths() {
        let base = Path::new("/tmp/lift");
        assert_eq!(
            DataConfig::log_path(base),
            PathBuf::from("/tmp/lift/log/workouts.jsonl")
        );
        assert_eq!(DataConfig::csv_path(base), PathBuf::from("/tmp/lift/workouts.csv"));
    }
}
