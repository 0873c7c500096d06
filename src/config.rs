//! Configuration for the host-activity monitor.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest change buffer that can hold one record header plus a short name.
pub const MIN_CHANGE_BUFFER: usize = 16;

/// Largest change buffer; the OS rejects bigger buffers for network shares.
pub const MAX_CHANGE_BUFFER: usize = 64 * 1024;

/// Main configuration for the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How often the foreground window is polled
    #[serde(with = "duration_ms")]
    pub focus_interval: Duration,

    /// How often the process list is captured and diffed
    #[serde(with = "duration_ms")]
    pub process_interval: Duration,

    /// Directory subtree watched for filesystem changes
    pub watch_root: PathBuf,

    /// Size of the buffer one change-notification batch is delivered into
    pub change_buffer_size: usize,

    /// How event lines are rendered on stdout
    pub output_format: OutputFormat,

    /// What a failed process enumeration means for the diff
    pub enumeration_failure: EnumerationFailurePolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            focus_interval: Duration::from_millis(800),
            process_interval: Duration::from_millis(2000),
            watch_root: default_watch_root(),
            change_buffer_size: 4096,
            output_format: OutputFormat::Text,
            enumeration_failure: EnumerationFailurePolicy::Skip,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file the operator named explicitly. Unlike
    /// [`load`](Self::load), a missing file is an error.
    pub fn load_existing(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load(path)
    }

    /// Replace every value that has an override. Overrides are not validated
    /// here.
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(root) = overrides.watch_root {
            self.watch_root = root;
        }
        if let Some(interval) = overrides.focus_interval {
            self.focus_interval = interval;
        }
        if let Some(interval) = overrides.process_interval {
            self.process_interval = interval;
        }
        if let Some(size) = overrides.change_buffer_size {
            self.change_buffer_size = size;
        }
        if let Some(format) = overrides.output_format {
            self.output_format = format;
        }
        if let Some(policy) = overrides.enumeration_failure {
            self.enumeration_failure = policy;
        }
        self
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("host-activity-monitor")
            .join("config.json")
    }

    /// Check that every value is usable by the monitors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.focus_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "focus_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.process_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "process_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        let size = self.change_buffer_size;
        if !(MIN_CHANGE_BUFFER..=MAX_CHANGE_BUFFER).contains(&size) || size % 4 != 0 {
            return Err(ConfigError::Invalid {
                field: "change_buffer_size",
                reason: format!(
                    "{size} is not a multiple of 4 between {MIN_CHANGE_BUFFER} and {MAX_CHANGE_BUFFER}"
                ),
            });
        }
        Ok(())
    }
}

/// Values given on the command line. Each one that is set wins over the
/// config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub watch_root: Option<PathBuf>,
    pub focus_interval: Option<Duration>,
    pub process_interval: Option<Duration>,
    pub change_buffer_size: Option<usize>,
    pub output_format: Option<OutputFormat>,
    pub enumeration_failure: Option<EnumerationFailurePolicy>,
}

/// The invoking user's desktop, or the filesystem root when no desktop
/// directory can be resolved.
pub fn default_watch_root() -> PathBuf {
    dirs::desktop_dir().unwrap_or_else(platform_root)
}

#[cfg(windows)]
fn platform_root() -> PathBuf {
    PathBuf::from("C:\\")
}

#[cfg(not(windows))]
fn platform_root() -> PathBuf {
    PathBuf::from("/")
}

/// Rendering of event lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[timestamp] Category -> fields`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// How the process differ treats a capture that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnumerationFailurePolicy {
    /// Keep the previous snapshot and report nothing for this interval.
    #[default]
    Skip,
    /// Treat the failure as an empty process list (reports every known
    /// process as ended).
    Empty,
}

/// Serde support for Duration as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.focus_interval, Duration::from_millis(800));
        assert_eq!(config.process_interval, Duration::from_millis(2000));
        assert_eq!(config.change_buffer_size, 4096);
        assert_eq!(config.output_format, OutputFormat::Text);
        assert_eq!(config.enumeration_failure, EnumerationFailurePolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"focus_interval": 250, "output_format": "json"}"#).unwrap();
        assert_eq!(config.focus_interval, Duration::from_millis(250));
        assert_eq!(config.process_interval, Duration::from_millis(2000));
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MonitorConfig {
            focus_interval: Duration::ZERO,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());

        config.focus_interval = Duration::from_millis(10);
        config.change_buffer_size = 4097;
        assert!(config.validate().is_err());

        config.change_buffer_size = MAX_CHANGE_BUFFER + 4;
        assert!(config.validate().is_err());

        config.change_buffer_size = MIN_CHANGE_BUFFER;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("ham-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let config = MonitorConfig {
            process_interval: Duration::from_millis(500),
            enumeration_failure: EnumerationFailurePolicy::Empty,
            ..MonitorConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("ham-does-not-exist").join("config.json");
        assert_eq!(MonitorConfig::load(&path).unwrap(), MonitorConfig::default());
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let file = MonitorConfig {
            focus_interval: Duration::from_millis(300),
            process_interval: Duration::from_millis(900),
            output_format: OutputFormat::Json,
            ..MonitorConfig::default()
        };

        let merged = file.clone().apply_overrides(ConfigOverrides {
            watch_root: Some(PathBuf::from("watched")),
            focus_interval: Some(Duration::from_millis(100)),
            output_format: Some(OutputFormat::Text),
            ..ConfigOverrides::default()
        });

        assert_eq!(merged.watch_root, PathBuf::from("watched"));
        assert_eq!(merged.focus_interval, Duration::from_millis(100));
        assert_eq!(merged.output_format, OutputFormat::Text);
        // Untouched values come from the file.
        assert_eq!(merged.process_interval, Duration::from_millis(900));
        assert_eq!(merged.change_buffer_size, file.change_buffer_size);
        assert_eq!(merged.enumeration_failure, file.enumeration_failure);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let config = MonitorConfig::default();
        assert_eq!(
            config.clone().apply_overrides(ConfigOverrides::default()),
            config
        );
    }

    #[test]
    fn test_named_config_file_must_exist() {
        let path = std::env::temp_dir()
            .join(format!("ham-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");

        let err = MonitorConfig::load_existing(&path).unwrap_err();
        assert!(matches!(&err, ConfigError::NotFound(p) if p == &path));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_named_config_file_is_loaded() {
        let dir = std::env::temp_dir().join(format!("ham-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let config = MonitorConfig {
            change_buffer_size: 8192,
            ..MonitorConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(MonitorConfig::load_existing(&path).unwrap(), config);

        let _ = std::fs::remove_dir_all(dir);
    }
}
