//! Core configuration, loaded from TOML.
//!
//! ```toml
//! homography_tolerance_us = 10000
//! persistent_alerts = ["/data/alerts", "/home/me/watch.vsax"]
//!
//! [[manual_event_types]]
//! name = "Person of interest"
//! pen_color = "#ff0000"
//! foreground_color = "#ffffff"
//! background_color = "#400000"
//! ```

use crate::event_types::EventInfo;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings consumed by [`crate::Core`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Maximum distance (microseconds) to a nearest-match homography
    /// (default: 10 000 = 10 ms)
    pub homography_tolerance_us: u64,

    /// Alert files or directories loaded once a query-capable source attaches
    pub persistent_alerts: Vec<PathBuf>,

    /// User event types registered at start-up (`type_id` is assigned)
    pub manual_event_types: Vec<EventInfo>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            homography_tolerance_us: 10_000,
            persistent_alerts: Vec::new(),
            manual_event_types: Vec::new(),
        }
    }
}

impl CoreConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types::Color;

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.homography_tolerance_us, 10_000);
        assert!(cfg.persistent_alerts.is_empty());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg = CoreConfig::from_toml_str("persistent_alerts = [\"/tmp/a\"]").unwrap();
        assert_eq!(cfg.homography_tolerance_us, 10_000);
        assert_eq!(cfg.persistent_alerts, vec![PathBuf::from("/tmp/a")]);
    }

    #[test]
    fn test_manual_types() {
        let cfg = CoreConfig::from_toml_str(
            r##"
            [[manual_event_types]]
            name = "Loiter"
            pen_color = "#ff0000"
            foreground_color = "#ffffff"
            background_color = "#000000"
            "##,
        )
        .unwrap();
        assert_eq!(cfg.manual_event_types.len(), 1);
        assert_eq!(cfg.manual_event_types[0].pen_color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vsplay.toml");
        let cfg = CoreConfig {
            homography_tolerance_us: 2_500,
            ..CoreConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(CoreConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_missing_file() {
        let err = CoreConfig::load(Path::new("/nonexistent/vsplay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            CoreConfig::from_toml_str("homography_tolerance_us = \"x\""),
            Err(ConfigError::ParseError(_))
        ));
    }
}
