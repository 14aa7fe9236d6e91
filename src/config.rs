use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::extract::MarkupLayout;
use crate::projection::ProjectionPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub projection: ProjectionPolicy,
    #[serde(default)]
    pub markup: MarkupLayout,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults, overlaid with the TOML file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_minutes <= 0 {
            return Err(Error::Config(format!(
                "cache ttl must be positive, got {} minutes",
                self.cache.ttl_minutes
            )));
        }
        self.projection.validate().map_err(Error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.ttl_minutes, 30);
        assert_eq!(config.projection.target_percentage, 75.0);
        assert_eq!(config.markup.subject_container, "subject-card");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [cache]
            ttl_minutes = 10

            [projection]
            target_percentage = 80.0
            medical_floor_percentage = 70.0

            [markup]
            subject_container = "course-box"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.ttl_minutes, 10);
        assert_eq!(config.cache.url, CacheConfig::default().url);
        assert_eq!(config.projection.max_classes_to_miss, 100);
        assert_eq!(config.markup.subject_container, "course-box");
        assert_eq!(config.markup.subject_name, "subject-name");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_ttl_and_bad_thresholds() {
        let config = Config::from_toml("[cache]\nttl_minutes = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config::from_toml("[projection]\nmedical_floor_percentage = 90.0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/attendance.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
