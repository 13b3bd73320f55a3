//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::ValidationError(
                "images.quality must be between 1 and 100".into(),
            ));
        }
        if self.images.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "images.parallel_workers must be > 0".into(),
            ));
        }
        if self.css.basename.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "css.basename must not be empty".into(),
            ));
        }
        if self.css.browsers.is_empty() {
            return Err(ConfigError::ValidationError(
                "css.browsers must list at least one query".into(),
            ));
        }
        if self.scripts.basename.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "scripts.basename must not be empty".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be > 0".into(),
            ));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "watch.debounce_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
