//! Configuration management for Kiln.
//!
//! Configuration is loaded from `kiln.toml` in the working directory. Every
//! section falls back to defaults that describe the stock layout:
//!
//! ```text
//! src/*.html                 → dist/<mode>/*.html
//! src/assets/images/**       → dist/<mode>/assets/images/**
//! src/assets/scss/**/*.scss  → dist/<mode>/assets/css/main.min.css
//! src/assets/js/**/*.js      → dist/<mode>/assets/js/main.min.js
//! ```

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Root configuration structure for Kiln.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source and output layout
    pub project: ProjectConfig,

    /// Image optimization
    pub images: ImagesConfig,

    /// SCSS compilation
    pub css: CssConfig,

    /// JavaScript bundling
    pub scripts: ScriptsConfig,

    /// HTML minification
    pub html: HtmlConfig,

    /// Dev server
    pub server: ServerConfig,

    /// File watcher
    pub watch: WatchConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from `./kiln.toml`.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    ///
    /// Relative project paths in the file are resolved against the file's
    /// directory, so `kiln --config site/kiln.toml build` works from anywhere.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.project.rebase(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }

    /// Source root (with ~ expansion).
    pub fn src_dir(&self) -> PathBuf {
        expand(&self.project.src)
    }

    /// Asset root inside the source tree.
    pub fn assets_dir(&self) -> PathBuf {
        self.src_dir().join(&self.project.assets)
    }

    /// Output directory for the active build mode.
    pub fn dist_dir(&self) -> PathBuf {
        match self.project.mode {
            BuildMode::Staging => expand(&self.project.dist_staging),
            BuildMode::Production => expand(&self.project.dist_production),
        }
    }

    /// Directory a stage reads its inputs from.
    pub fn stage_source(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Images => self.assets_dir().join(&self.images.dir),
            Stage::Css => self.assets_dir().join(&self.css.dir),
            Stage::Scripts => self.assets_dir().join(&self.scripts.dir),
            Stage::Html => self.src_dir(),
        }
    }

    /// Directory a stage writes its outputs to.
    pub fn stage_output(&self, stage: Stage) -> PathBuf {
        let dist = self.dist_dir();
        match stage {
            Stage::Images => dist.join(&self.project.assets).join(&self.images.dir),
            Stage::Css => dist.join(&self.css.output_dir),
            Stage::Scripts => dist.join(&self.scripts.output_dir),
            Stage::Html => dist,
        }
    }

    /// Whether a stage is switched on in the config.
    pub fn stage_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Images => self.images.enabled,
            Stage::Css => self.css.enabled,
            Stage::Scripts => self.scripts.enabled,
            Stage::Html => self.html.enabled,
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

impl ProjectConfig {
    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.src,
            &mut self.dist_staging,
            &mut self.dist_production,
        ] {
            let expanded = expand(path);
            if expanded.is_relative() {
                *path = base.join(expanded);
            }
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}
