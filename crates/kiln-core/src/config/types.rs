//! Sub-configuration structs with defaults matching the stock project layout.

use crate::lint::Severity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which distribution directory a build writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// `dist_staging`
    #[default]
    Staging,
    /// `dist_production`
    Production,
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Staging => write!(f, "staging"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

/// Project layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Source root; HTML pages live directly inside it
    pub src: PathBuf,

    /// Asset directory, relative to `src`
    pub assets: PathBuf,

    /// Output directory for staging builds
    pub dist_staging: PathBuf,

    /// Output directory for production builds
    pub dist_production: PathBuf,

    /// Active build mode
    pub mode: BuildMode,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            src: PathBuf::from("./src"),
            assets: PathBuf::from("assets"),
            dist_staging: PathBuf::from("./dist/staging"),
            dist_production: PathBuf::from("./dist/production"),
            mode: BuildMode::Staging,
        }
    }
}

/// PNG compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    #[default]
    Best,
}

/// Image optimization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Whether the images stage runs
    pub enabled: bool,

    /// Source directory, relative to the assets dir
    pub dir: PathBuf,

    /// JPEG quality (1-100)
    pub quality: u8,

    /// PNG compression effort
    pub png_compression: PngCompression,

    /// Copy the source unchanged when optimization does not shrink it
    pub keep_larger_originals: bool,

    /// Number of images optimized concurrently
    pub parallel_workers: usize,

    /// Skip images whose content hash matches the previous build
    pub cache: bool,

    /// SVG cleanup options
    pub svg: SvgConfig,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("images"),
            quality: 80,
            png_compression: PngCompression::Best,
            keep_larger_originals: true,
            parallel_workers: 4,
            cache: true,
            svg: SvgConfig::default(),
        }
    }
}

/// SVG cleanup options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgConfig {
    /// Drop `viewBox` when it only restates `width`/`height`
    pub remove_view_box: bool,

    /// Drop `id` attributes nothing in the document references
    pub cleanup_ids: bool,
}

impl Default for SvgConfig {
    fn default() -> Self {
        Self {
            remove_view_box: true,
            cleanup_ids: false,
        }
    }
}

/// SCSS compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CssConfig {
    pub enabled: bool,

    /// Source directory, relative to the assets dir
    pub dir: PathBuf,

    /// Output directory, relative to the dist dir
    pub output_dir: PathBuf,

    /// Output file stem
    pub basename: String,

    /// Appended to the stem before `.css`
    pub suffix: String,

    /// Browserslist queries used as prefixing and minification targets
    pub browsers: Vec<String>,

    /// Write `<output>.map` next to the stylesheet
    pub source_map: bool,

    /// Lint rule severities
    pub lint: ScssLintConfig,
}

impl Default for CssConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("scss"),
            output_dir: PathBuf::from("assets/css"),
            basename: "main".to_string(),
            suffix: ".min".to_string(),
            browsers: vec!["defaults".to_string()],
            source_map: true,
            lint: ScssLintConfig::default(),
        }
    }
}

/// SCSS lint rule severities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScssLintConfig {
    pub no_ids: Severity,
    pub no_mergeable_selectors: Severity,
    pub final_newline: Severity,
    pub indentation: Severity,
}

impl Default for ScssLintConfig {
    fn default() -> Self {
        Self {
            no_ids: Severity::Warn,
            no_mergeable_selectors: Severity::Warn,
            final_newline: Severity::Off,
            indentation: Severity::Off,
        }
    }
}

/// JavaScript bundling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    pub enabled: bool,

    /// Source directory, relative to the assets dir
    pub dir: PathBuf,

    /// Output directory, relative to the dist dir
    pub output_dir: PathBuf,

    /// Output file stem
    pub basename: String,

    /// Appended to the stem before `.js`
    pub suffix: String,

    /// Wrap the bundle in a closure that defines `global` and `process`
    pub insert_globals: bool,

    /// Minify the bundle
    pub minify: bool,

    /// Lint rule severities
    pub lint: ScriptLintConfig,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("js"),
            output_dir: PathBuf::from("assets/js"),
            basename: "main".to_string(),
            suffix: ".min".to_string(),
            insert_globals: true,
            minify: true,
            lint: ScriptLintConfig::default(),
        }
    }
}

/// JavaScript lint rule severities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLintConfig {
    pub no_debugger: Severity,
    pub no_eval: Severity,
}

impl Default for ScriptLintConfig {
    fn default() -> Self {
        Self {
            no_debugger: Severity::Warn,
            no_eval: Severity::Warn,
        }
    }
}

/// HTML minification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    pub enabled: bool,
    pub collapse_whitespace: bool,
    pub remove_comments: bool,
    pub remove_empty_attributes: bool,
    pub sort_attributes: bool,
    pub sort_class_name: bool,

    /// Minify inline `<style>` and `<script>` contents
    pub minify_inline: bool,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collapse_whitespace: true,
            remove_comments: true,
            remove_empty_attributes: true,
            sort_attributes: true,
            sort_class_name: true,
            minify_inline: true,
        }
    }
}

/// Dev server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Inject the reload client into served HTML
    pub live_reload: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            live_reload: true,
        }
    }
}

/// File watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a burst of change events triggers a rebuild
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
