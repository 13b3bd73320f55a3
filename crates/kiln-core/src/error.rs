//! Error types for the Kiln asset pipeline.
//!
//! Errors are organized by concern. Per-file failures ([`StageError`]) are
//! recorded in the stage report and never abort a build; only configuration,
//! I/O on the output tree, the dev server and the watcher surface as
//! [`KilnError`].

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Kiln operations.
#[derive(Error, Debug)]
pub enum KilnError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A stage's worker task panicked or was cancelled
    #[error("Stage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dev server failed to bind or serve
    #[error("Server error: {0}")]
    Server(String),

    /// File watcher failed to start
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Per-file stage failures.
#[derive(Error, Debug)]
pub enum StageError {
    /// Source file could not be read
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output file could not be written
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Raster image decode or encode failed
    #[error("Image error for {path}: {message}")]
    Image { path: PathBuf, message: String },

    /// SVG could not be parsed or rewritten
    #[error("SVG error for {path}: {message}")]
    Svg { path: PathBuf, message: String },

    /// SCSS compilation failed
    #[error("SCSS error in {path}: {message}")]
    Scss { path: PathBuf, message: String },

    /// CSS post-processing (prefixing, minification) failed
    #[error("CSS error for {path}: {message}")]
    Css { path: PathBuf, message: String },

    /// HTML rewriting or minification failed
    #[error("HTML error for {path}: {message}")]
    Html { path: PathBuf, message: String },

    /// JavaScript bundling or minification failed
    #[error("Script error for {path}: {message}")]
    Script { path: PathBuf, message: String },
}

impl StageError {
    /// Path of the file the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::Image { path, .. }
            | Self::Svg { path, .. }
            | Self::Scss { path, .. }
            | Self::Css { path, .. }
            | Self::Html { path, .. }
            | Self::Script { path, .. } => path,
        }
    }
}

/// Convenience type alias for Kiln results.
pub type Result<T> = std::result::Result<T, KilnError>;

/// Convenience type alias for per-file stage results.
pub type StageResult<T> = std::result::Result<T, StageError>;
