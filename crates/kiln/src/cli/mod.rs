//! Command handlers for the `kiln` binary.

pub mod build;
pub mod config;
pub mod dev;

use kiln_core::{Config, ConfigError};
use std::path::Path;

/// Load the config from `--config` or `./kiln.toml`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
