//! Kiln CLI - static-asset pipeline with a live-reload dev server.
//!
//! Kiln optimizes images, compiles SCSS, bundles JavaScript and minifies
//! HTML from `src/` into `dist/staging` or `dist/production`.
//!
//! # Usage
//!
//! ```bash
//! # Build everything into dist/staging
//! kiln
//!
//! # Production build, failing on lint errors
//! kiln build --production --strict
//!
//! # Rebuild only the stylesheet
//! kiln build --only css
//!
//! # Build, serve on :3000 and rebuild on change
//! kiln dev
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Kiln - static-asset pipeline with a live-reload dev server.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ./kiln.toml)
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline once (the default command)
    Build(cli::build::BuildArgs),

    /// Build, serve the dist directory and rebuild on change
    Dev(cli::dev::DevArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Build(cli::build::BuildArgs::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet; a broken config is reported by the
    // command that needs it, logging falls back to defaults meanwhile.
    let loaded = cli::load_config(cli.config.as_deref());
    let log_config = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    logging::init_from_config(&log_config, cli.verbose, cli.json_logs);

    tracing::debug!("Kiln v{}", kiln_core::VERSION);

    match cli.command.unwrap_or_default() {
        Commands::Build(args) => cli::build::execute(args, loaded?).await,
        Commands::Dev(args) => cli::dev::execute(args, loaded?).await,
        Commands::Config(args) => cli::config::execute(args, cli.config.as_deref()).await,
    }
}
