//! Kiln Core - static-asset pipeline for small websites.
//!
//! Kiln takes a source tree of HTML pages, SCSS, JavaScript and images and
//! produces an optimized dist directory:
//!
//! ```text
//! images → css → scripts → html → dist/{staging,production}
//! ```
//!
//! The same pipeline backs the dev workflow: a file watcher re-runs only the
//! affected stages and a small HTTP server pushes live-reload events to the
//! browser.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiln_core::{Config, Kiln};
//!
//! #[tokio::main]
//! async fn main() -> kiln_core::Result<()> {
//!     let kiln = Kiln::new(Config::load()?)?;
//!     let report = kiln.build().await?;
//!     println!("{} file(s) failed", report.failed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lint;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod types;
pub mod watch;

pub use config::{BuildMode, Config};
pub use error::{ConfigError, KilnError, Result, StageError, StageResult};
pub use lint::{LintMessage, Severity};
pub use output::{ReportFormat, ReportWriter};
pub use pipeline::{Pipeline, StageEvent};
pub use server::{DevServer, ReloadEvent, ReloadHub};
pub use types::{BuildReport, FileFailure, Stage, StageReport};

use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point tying the pipeline, the dev server and the watcher together.
pub struct Kiln {
    pipeline: Arc<Pipeline>,
    hub: ReloadHub,
}

impl Kiln {
    pub fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing Kiln v{} ({} mode)", VERSION, config.project.mode);
        Ok(Self {
            pipeline: Arc::new(Pipeline::new(config)?),
            hub: ReloadHub::default(),
        })
    }

    /// Create a Kiln instance from `./kiln.toml` (or defaults).
    pub fn with_defaults() -> Result<Self> {
        Self::new(Config::load()?)
    }

    pub fn config(&self) -> &Config {
        self.pipeline.config()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn reload_hub(&self) -> &ReloadHub {
        &self.hub
    }

    /// Run every stage once.
    pub async fn build(&self) -> Result<BuildReport> {
        self.pipeline.build().await
    }

    /// Bind the dev server to the configured address, serving the dist directory.
    pub async fn serve(&self) -> Result<DevServer> {
        DevServer::bind(
            &self.config().server,
            self.pipeline.dist_dir(),
            self.hub.clone(),
        )
        .await
    }

    /// Watch the source tree, rebuilding and notifying browsers on change.
    pub async fn watch(&self) -> Result<()> {
        watch::watch(Arc::clone(&self.pipeline), self.hub.clone()).await
    }
}
