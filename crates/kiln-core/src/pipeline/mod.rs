//! Asset pipeline stages and the orchestrator that runs them.
//!
//! - **discovery**: Find a stage's source files
//! - **cache**: Content-hash manifest for incremental image builds
//! - **svg**: XML-level SVG cleanup
//! - **images**: Image recompression
//! - **css**: SCSS lint, compile, prefix, minify
//! - **scripts**: JavaScript lint, bundle, minify
//! - **html**: HTML minification
//!
//! Stages always run in the order images → css → scripts → html, and a
//! stage never starts before the previous one finished.

pub mod cache;
pub mod css;
pub mod discovery;
pub mod html;
pub mod images;
pub mod scripts;
pub mod svg;

pub use cache::ImageCache;
pub use css::{CssStage, StylesheetCompiler};
pub use discovery::{DiscoveredFile, SourceDiscovery};
pub use html::{HtmlMinifier, HtmlStage};
pub use images::{ImageOptimizer, ImageStage};
pub use scripts::{ScriptBundler, ScriptStage};
pub use svg::SvgOptimizer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{KilnError, Result};
use crate::types::{BuildReport, Stage, StageReport};

/// Lifecycle notifications emitted while a build runs.
#[derive(Debug)]
pub enum StageEvent<'a> {
    Started(Stage),
    Finished(&'a StageReport),
    Skipped(Stage),
}

/// Runs the configured stages against one source tree and dist directory.
pub struct Pipeline {
    config: Config,
    images: ImageStage,
    css: Arc<CssStage>,
    scripts: Arc<ScriptStage>,
    html: Arc<HtmlStage>,
}

impl Pipeline {
    /// Build every stage from the configuration.
    ///
    /// Fails only on configuration problems that no stage could recover
    /// from, such as an unparseable browserslist query.
    pub fn new(config: Config) -> Result<Self> {
        let images = ImageStage::new(
            config.images.clone(),
            config.stage_source(Stage::Images),
            config.stage_output(Stage::Images),
            config.dist_dir(),
        );
        let css = CssStage::new(
            &config.css,
            config.stage_source(Stage::Css),
            config.stage_output(Stage::Css),
        )?;
        let scripts = ScriptStage::new(
            &config.scripts,
            config.stage_source(Stage::Scripts),
            config.stage_output(Stage::Scripts),
        );
        let html = HtmlStage::new(
            &config.html,
            config.stage_source(Stage::Html),
            config.stage_output(Stage::Html),
        );

        Ok(Self {
            config,
            images,
            css: Arc::new(css),
            scripts: Arc::new(scripts),
            html: Arc::new(html),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.config.dist_dir()
    }

    /// Run all stages.
    pub async fn build(&self) -> Result<BuildReport> {
        self.run(&Stage::ALL).await
    }

    /// Run a selection of stages in execution order.
    pub async fn run(&self, stages: &[Stage]) -> Result<BuildReport> {
        self.run_with(stages, |_| {}).await
    }

    /// Run a selection of stages, reporting progress to `on_event`.
    ///
    /// Per-file failures are collected in the report; only failing to create
    /// the dist directory or a panicking stage aborts the build.
    pub async fn run_with<F>(&self, stages: &[Stage], mut on_event: F) -> Result<BuildReport>
    where
        F: FnMut(StageEvent<'_>),
    {
        let start = Instant::now();
        let dist_dir = self.dist_dir();
        std::fs::create_dir_all(&dist_dir).map_err(KilnError::Io)?;

        let mut report = BuildReport {
            dist_dir,
            ..BuildReport::default()
        };

        for stage in Stage::ordered(stages) {
            if !self.config.stage_enabled(stage) {
                tracing::debug!("Stage '{}' disabled, skipping", stage);
                on_event(StageEvent::Skipped(stage));
                continue;
            }

            tracing::info!("Starting '{}'...", stage);
            on_event(StageEvent::Started(stage));
            let stage_report = self.run_stage(stage).await?;
            tracing::info!(
                "Finished '{}' after {} ms ({} written, {} skipped, {} failed)",
                stage,
                stage_report.duration_ms,
                stage_report.processed,
                stage_report.skipped,
                stage_report.failed
            );
            on_event(StageEvent::Finished(&stage_report));
            report.stages.push(stage_report);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Run a single stage regardless of whether it is enabled.
    ///
    /// The compile and minify stages are CPU-bound and run on the blocking
    /// pool; the images stage schedules its own blocking tasks per file.
    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        let report = match stage {
            Stage::Images => self.images.run().await,
            Stage::Css => {
                let css = Arc::clone(&self.css);
                tokio::task::spawn_blocking(move || css.run()).await?
            }
            Stage::Scripts => {
                let scripts = Arc::clone(&self.scripts);
                tokio::task::spawn_blocking(move || scripts.run()).await?
            }
            Stage::Html => {
                let html = Arc::clone(&self.html);
                tokio::task::spawn_blocking(move || html.run()).await?
            }
        };
        Ok(report)
    }
}
