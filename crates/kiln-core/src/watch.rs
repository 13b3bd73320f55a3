//! Source watcher for `kiln dev`.
//!
//! Filesystem events are debounced, mapped to the stages they affect and
//! those stages are rebuilt in pipeline order. Connected browsers then get a
//! `css` event when only stylesheets changed, or a full `reload` otherwise.

use notify::{RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::Result;
use crate::lint::format_stylish;
use crate::pipeline::{Pipeline, SourceDiscovery};
use crate::server::{ReloadEvent, ReloadHub};
use crate::types::Stage;

/// Maps changed paths to the stage that consumes them.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    images: PathBuf,
    css: PathBuf,
    scripts: PathBuf,
    html: PathBuf,
    dist: PathBuf,
}

impl ChangeClassifier {
    pub fn new(config: &Config) -> Self {
        Self {
            images: resolve(&config.stage_source(Stage::Images)),
            css: resolve(&config.stage_source(Stage::Css)),
            scripts: resolve(&config.stage_source(Stage::Scripts)),
            html: resolve(&config.stage_source(Stage::Html)),
            dist: resolve(&config.dist_dir()),
        }
    }

    /// Stage affected by a change to `path`, if any.
    pub fn classify(&self, path: &Path) -> Option<Stage> {
        if path.starts_with(&self.dist) || !SourceDiscovery::any().accepts(path) {
            return None;
        }
        if path.starts_with(&self.images) {
            return Some(Stage::Images);
        }
        if path.starts_with(&self.css) && has_extension(path, &["scss"]) {
            return Some(Stage::Css);
        }
        if path.starts_with(&self.scripts) && has_extension(path, &["js"]) {
            return Some(Stage::Scripts);
        }
        if path.parent() == Some(self.html.as_path()) && has_extension(path, &["html", "htm"]) {
            return Some(Stage::Html);
        }
        None
    }

    /// Distinct stages affected by a batch of changes, in execution order.
    pub fn stages_for<'a, I>(&self, paths: I) -> Vec<Stage>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        paths
            .into_iter()
            .filter_map(|p| self.classify(p))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Browser notification after rebuilding `stages`.
pub fn reload_event_for(stages: &[Stage]) -> ReloadEvent {
    if stages == [Stage::Css] {
        ReloadEvent::Css
    } else {
        ReloadEvent::Reload
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Watch the source tree and rebuild until the returned future is dropped.
pub async fn watch(pipeline: Arc<Pipeline>, hub: ReloadHub) -> Result<()> {
    let config = pipeline.config();
    let root = resolve(&config.src_dir());
    let debounce = Duration::from_millis(config.watch.debounce_ms);
    let classifier = ChangeClassifier::new(config);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // receiver gone means the watch loop ended
        let _ = tx.send(res);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!("Watching {:?} for changes", root);

    while let Some(first) = rx.recv().await {
        let mut changed = Vec::new();
        collect_paths(first, &mut changed);

        // keep collecting until the tree has been quiet for `debounce`
        while let Ok(Some(next)) = tokio::time::timeout(debounce, rx.recv()).await {
            collect_paths(next, &mut changed);
        }

        let stages = classifier.stages_for(changed.iter().map(PathBuf::as_path));
        if stages.is_empty() {
            continue;
        }
        tracing::info!(
            "{} change(s) detected, rebuilding: {}",
            changed.len(),
            stages
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        match pipeline.run(&stages).await {
            Ok(report) => {
                let lint: Vec<_> = report.stages.iter().flat_map(|s| s.lint.clone()).collect();
                if !lint.is_empty() {
                    tracing::warn!("\n{}", format_stylish(&lint));
                }
                let ran = report.stages_run();
                if ran.is_empty() {
                    tracing::debug!("Affected stages are disabled, nothing to reload");
                } else {
                    hub.send(reload_event_for(&ran));
                }
            }
            Err(e) => tracing::error!("Rebuild failed: {}", e),
        }
    }

    Ok(())
}

fn collect_paths(res: notify::Result<notify::Event>, into: &mut Vec<PathBuf>) {
    match res {
        Ok(event) if event.kind.is_access() => {}
        Ok(event) => into.extend(event.paths),
        Err(e) => tracing::warn!("Watch error: {}", e),
    }
}
