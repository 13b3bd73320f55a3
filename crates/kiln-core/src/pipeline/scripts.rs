//! Scripts stage: lint, concatenate, wrap and minify JavaScript into one bundle.

use std::path::{Path, PathBuf};
use std::time::Instant;

use super::discovery::SourceDiscovery;
use super::images::write_output;
use crate::config::ScriptsConfig;
use crate::error::{StageError, StageResult};
use crate::lint::ScriptLinter;
use crate::types::{Stage, StageReport};

const GLOBALS_PRELUDE: &str = "(function (global, process) {\n";
const GLOBALS_EPILOGUE: &str = "\n})(typeof globalThis !== \"undefined\" ? globalThis : \
typeof window !== \"undefined\" ? window : this, \
typeof process !== \"undefined\" ? process : { env: {} });\n";

/// Joins script sources into a single browser bundle.
pub struct ScriptBundler {
    insert_globals: bool,
    minify: bool,
}

impl ScriptBundler {
    pub fn new(config: &ScriptsConfig) -> Self {
        Self {
            insert_globals: config.insert_globals,
            minify: config.minify,
        }
    }

    /// Concatenate sources in order.
    ///
    /// Every source is followed by `\n;\n` so a file without a trailing
    /// semicolon cannot merge into the next one.
    pub fn bundle<S: AsRef<str>>(&self, sources: &[S]) -> String {
        let mut bundle = String::new();
        if self.insert_globals {
            bundle.push_str(GLOBALS_PRELUDE);
        }
        for source in sources {
            bundle.push_str(source.as_ref());
            bundle.push_str("\n;\n");
        }
        if self.insert_globals {
            bundle.push_str(GLOBALS_EPILOGUE);
        }
        bundle
    }

    /// Minify a bundle. Returns the input unchanged when minification is off.
    pub fn minify(&self, code: &str, path: &Path) -> StageResult<String> {
        if !self.minify {
            return Ok(code.to_string());
        }
        let session = minify_js::Session::new();
        let mut out = Vec::with_capacity(code.len() / 2);
        minify_js::minify(&session, minify_js::TopLevelMode::Global, code.as_bytes(), &mut out)
            .map_err(|e| StageError::Script {
                path: path.to_path_buf(),
                message: format!("{e:?}"),
            })?;
        String::from_utf8(out).map_err(|e| StageError::Script {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Runs lint, bundling and minification over the scripts directory.
pub struct ScriptStage {
    bundler: ScriptBundler,
    linter: ScriptLinter,
    source_dir: PathBuf,
    output_file: PathBuf,
}

impl ScriptStage {
    pub fn new(config: &ScriptsConfig, source_dir: PathBuf, output_dir: PathBuf) -> Self {
        let output_file = output_dir.join(format!("{}{}.js", config.basename, config.suffix));
        Self {
            bundler: ScriptBundler::new(config),
            linter: ScriptLinter::new(config.lint.clone()),
            source_dir,
            output_file,
        }
    }

    /// Path of the bundle this stage writes.
    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn run(&self) -> StageReport {
        let start = Instant::now();
        let mut report = StageReport::new(Stage::Scripts);

        let files = SourceDiscovery::new(&["js"]).discover(&self.source_dir);
        let mut sources = Vec::with_capacity(files.len());
        let mut bytes_in = 0;
        for file in &files {
            match std::fs::read_to_string(&file.path) {
                Ok(content) => {
                    report.lint.extend(self.linter.lint(&file.path, &content));
                    bytes_in += file.size;
                    sources.push(content);
                }
                Err(e) => report.record_failure(&StageError::Read {
                    path: file.path.clone(),
                    source: e,
                }),
            }
        }
        if !report.lint.is_empty() {
            tracing::warn!("{} script lint finding(s)", report.lint.len());
        }

        if sources.is_empty() {
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }

        let bundle = self.bundler.bundle(&sources);
        let code = match self.bundler.minify(&bundle, &self.source_dir) {
            Ok(code) => code,
            Err(e) => {
                // keep the site working with the unminified bundle
                report.record_failure(&e);
                bundle
            }
        };

        match write_output(&self.output_file, code.as_bytes()) {
            Ok(()) => {
                report.record_output(bytes_in, code.len() as u64);
                tracing::debug!("Wrote {:?} ({} bytes)", self.output_file, code.len());
            }
            Err(e) => report.record_failure(&e),
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }
}
