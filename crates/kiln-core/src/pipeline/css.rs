//! CSS stage: lint SCSS, compile with grass, prefix and minify with
//! lightningcss, write a single stylesheet (and its source map).
//!
//! Each entry point is compiled, parsed and minified on its own so one bad
//! entry only loses its own rules. The surviving rule lists are then printed
//! as one sheet with every `@import` hoisted to the top.

use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::discovery::SourceDiscovery;
use super::images::write_output;
use crate::config::CssConfig;
use crate::error::{ConfigError, StageError, StageResult};
use crate::lint::ScssLinter;
use crate::types::{Stage, StageReport};

/// Plain CSS compiled from one SCSS entry point.
#[derive(Debug, Clone)]
pub struct CompiledCss {
    /// SCSS entry the CSS came from
    pub path: PathBuf,
    /// Name the entry is listed under in the source map
    pub name: String,
    pub css: String,
}

/// A printed bundle.
#[derive(Debug, Default)]
pub struct BundledCss {
    pub code: String,
    /// Source map JSON, when requested
    pub map: Option<String>,
    /// Number of entries that made it into `code`
    pub entries: usize,
}

/// Compiles SCSS entry points into one minified, prefixed stylesheet.
pub struct StylesheetCompiler {
    targets: Targets,
}

impl StylesheetCompiler {
    /// Resolve the configured browserslist queries.
    pub fn new(browsers: &[String]) -> Result<Self, ConfigError> {
        let browsers = Browsers::from_browserslist(browsers.iter().map(String::as_str))
            .map_err(|e| ConfigError::ValidationError(format!("css.browsers: {e}")))?;
        Ok(Self {
            targets: Targets {
                browsers,
                ..Targets::default()
            },
        })
    }

    /// Compile one SCSS file to plain CSS. `load_path` resolves `@use` and
    /// `@import` of partials.
    pub fn compile(&self, path: &Path, load_path: &Path) -> StageResult<String> {
        let options = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .load_path(load_path);
        grass::from_path(path, &options).map_err(|e| StageError::Scss {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Add vendor prefixes for the configured targets and minify a single
    /// stylesheet.
    ///
    /// `path` names the input in error messages.
    pub fn finish(&self, css: &str, path: &Path) -> StageResult<String> {
        let entry = CompiledCss {
            path: path.to_path_buf(),
            name: path.display().to_string(),
            css: css.to_string(),
        };
        let (bundle, mut failures) = self.bundle(std::slice::from_ref(&entry), path, false);
        match failures.pop() {
            Some(e) => Err(e),
            None => bundle.map(|b| b.code),
        }
    }

    /// Prefix, minify and concatenate compiled entries.
    ///
    /// Entries lightningcss rejects are returned as failures against their
    /// own path and left out; the rest are still bundled. The outer result
    /// only fails when printing the combined sheet fails, which is reported
    /// against `output`.
    pub fn bundle(
        &self,
        entries: &[CompiledCss],
        output: &Path,
        source_map: bool,
    ) -> (StageResult<BundledCss>, Vec<StageError>) {
        let mut failures = Vec::new();
        let mut imports = Vec::new();
        let mut rules = Vec::new();
        let mut sources = Vec::new();
        let mut included = Vec::new();

        for entry in entries {
            let source_index = sources.len() as u32;
            match self.minify_entry(entry, source_index) {
                Ok(sheet) => {
                    for rule in sheet.rules.0 {
                        if matches!(rule, CssRule::Import(_)) {
                            imports.push(rule);
                        } else {
                            rules.push(rule);
                        }
                    }
                    sources.push(entry.name.clone());
                    included.push(entry);
                }
                Err(e) => failures.push(e),
            }
        }

        imports.append(&mut rules);
        let sheet = StyleSheet::new(sources, CssRuleList(imports), ParserOptions::default());

        let mut map = source_map.then(|| {
            let mut map = SourceMap::new("/");
            for entry in &included {
                let index = map.add_source(&entry.name);
                // index is always in range right after add_source
                let _ = map.set_source_content(index as usize, &entry.css);
            }
            map
        });

        let css_error = |message: String| StageError::Css {
            path: output.to_path_buf(),
            message,
        };
        let printed = sheet.to_css(PrinterOptions {
            minify: true,
            targets: self.targets,
            source_map: map.as_mut(),
            ..PrinterOptions::default()
        });
        let result = match printed {
            Ok(result) => result,
            Err(e) => return (Err(css_error(e.to_string())), failures),
        };

        let map = match map.map(|mut map| map.to_json(None)).transpose() {
            Ok(map) => map,
            Err(e) => return (Err(css_error(e.to_string())), failures),
        };

        let bundle = BundledCss {
            code: result.code,
            map,
            entries: included.len(),
        };
        (Ok(bundle), failures)
    }

    fn minify_entry<'i>(&self, entry: &'i CompiledCss, source_index: u32) -> StageResult<StyleSheet<'i>> {
        let css_error = |message: String| StageError::Css {
            path: entry.path.clone(),
            message,
        };

        let mut sheet = StyleSheet::parse(
            &entry.css,
            ParserOptions {
                filename: entry.name.clone(),
                source_index,
                ..ParserOptions::default()
            },
        )
        .map_err(|e| css_error(e.to_string()))?;

        sheet
            .minify(MinifyOptions {
                targets: self.targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        Ok(sheet)
    }
}

/// Runs lint, compilation and post-processing over the SCSS tree.
pub struct CssStage {
    compiler: StylesheetCompiler,
    linter: ScssLinter,
    source_dir: PathBuf,
    output_file: PathBuf,
    source_map: bool,
}

impl CssStage {
    pub fn new(config: &CssConfig, source_dir: PathBuf, output_dir: PathBuf) -> Result<Self, ConfigError> {
        let output_file = output_dir.join(format!("{}{}.css", config.basename, config.suffix));
        Ok(Self {
            compiler: StylesheetCompiler::new(&config.browsers)?,
            linter: ScssLinter::new(config.lint.clone()),
            source_dir,
            output_file,
            source_map: config.source_map,
        })
    }

    /// Path of the stylesheet this stage writes.
    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Path of the source map written next to the stylesheet.
    pub fn map_file(&self) -> PathBuf {
        let mut name = self.output_file.as_os_str().to_owned();
        name.push(".map");
        PathBuf::from(name)
    }

    pub fn run(&self) -> StageReport {
        let start = Instant::now();
        let mut report = StageReport::new(Stage::Css);

        // Lint everything, partials included
        let sources = SourceDiscovery::new(&["scss"]).discover(&self.source_dir);
        for file in &sources {
            match std::fs::read_to_string(&file.path) {
                Ok(content) => report.lint.extend(self.linter.lint(&file.path, &content)),
                Err(e) => report.record_failure(&StageError::Read {
                    path: file.path.clone(),
                    source: e,
                }),
            }
        }
        if !report.lint.is_empty() {
            tracing::warn!("{} SCSS lint finding(s)", report.lint.len());
        }

        // Compile entry points only
        let entries = SourceDiscovery::new(&["scss"])
            .skip_partials()
            .discover(&self.source_dir);
        let mut compiled = Vec::new();
        let mut bytes_in = 0;
        for entry in &entries {
            match self.compiler.compile(&entry.path, &self.source_dir) {
                Ok(css) => {
                    bytes_in += entry.size;
                    compiled.push(CompiledCss {
                        path: entry.path.clone(),
                        name: entry
                            .relative
                            .with_extension("css")
                            .to_string_lossy()
                            .replace('\\', "/"),
                        css,
                    });
                }
                Err(e) => report.record_failure(&e),
            }
        }

        if compiled.is_empty() {
            // nothing compiled: leave the previous stylesheet in place
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }

        let (bundle, failures) = self.compiler.bundle(&compiled, &self.output_file, self.source_map);
        for failure in &failures {
            report.record_failure(failure);
        }

        match bundle.and_then(|bundle| self.write(bundle)) {
            Ok(Some(written)) => {
                report.record_output(bytes_in, written as u64);
                tracing::debug!("Wrote {:?} ({} bytes)", self.output_file, written);
            }
            Ok(None) => {}
            Err(e) => report.record_failure(&e),
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Write the stylesheet and its map. Returns `None` when no entry survived.
    fn write(&self, bundle: BundledCss) -> StageResult<Option<usize>> {
        if bundle.entries == 0 {
            return Ok(None);
        }

        let mut code = bundle.code;
        if let Some(map) = bundle.map {
            let map_file = self.map_file();
            write_output(&map_file, map.as_bytes())?;
            if let Some(name) = map_file.file_name() {
                code.push_str(&format!("\n/*# sourceMappingURL={} */\n", name.to_string_lossy()));
            }
        }

        write_output(&self.output_file, code.as_bytes())?;
        Ok(Some(code.len()))
    }
}
