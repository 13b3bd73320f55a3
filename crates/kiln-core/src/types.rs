//! Core data types shared by the pipeline, the watcher and the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::lint::LintMessage;

/// One transformation step of the asset pipeline.
///
/// The declaration order is the execution order: a build always runs
/// images, then css, then scripts, then html.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Images,
    Css,
    Scripts,
    Html,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Images, Stage::Css, Stage::Scripts, Stage::Html];

    /// Short lowercase name used in logs, reports and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Images => "images",
            Stage::Css => "css",
            Stage::Scripts => "scripts",
            Stage::Html => "html",
        }
    }

    /// Sort and deduplicate a stage selection into execution order.
    pub fn ordered(stages: &[Stage]) -> Vec<Stage> {
        let mut ordered = stages.to_vec();
        ordered.sort();
        ordered.dedup();
        ordered
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "images" | "image" | "img" => Ok(Stage::Images),
            "css" | "scss" | "styles" => Ok(Stage::Css),
            "scripts" | "script" | "js" => Ok(Stage::Scripts),
            "html" => Ok(Stage::Html),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

/// A single file that failed inside a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    /// Source file the failure refers to
    pub path: PathBuf,

    /// Human-readable error message
    pub message: String,
}

impl From<&crate::error::StageError> for FileFailure {
    fn from(err: &crate::error::StageError) -> Self {
        Self {
            path: err.path().to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Outcome of running one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage ran
    pub stage: Stage,

    /// Files written to the dist directory
    pub processed: usize,

    /// Inputs skipped because the cached output is still current
    pub skipped: usize,

    /// Inputs that failed (details in `failures`)
    pub failed: usize,

    /// Total size of the inputs that were read
    pub bytes_in: u64,

    /// Total size of the outputs that were written
    pub bytes_out: u64,

    /// Wall-clock duration of the stage
    pub duration_ms: u64,

    /// Per-file failures
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<FileFailure>,

    /// Lint findings (css and scripts only)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub lint: Vec<LintMessage>,
}

impl StageReport {
    /// Create an empty report for a stage.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            skipped: 0,
            failed: 0,
            bytes_in: 0,
            bytes_out: 0,
            duration_ms: 0,
            failures: Vec::new(),
            lint: Vec::new(),
        }
    }

    /// Record a per-file failure and log it; the stage keeps going.
    pub fn record_failure(&mut self, err: &crate::error::StageError) {
        tracing::error!(stage = %self.stage, "{}", err);
        self.failed += 1;
        self.failures.push(FileFailure::from(err));
    }

    /// Record a successfully written output.
    pub fn record_output(&mut self, bytes_in: u64, bytes_out: u64) {
        self.processed += 1;
        self.bytes_in += bytes_in;
        self.bytes_out += bytes_out;
    }

    /// Number of lint findings at error severity.
    pub fn lint_errors(&self) -> usize {
        self.lint.iter().filter(|m| m.is_error()).count()
    }

    /// Bytes saved relative to the inputs, as a percentage (0 when nothing ran).
    pub fn savings_percent(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        (1.0 - self.bytes_out as f64 / self.bytes_in as f64) * 100.0
    }
}

/// Outcome of a full or partial build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    /// Output directory the build wrote to
    pub dist_dir: PathBuf,

    /// One report per stage that ran, in execution order
    pub stages: Vec<StageReport>,

    /// Wall-clock duration of the build
    pub duration_ms: u64,
}

impl BuildReport {
    /// Total number of failed files across all stages.
    pub fn failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }

    /// Total number of lint errors across all stages.
    pub fn lint_errors(&self) -> usize {
        self.stages.iter().map(StageReport::lint_errors).sum()
    }

    /// Whether every stage completed without failures or lint errors.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.lint_errors() == 0
    }

    /// Stages that ran, in order.
    pub fn stages_run(&self) -> Vec<Stage> {
        self.stages.iter().map(|s| s.stage).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::Severity;

    #[test]
    fn test_stage_order() {
        let ordered = Stage::ordered(&[Stage::Html, Stage::Images, Stage::Css, Stage::Html]);
        assert_eq!(ordered, vec![Stage::Images, Stage::Css, Stage::Html]);
        assert_eq!(Stage::ordered(&Stage::ALL), Stage::ALL.to_vec());
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("images".parse::<Stage>().unwrap(), Stage::Images);
        assert_eq!("JS".parse::<Stage>().unwrap(), Stage::Scripts);
        assert_eq!("scss".parse::<Stage>().unwrap(), Stage::Css);
        assert!("fonts".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Scripts).unwrap(), "\"scripts\"");
    }

    #[test]
    fn test_savings_percent() {
        let mut report = StageReport::new(Stage::Images);
        assert_eq!(report.savings_percent(), 0.0);
        report.record_output(1000, 250);
        assert!((report.savings_percent() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_build_report_cleanliness() {
        let mut css = StageReport::new(Stage::Css);
        css.lint.push(LintMessage {
            file: PathBuf::from("main.scss"),
            line: 3,
            column: 1,
            rule: "no-ids".to_string(),
            severity: Severity::Warn,
            message: "ID selectors are not allowed".to_string(),
        });
        let mut report = BuildReport {
            stages: vec![css],
            ..Default::default()
        };
        assert!(report.is_clean());

        report.stages[0].lint[0].severity = Severity::Error;
        assert!(!report.is_clean());
        assert_eq!(report.lint_errors(), 1);
    }
}
