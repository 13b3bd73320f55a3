//! Machine-readable build reports.
//!
//! `kiln build --report json` prints the whole [`BuildReport`] as one JSON
//! document; `--report jsonl` prints one line per stage followed by a
//! summary line, which is easier to stream into log collectors.

use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

use crate::types::{BuildReport, StageReport};

/// Report format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// A single JSON document
    Json,
    /// One JSON object per line
    JsonLines,
}

impl ReportFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Closing line of a JSONL report.
#[derive(Debug, Serialize)]
struct Summary<'a> {
    summary: bool,
    dist_dir: &'a Path,
    duration_ms: u64,
    failed: usize,
    lint_errors: usize,
    clean: bool,
}

impl<'a> From<&'a BuildReport> for Summary<'a> {
    fn from(report: &'a BuildReport) -> Self {
        Self {
            summary: true,
            dist_dir: &report.dist_dir,
            duration_ms: report.duration_ms,
            failed: report.failed(),
            lint_errors: report.lint_errors(),
            clean: report.is_clean(),
        }
    }
}

/// Serializes build reports to a writer.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: ReportFormat,
    pretty: bool,
}

impl<W: Write> ReportWriter<W> {
    /// `pretty` only affects the JSON format; JSONL is always one object per line.
    pub fn new(writer: W, format: ReportFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    /// Write a complete build report.
    pub fn write_report(&mut self, report: &BuildReport) -> io::Result<()> {
        match self.format {
            ReportFormat::Json => self.write_json(report)?,
            ReportFormat::JsonLines => {
                for stage in &report.stages {
                    self.write_stage(stage)?;
                }
                self.write_line(&Summary::from(report))?;
            }
        }
        self.writer.flush()
    }

    /// Write a single stage report as one line.
    pub fn write_stage(&mut self, stage: &StageReport) -> io::Result<()> {
        self.write_line(stage)
    }

    fn write_json<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)
    }

    fn write_line<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        writeln!(self.writer)
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Serialize a build report to a string in the given format.
pub fn render_report(report: &BuildReport, format: ReportFormat) -> io::Result<String> {
    let mut writer = ReportWriter::new(Vec::new(), format, true);
    writer.write_report(report)?;
    String::from_utf8(writer.into_inner()).map_err(io::Error::other)
}
