//! The `kiln build` command: run the pipeline once and report.

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kiln_core::lint::format_stylish;
use kiln_core::{
    BuildMode, BuildReport, Config, Kiln, Pipeline, ReportFormat, ReportWriter, Stage, StageEvent,
    StageReport,
};
use std::time::Duration;

/// Machine-readable report formats for `--report`.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportArg {
    /// Single JSON document
    Json,
    /// One JSON object per stage, then a summary line
    Jsonl,
}

impl From<ReportArg> for ReportFormat {
    fn from(arg: ReportArg) -> Self {
        match arg {
            ReportArg::Json => ReportFormat::Json,
            ReportArg::Jsonl => ReportFormat::JsonLines,
        }
    }
}

/// Arguments for the `build` command.
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Build into the production directory
    #[arg(long, conflicts_with = "staging")]
    pub production: bool,

    /// Build into the staging directory (the default)
    #[arg(long)]
    pub staging: bool,

    /// Only run these stages: images, css, scripts, html
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub only: Vec<Stage>,

    /// Exit non-zero if any file failed or any lint error was found
    #[arg(long)]
    pub strict: bool,

    /// Print a machine-readable build report to stdout
    #[arg(long, value_enum)]
    pub report: Option<ReportArg>,
}

/// Execute the build command.
pub async fn execute(args: BuildArgs, mut config: Config) -> anyhow::Result<()> {
    if args.production {
        config.project.mode = BuildMode::Production;
    } else if args.staging {
        config.project.mode = BuildMode::Staging;
    }
    let stages = if args.only.is_empty() {
        Stage::ALL.to_vec()
    } else {
        args.only.clone()
    };

    let kiln = Kiln::new(config)?;
    let report = run_build(kiln.pipeline(), &stages).await?;
    print_lint(&report);
    print_summary(&report);

    if let Some(format) = args.report {
        let stdout = std::io::stdout();
        ReportWriter::new(stdout.lock(), format.into(), true).write_report(&report)?;
    }

    if args.strict && !report.is_clean() {
        anyhow::bail!(
            "build finished with {} failed file(s) and {} lint error(s)",
            report.failed(),
            report.lint_errors()
        );
    }
    Ok(())
}

/// Run stages with a spinner and one status line per stage.
pub(crate) async fn run_build(pipeline: &Pipeline, stages: &[Stage]) -> anyhow::Result<BuildReport> {
    let spinner = create_spinner();
    let report = pipeline
        .run_with(stages, |event| match event {
            StageEvent::Started(stage) => spinner.set_message(format!("{stage}...")),
            StageEvent::Finished(stage_report) => spinner.println(stage_line(stage_report)),
            StageEvent::Skipped(stage) => {
                spinner.println(format!("  {} {:<8} disabled", style("-").dim(), stage))
            }
        })
        .await?;
    spinner.finish_and_clear();
    Ok(report)
}

fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(template);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn stage_line(report: &StageReport) -> String {
    let mark = if report.failed > 0 {
        style("✗").red()
    } else if report.lint_errors() > 0 {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    format!(
        "  {} {:<8} {} file(s) in {} ms",
        mark, report.stage, report.processed, report.duration_ms
    )
}

/// Print lint findings in the grouped "stylish" layout.
pub(crate) fn print_lint(report: &BuildReport) {
    let messages: Vec<_> = report
        .stages
        .iter()
        .flat_map(|s| s.lint.iter().cloned())
        .collect();
    if messages.is_empty() {
        return;
    }
    let heading = if report.lint_errors() > 0 {
        style("Lint").red().bold()
    } else {
        style("Lint").yellow().bold()
    };
    eprintln!("\n{heading}");
    eprintln!("{}", format_stylish(&messages));
}

/// Print a formatted summary table after a build.
pub(crate) fn print_summary(report: &BuildReport) {
    eprintln!();
    eprintln!("  ==================================================================");
    eprintln!(
        "    {:<8} {:>7} {:>7} {:>6} {:>11} {:>11} {:>7}",
        "Stage", "Written", "Skipped", "Failed", "In", "Out", "Saved"
    );
    eprintln!("  ------------------------------------------------------------------");
    for stage in &report.stages {
        eprintln!(
            "    {:<8} {:>7} {:>7} {:>6} {:>11} {:>11} {:>6.1}%",
            stage.stage.name(),
            stage.processed,
            stage.skipped,
            stage.failed,
            format_bytes(stage.bytes_in),
            format_bytes(stage.bytes_out),
            stage.savings_percent()
        );
    }
    eprintln!("  ------------------------------------------------------------------");
    eprintln!("    Output:   {}", report.dist_dir.display());
    eprintln!("    Duration: {:.1}s", report.duration_ms as f64 / 1000.0);
    if report.failed() > 0 {
        eprintln!("    {}", style(format!("{} file(s) failed", report.failed())).red());
        for failure in report.stages.iter().flat_map(|s| &s.failures) {
            eprintln!("      {}: {}", failure.path.display(), failure.message);
        }
    }
    eprintln!("  ==================================================================");
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }

    #[test]
    fn test_report_arg_maps_to_core_format() {
        assert_eq!(ReportFormat::from(ReportArg::Json), ReportFormat::Json);
        assert_eq!(ReportFormat::from(ReportArg::Jsonl), ReportFormat::JsonLines);
    }

    #[tokio::test]
    async fn test_strict_build_fails_on_broken_source() {
        let dir = tempfile::tempdir().unwrap();
        let scss = dir.path().join("src/assets/scss");
        std::fs::create_dir_all(&scss).unwrap();
        std::fs::write(scss.join("main.scss"), ".a { color: $missing; }").unwrap();

        let mut config = Config::default();
        config.project.src = dir.path().join("src");
        config.project.dist_staging = dir.path().join("dist/staging");

        let args = BuildArgs {
            only: vec![Stage::Css],
            strict: true,
            ..BuildArgs::default()
        };
        assert!(execute(args, config.clone()).await.is_err());

        let lenient = BuildArgs {
            only: vec![Stage::Css],
            ..BuildArgs::default()
        };
        assert!(execute(lenient, config).await.is_ok());
    }
}
