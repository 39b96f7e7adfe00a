//! Run Command

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use qbank_contract::runner::{RunReport, RunnerConfig, SuiteReport};
use qbank_contract::{ContractRunner, HarnessConfig};

use crate::output::{print_document, print_failure, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct RunArgs {
    /// Directory containing suite YAML files
    #[arg(long, default_value = "suites")]
    pub suites: PathBuf,

    /// Only run suites carrying this tag
    #[arg(long, conflicts_with = "name")]
    pub tag: Option<String>,

    /// Only run the suite with this name
    #[arg(long)]
    pub name: Option<String>,

    /// Suites run at the same time
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Directory for test-results.json
    #[arg(long, default_value = "test-results")]
    pub output: PathBuf,
}

/// One suite as shown in the results table
#[derive(Serialize)]
pub struct SuiteRow {
    pub name: String,
    pub passed: bool,
    pub steps: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl From<&SuiteReport> for SuiteRow {
    fn from(report: &SuiteReport) -> Self {
        let passed_steps = report.steps.iter().filter(|s| s.success).count();
        Self {
            name: report.name.clone(),
            passed: report.success,
            steps: format!("{}/{}", passed_steps, report.steps.len()),
            duration_ms: report.duration_ms,
            error: report.error.clone(),
        }
    }
}

impl TableDisplay for SuiteRow {
    fn headers() -> Vec<&'static str> {
        vec!["Suite", "Result", "Steps", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.passed { "PASS".into() } else { "FAIL".into() },
            self.steps.clone(),
            format!("{}ms", self.duration_ms),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

/// 0 when every suite passed, 1 otherwise
pub fn exit_code(report: &RunReport) -> ExitCode {
    if report.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

pub async fn execute(args: &RunArgs, harness: HarnessConfig, format: OutputFormat) -> Result<ExitCode> {
    let runner = ContractRunner::with_config(RunnerConfig {
        harness,
        suites_dir: args.suites.clone(),
        output_dir: args.output.clone(),
        concurrency: args.concurrency.max(1),
    });

    let report = match (&args.name, &args.tag) {
        (Some(name), _) => {
            let suite = runner.run_named(name).await?;
            let duration_ms = suite.duration_ms;
            RunReport::from_suites(vec![suite], duration_ms)
        }
        (None, Some(tag)) => runner.run_tagged(tag).await?,
        (None, None) => runner.run_all().await?,
    };

    if report.total == 0 {
        print_warning(&format!("No suites found in {}", args.suites.display()));
    }
    let path = runner.write_report(&report)?;

    match format {
        OutputFormat::Table => {
            let rows: Vec<SuiteRow> = report.suites.iter().map(SuiteRow::from).collect();
            print_list(&rows, format);
            let summary = format!(
                "{} passed, {} failed ({} ms) - results in {}",
                report.passed,
                report.failed,
                report.duration_ms,
                path.display()
            );
            if report.failed == 0 {
                print_success(&summary);
            } else {
                print_failure(&summary);
            }
        }
        _ => print_document(&report, format),
    }

    Ok(exit_code(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbank_contract::runner::StepReport;

    fn suite(success: bool) -> SuiteReport {
        let step = |index: usize, success: bool| StepReport {
            index,
            label: format!("step {}", index),
            success,
            status: Some(201),
            duration_ms: 1,
            failures: vec![],
            error: None,
        };
        SuiteReport {
            name: "mcq-lifecycle".into(),
            success,
            duration_ms: 12,
            steps: vec![step(0, true), step(1, success)],
            error: (!success).then(|| "step 1 failed".to_string()),
        }
    }

    #[test]
    fn test_suite_row() {
        let row = SuiteRow::from(&suite(false));
        assert_eq!(row.steps, "1/2");
        assert_eq!(row.row()[1], "FAIL");
        assert_eq!(row.row()[4], "step 1 failed");
    }

    #[test]
    fn test_exit_code_reflects_failures() {
        let passing = RunReport::from_suites(vec![suite(true)], 1);
        let failing = RunReport::from_suites(vec![suite(true), suite(false)], 1);
        assert_eq!(exit_code(&passing), ExitCode::SUCCESS);
        assert_eq!(exit_code(&failing), ExitCode::FAILURE);
    }
}
