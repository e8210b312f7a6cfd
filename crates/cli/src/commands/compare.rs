//! Compare and responsive commands

use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use visreg_engine::{CaptureTarget, RegressionVerdict};

use super::{parse_breakpoint, Context, DiffArgs, Outcome, TargetArgs};
use crate::output::{print_list, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Baseline name
    pub name: String,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub diff: DiffArgs,
}

#[derive(Args, Debug)]
pub struct ResponsiveArgs {
    /// Base name; each width compares against `<name>-<width>w`
    pub name: String,

    /// Viewport widths, e.g. `375,768,1280`
    #[arg(long, required = true, value_delimiter = ',', value_parser = parse_breakpoint)]
    pub breakpoints: Vec<u32>,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub diff: DiffArgs,
}

/// Verdict row, optionally tagged with its breakpoint
#[derive(Serialize)]
pub struct VerdictDisplay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint: Option<u32>,
    #[serde(flatten)]
    pub verdict: RegressionVerdict,
}

impl VerdictDisplay {
    fn status(&self) -> String {
        if self.verdict.baseline_created {
            "NEW".cyan().bold().to_string()
        } else if self.verdict.is_different {
            "FAIL".red().bold().to_string()
        } else {
            "PASS".green().bold().to_string()
        }
    }
}

impl TableDisplay for VerdictDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Status", "Similarity", "Different", "Regions"]
    }

    fn row(&self) -> Vec<String> {
        let regions = self
            .verdict
            .regions
            .iter()
            .map(|r| format!("{}x{}@{},{}", r.width, r.height, r.x, r.y))
            .collect::<Vec<_>>()
            .join(" ");

        vec![
            self.verdict.name.to_string(),
            self.status(),
            format!("{:.2}%", self.verdict.similarity_percent),
            format!("{}/{}", self.verdict.different_pixels, self.verdict.total_pixels),
            if regions.is_empty() { "-".to_string() } else { regions },
        ]
    }
}

pub async fn execute(args: CompareArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let options = args.diff.resolve(&ctx.config.diff);
    debug!("Comparing '{}' with {:?}", args.name, options);

    let coordinator = ctx.connect().await?;
    let verdict = coordinator
        .compare_with_baseline(&args.name, &CaptureTarget::from(&args.target), &options)
        .await?;

    report(
        vec![VerdictDisplay {
            breakpoint: None,
            verdict,
        }],
        ctx.format,
    )
}

pub async fn execute_responsive(args: ResponsiveArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let options = args.diff.resolve(&ctx.config.diff);
    let coordinator = ctx.connect().await?;

    let verdicts = coordinator
        .compare_responsive(
            &args.name,
            &CaptureTarget::from(&args.target),
            &args.breakpoints,
            &options,
        )
        .await?;

    let rows = verdicts
        .into_iter()
        .map(|(width, verdict)| VerdictDisplay {
            breakpoint: Some(width),
            verdict,
        })
        .collect();

    report(rows, ctx.format)
}

fn report(rows: Vec<VerdictDisplay>, format: OutputFormat) -> anyhow::Result<Outcome> {
    print_list(&rows, format);

    let outcome = outcome_of(&rows);
    if outcome == Outcome::Regression && matches!(format, OutputFormat::Table) {
        let failed = rows.iter().filter(|r| r.verdict.is_different).count();
        print_warning(&format!("{} of {} comparison(s) differ from their baseline", failed, rows.len()));
    }
    Ok(outcome)
}

fn outcome_of(rows: &[VerdictDisplay]) -> Outcome {
    if rows.iter().any(|r| r.verdict.is_different) {
        Outcome::Regression
    } else {
        Outcome::Pass
    }
}
