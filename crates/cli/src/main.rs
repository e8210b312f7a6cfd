//! visreg CLI - Main Entry Point
//!
//! Captures pages through Playwright and compares them against stored
//! baselines. Exits with 0 when everything matches, 1 when a regression
//! was detected and 2 on any error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use visreg_engine::Browser;

mod commands;
mod config;
mod output;

use commands::{baseline, compare, screenshot, Context, Outcome};
use config::VisregConfig;

/// visreg - visual regression testing for web pages
#[derive(Parser)]
#[command(name = "visreg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "visreg.toml", global = true)]
    config: PathBuf,

    /// Page to capture (overrides `renderer.base_url`)
    #[arg(long, env = "VISREG_URL", global = true)]
    url: Option<String>,

    /// Browser engine (overrides `renderer.browser`)
    #[arg(long, global = true)]
    browser: Option<Browser>,

    /// Baseline store directory (overrides `store_path`)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a screenshot without comparing
    Screenshot(screenshot::ScreenshotArgs),

    /// Capture and compare against a baseline
    Compare(compare::CompareArgs),

    /// Capture and compare at several viewport widths
    Responsive(compare::ResponsiveArgs),

    /// Capture and store as the new baseline
    Update(baseline::UpdateArgs),

    /// List stored baselines
    List,

    /// Delete a baseline and its artifacts
    Delete(baseline::DeleteArgs),
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<VisregConfig> {
        let mut config = VisregConfig::load(&self.config)?;
        if let Some(url) = &self.url {
            config.renderer.base_url = url.clone();
        }
        if let Some(browser) = self.browser {
            config.renderer.browser = browser;
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let ctx = Context {
        config: cli.load_config()?,
        format: cli.format,
    };

    match cli.command {
        Commands::Screenshot(args) => screenshot::execute(args, &ctx).await,
        Commands::Compare(args) => compare::execute(args, &ctx).await,
        Commands::Responsive(args) => compare::execute_responsive(args, &ctx).await,
        Commands::Update(args) => baseline::update(args, &ctx).await,
        Commands::List => baseline::list(&ctx).await,
        Commands::Delete(args) => baseline::delete(args, &ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(Outcome::Pass) => ExitCode::SUCCESS,
        Ok(Outcome::Regression) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
