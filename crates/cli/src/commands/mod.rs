//! CLI Commands

pub mod baseline;
pub mod compare;
pub mod screenshot;

use std::sync::Arc;

use clap::Args;
use visreg_engine::{
    CaptureTarget, DiffOptions, FsBlobStore, PlaywrightRenderer, RegressionCoordinator,
};

use crate::config::VisregConfig;
use crate::output::OutputFormat;

pub type Coordinator = RegressionCoordinator<PlaywrightRenderer, FsBlobStore>;

/// Whether a command found everything in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Regression,
}

/// Resolved configuration shared by every command
pub struct Context {
    pub config: VisregConfig,
    pub format: OutputFormat,
}

impl Context {
    /// Coordinator backed by a verified Playwright installation
    pub async fn connect(&self) -> anyhow::Result<Coordinator> {
        let renderer = PlaywrightRenderer::connect(self.config.renderer.playwright()).await?;
        self.build(renderer).await
    }

    /// Coordinator for commands that only touch stored baselines
    pub async fn offline(&self) -> anyhow::Result<Coordinator> {
        self.build(PlaywrightRenderer::new(self.config.renderer.playwright()))
            .await
    }

    async fn build(&self, renderer: PlaywrightRenderer) -> anyhow::Result<Coordinator> {
        let blobs = FsBlobStore::new(&self.config.store_path).await?;
        Ok(RegressionCoordinator::with_options(
            Arc::new(renderer),
            Arc::new(blobs),
            self.config.coordinator_options(),
        ))
    }
}

/// Which part of the page to capture
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Capture only the element matching this CSS selector
    #[arg(long)]
    pub selector: Option<String>,

    /// Extra pixels around the selected element
    #[arg(long, requires = "selector")]
    pub padding: Option<u32>,

    /// Capture the whole page instead of the viewport
    #[arg(long, conflicts_with = "selector")]
    pub full_page: bool,
}

impl From<&TargetArgs> for CaptureTarget {
    fn from(args: &TargetArgs) -> Self {
        CaptureTarget {
            element: args.selector.clone(),
            padding: args.padding,
            full_surface: args.full_page,
        }
    }
}

/// Comparison tuning; unset flags fall back to the `[diff]` config section
#[derive(Args, Debug, Clone, Default)]
pub struct DiffArgs {
    /// Tolerated color distance, 0.0 (exact) to 1.0 (anything goes)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Count anti-aliased pixels as differences (`--include-anti-aliasing=false` turns it off)
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub include_anti_aliasing: Option<bool>,

    /// Highlight color for the diff image, as `r,g,b`
    #[arg(long, value_parser = parse_color)]
    pub diff_color: Option<[u8; 3]>,
}

impl DiffArgs {
    pub fn resolve(&self, defaults: &DiffOptions) -> DiffOptions {
        DiffOptions {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            include_anti_aliasing: self
                .include_anti_aliasing
                .unwrap_or(defaults.include_anti_aliasing),
            diff_color: self.diff_color.unwrap_or(defaults.diff_color),
        }
    }
}

fn parse_color(value: &str) -> Result<[u8; 3], String> {
    let channels = value
        .split(',')
        .map(|c| c.trim().parse::<u8>().map_err(|e| format!("invalid channel '{}': {}", c, e)))
        .collect::<Result<Vec<_>, _>>()?;

    match channels.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(format!("expected r,g,b but got {} channel(s)", channels.len())),
    }
}

/// Parse one breakpoint width of a comma-separated list
pub fn parse_breakpoint(value: &str) -> Result<u32, String> {
    let width = value
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid width '{}': {}", value, e))?;
    if width == 0 {
        return Err("breakpoint width must be positive".to_string());
    }
    Ok(width)
}
