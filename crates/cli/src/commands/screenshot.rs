//! Screenshot command

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Args;
use serde::Serialize;
use visreg_engine::{CaptureFormat, CaptureTarget, ImageEncoding, PixelBuffer};

use super::{parse_breakpoint, Context, Outcome, TargetArgs};
use crate::output::{print_list, TableDisplay};

#[derive(Args, Debug)]
pub struct ScreenshotArgs {
    /// File to write; responsive captures get a `-<width>w` suffix
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Image encoding (png or jpeg)
    #[arg(long, default_value = "png")]
    pub encoding: ImageEncoding,

    /// JPEG quality, 0-100
    #[arg(long)]
    pub quality: Option<u8>,

    /// Capture once per viewport width, e.g. `375,768,1280`
    #[arg(long, value_delimiter = ',', value_parser = parse_breakpoint)]
    pub breakpoints: Vec<u32>,
}

impl ScreenshotArgs {
    fn format(&self) -> CaptureFormat {
        CaptureFormat {
            encoding: self.encoding,
            quality: self.quality,
        }
    }
}

/// Written screenshot, for display
#[derive(Serialize)]
pub struct ScreenshotDisplay {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub digest: String,
}

impl TableDisplay for ScreenshotDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Path", "Width", "Height", "Digest"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.path.clone(),
            self.width.to_string(),
            self.height.to_string(),
            self.digest[..12.min(self.digest.len())].to_string(),
        ]
    }
}

pub async fn execute(args: ScreenshotArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let format = args.format();
    format.validate()?;
    let target = CaptureTarget::from(&args.target);
    let coordinator = ctx.connect().await?;

    let shots = if args.breakpoints.is_empty() {
        let buffer = coordinator.take_screenshot(&target, &format).await?;
        vec![(args.output.clone(), buffer)]
    } else {
        coordinator
            .capture_responsive(&target, &args.breakpoints, &format)
            .await?
            .into_iter()
            .map(|(width, buffer)| (breakpoint_path(&args.output, width), buffer))
            .collect()
    };

    let mut written = Vec::with_capacity(shots.len());
    for (path, buffer) in shots {
        written.push(write_screenshot(&path, &buffer, &format).await?);
    }

    print_list(&written, ctx.format);
    Ok(Outcome::Pass)
}

async fn write_screenshot(
    path: &Path,
    buffer: &PixelBuffer,
    format: &CaptureFormat,
) -> anyhow::Result<ScreenshotDisplay> {
    let bytes = buffer.encode(format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(ScreenshotDisplay {
        path: path.display().to_string(),
        width: buffer.width(),
        height: buffer.height(),
        digest: buffer.digest(),
    })
}

/// `shots/home.png` at 768 becomes `shots/home-768w.png`
fn breakpoint_path(output: &Path, width: u32) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot".to_string());
    let file_name = match output.extension() {
        Some(ext) => format!("{}-{}w.{}", stem, width, ext.to_string_lossy()),
        None => format!("{}-{}w", stem, width),
    };
    output.with_file_name(file_name)
}
