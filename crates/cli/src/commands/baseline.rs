//! Baseline management commands

use clap::Args;
use serde::Serialize;
use visreg_engine::{Baseline, BaselineMetadata, CaptureTarget};

use super::{Context, Coordinator, Outcome, TargetArgs};
use crate::output::{print_item, print_list, print_success, TableDisplay};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Baseline name
    pub name: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Baseline name
    pub name: String,
}

/// Baseline display wrapper for serialization
#[derive(Debug, Serialize)]
pub struct BaselineDisplay {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub digest: String,
    pub created_at: String,
    pub updated_at: String,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl From<BaselineMetadata> for BaselineDisplay {
    fn from(meta: BaselineMetadata) -> Self {
        Self {
            name: meta.name.to_string(),
            width: meta.width,
            height: meta.height,
            digest: meta.digest,
            created_at: meta.created_at.format(TIMESTAMP_FORMAT).to_string(),
            updated_at: meta.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl From<&Baseline> for BaselineDisplay {
    fn from(baseline: &Baseline) -> Self {
        Self {
            name: baseline.name.to_string(),
            width: baseline.buffer.width(),
            height: baseline.buffer.height(),
            digest: baseline.buffer.digest(),
            created_at: baseline.created_at.format(TIMESTAMP_FORMAT).to_string(),
            updated_at: baseline.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl TableDisplay for BaselineDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Size", "Digest", "Updated"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format!("{}x{}", self.width, self.height),
            self.digest[..12.min(self.digest.len())].to_string(),
            self.updated_at.clone(),
        ]
    }
}

pub async fn update(args: UpdateArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let coordinator = ctx.connect().await?;
    let baseline = coordinator
        .update_baseline(&args.name, &CaptureTarget::from(&args.target))
        .await?;

    print_item(&BaselineDisplay::from(&baseline), ctx.format);
    Ok(Outcome::Pass)
}

pub async fn list(ctx: &Context) -> anyhow::Result<Outcome> {
    let coordinator = ctx.offline().await?;

    print_list(&rows(&coordinator).await?, ctx.format);
    Ok(Outcome::Pass)
}

/// One row per committed baseline, straight from its metadata
async fn rows(coordinator: &Coordinator) -> anyhow::Result<Vec<BaselineDisplay>> {
    Ok(coordinator
        .list_baseline_metadata()
        .await?
        .into_iter()
        .map(BaselineDisplay::from)
        .collect())
}

pub async fn delete(args: DeleteArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let coordinator = ctx.offline().await?;
    coordinator.delete_baseline(&args.name).await?;

    print_success(&format!("Baseline '{}' deleted", args.name));
    Ok(Outcome::Pass)
}
