//! Regression coordinator: capture, resolve baseline, diff, cluster, verdict
//!
//! This is the API surface callers (CLI, services, protocol adapters) embed.
//! Every operation that takes a test name validates it first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::baseline::{Baseline, BaselineLock, BaselineMetadata, BaselineStore, BaselineStoreOptions};
use crate::blob::{BlobStore, Namespace};
use crate::capture::{CaptureService, CaptureTarget};
use crate::cluster::{self, Region};
use crate::diff::{self, DiffOptions, DiffResult};
use crate::error::{Result, VisregError};
use crate::name::TestName;
use crate::pixel::{CaptureFormat, PixelBuffer};
use crate::render::Renderer;

/// Coordinator configuration
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub baselines: BaselineStoreOptions,
    /// Keep the current capture and the diff image of every comparison
    pub persist_artifacts: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            baselines: BaselineStoreOptions::default(),
            persist_artifacts: true,
        }
    }
}

/// Outcome of comparing a capture against its baseline
#[derive(Debug, Clone, Serialize)]
pub struct RegressionVerdict {
    pub name: TestName,
    pub is_different: bool,
    pub similarity_percent: f64,
    pub total_pixels: u64,
    pub different_pixels: u64,
    pub regions: Vec<Region>,
    /// True when no baseline existed and the capture became the baseline
    pub baseline_created: bool,
    #[serde(skip)]
    pub diff_visualization: Option<PixelBuffer>,
}

impl RegressionVerdict {
    fn bootstrap(name: TestName) -> Self {
        Self {
            name,
            is_different: false,
            similarity_percent: 100.0,
            total_pixels: 0,
            different_pixels: 0,
            regions: Vec::new(),
            baseline_created: true,
            diff_visualization: None,
        }
    }

    fn from_diff(name: TestName, diff: DiffResult, regions: Vec<Region>) -> Self {
        Self {
            name,
            is_different: diff.different_pixels > 0,
            similarity_percent: diff.similarity_percent,
            total_pixels: diff.total_pixels,
            different_pixels: diff.different_pixels,
            regions,
            baseline_created: false,
            diff_visualization: diff.diff_visualization,
        }
    }
}

/// Orchestrates capture, baseline storage and comparison for one rendering surface
pub struct RegressionCoordinator<R, S> {
    capture: CaptureService<R>,
    baselines: BaselineStore<S>,
    blobs: Arc<S>,
    options: CoordinatorOptions,
}

impl<R: Renderer, S: BlobStore> RegressionCoordinator<R, S> {
    pub fn new(renderer: Arc<R>, blobs: Arc<S>) -> Self {
        Self::with_options(renderer, blobs, CoordinatorOptions::default())
    }

    pub fn with_options(renderer: Arc<R>, blobs: Arc<S>, options: CoordinatorOptions) -> Self {
        Self {
            capture: CaptureService::new(renderer),
            baselines: BaselineStore::with_options(blobs.clone(), options.baselines),
            blobs,
            options,
        }
    }

    pub fn capture_service(&self) -> &CaptureService<R> {
        &self.capture
    }

    pub fn baselines(&self) -> &BaselineStore<S> {
        &self.baselines
    }

    /// Capture `target` without comparing
    pub async fn take_screenshot(&self, target: &CaptureTarget, format: &CaptureFormat) -> Result<PixelBuffer> {
        self.capture.capture(target, format).await
    }

    /// Capture `target` at each breakpoint width without comparing
    pub async fn capture_responsive(
        &self,
        target: &CaptureTarget,
        breakpoints: &[u32],
        format: &CaptureFormat,
    ) -> Result<BTreeMap<u32, PixelBuffer>> {
        self.capture.capture_responsive(target, breakpoints, format).await
    }

    /// Capture `target` and compare it against the baseline named `name`.
    ///
    /// If no baseline exists the capture becomes the baseline and the verdict
    /// reports no difference.
    pub async fn compare_with_baseline(
        &self,
        name: &str,
        target: &CaptureTarget,
        options: &DiffOptions,
    ) -> Result<RegressionVerdict> {
        let name = TestName::parse(name)?;
        options.validate()?;

        debug!("Capturing '{}'", name);
        let current = self.capture.capture(target, &CaptureFormat::png()).await?;

        self.evaluate(name, current, options).await
    }

    /// Compare each breakpoint against its own baseline, `<name>-<width>w`
    pub async fn compare_responsive(
        &self,
        name: &str,
        target: &CaptureTarget,
        breakpoints: &[u32],
        options: &DiffOptions,
    ) -> Result<BTreeMap<u32, RegressionVerdict>> {
        let name = TestName::parse(name)?;
        options.validate()?;

        // Validate every derived name before touching the surface
        let names = breakpoints
            .iter()
            .map(|&width| Ok((width, name.at_breakpoint(width)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let captures = self
            .capture
            .capture_responsive(target, breakpoints, &CaptureFormat::png())
            .await?;

        let mut verdicts = BTreeMap::new();
        for (width, current) in captures {
            let name = names
                .get(&width)
                .cloned()
                .ok_or_else(|| VisregError::Internal(format!("no name for breakpoint {}", width)))?;
            let verdict = self.evaluate(name, current, options).await?;
            verdicts.insert(width, verdict);
        }

        Ok(verdicts)
    }

    /// Capture `target` and store it as the baseline for `name`
    pub async fn update_baseline(&self, name: &str, target: &CaptureTarget) -> Result<Baseline> {
        let name = TestName::parse(name)?;
        let current = self.capture.capture(target, &CaptureFormat::png()).await?;
        self.baselines.update(&name, &current).await
    }

    /// Stored baseline buffer for `name`, if any
    pub async fn get_baseline(&self, name: &str) -> Result<Option<PixelBuffer>> {
        let name = TestName::parse(name)?;
        self.baselines.get(&name).await
    }

    pub async fn list_baselines(&self) -> Result<BTreeSet<TestName>> {
        self.baselines.list().await
    }

    /// Metadata of every stored baseline, ordered by name
    pub async fn list_baseline_metadata(&self) -> Result<Vec<BaselineMetadata>> {
        self.baselines.list_metadata().await
    }

    /// Delete the baseline for `name` along with its comparison artifacts.
    ///
    /// Artifacts are removed even when no baseline exists.
    pub async fn delete_baseline(&self, name: &str) -> Result<()> {
        let name = TestName::parse(name)?;
        let lock = self.baselines.lock(&name).await?;

        let result = self.delete_locked(&lock, &name).await;
        drop(lock);
        self.baselines.release(&name);
        result
    }

    async fn delete_locked(&self, lock: &BaselineLock, name: &TestName) -> Result<()> {
        for namespace in [Namespace::Current, Namespace::Diff] {
            if self.blobs.delete_blob(&namespace.image_key(name)).await? {
                debug!("Removed {} artifact for '{}'", namespace.as_str(), name);
            }
        }
        self.baselines.delete_locked(lock, name).await
    }

    /// Stored image for `name` in `namespace`, if any
    pub async fn artifact(&self, namespace: Namespace, name: &str) -> Result<Option<PixelBuffer>> {
        if namespace == Namespace::Baseline {
            return self.get_baseline(name).await;
        }

        let name = TestName::parse(name)?;
        match self.blobs.read_blob(&namespace.image_key(&name)).await? {
            Some(bytes) => Ok(Some(
                PixelBuffer::decode(&bytes).map_err(|e| e.for_test(name.as_str()))?,
            )),
            None => Ok(None),
        }
    }

    async fn evaluate(
        &self,
        name: TestName,
        current: PixelBuffer,
        options: &DiffOptions,
    ) -> Result<RegressionVerdict> {
        // Held until the artifacts are written, so they always come from one run
        let lock = self.baselines.lock(&name).await?;

        let resolved = self
            .baselines
            .get_or_create_locked(&lock, &name, &current)
            .await?;
        if resolved.created {
            info!("No baseline for '{}', stored current capture as baseline", name);
            return Ok(RegressionVerdict::bootstrap(name));
        }

        let baseline = resolved.buffer;
        let diff_input = current.clone();
        let options = *options;

        let (diff, regions) = tokio::task::spawn_blocking(move || -> Result<_> {
            let diff = diff::compare(&baseline, &diff_input, &options)?;
            let regions = cluster::cluster(&diff.differences);
            Ok((diff, regions))
        })
        .await
        .map_err(|e| VisregError::Internal(format!("comparison task failed: {}", e)))?
        .map_err(|e| {
            if let VisregError::DimensionMismatch { baseline, current, .. } = &e {
                warn!(
                    "Baseline '{}' was captured at {}, current capture is {}",
                    name, baseline, current
                );
            }
            e.for_test(name.as_str())
        })?;

        if self.options.persist_artifacts {
            self.persist_artifacts(&name, &current, diff.diff_visualization.as_ref())
                .await?;
        }
        drop(lock);

        if diff.different_pixels > 0 {
            warn!(
                "Visual regression detected in '{}': {} of {} pixels differ ({:.2}% similar), {} region(s)",
                name,
                diff.different_pixels,
                diff.total_pixels,
                diff.similarity_percent,
                regions.len()
            );
        } else {
            debug!("'{}' matches its baseline", name);
        }

        Ok(RegressionVerdict::from_diff(name, diff, regions))
    }

    async fn persist_artifacts(
        &self,
        name: &TestName,
        current: &PixelBuffer,
        diff: Option<&PixelBuffer>,
    ) -> Result<()> {
        let png = CaptureFormat::png();
        self.blobs
            .write_blob(&Namespace::Current.image_key(name), &current.encode(&png)?)
            .await?;

        let diff_key = Namespace::Diff.image_key(name);
        match diff {
            Some(image) => self.blobs.write_blob(&diff_key, &image.encode(&png)?).await?,
            None => {
                if self.blobs.delete_blob(&diff_key).await? {
                    debug!("Removed stale diff artifact for '{}'", name);
                }
            }
        }

        Ok(())
    }
}
