//! visreg visual regression engine
//!
//! Captures rendered surfaces, keeps reference ("baseline") images, diffs a
//! live capture against its baseline and clusters the differing pixels into
//! regions to produce a pass/fail verdict.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RegressionCoordinator                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  compare_with_baseline(name, target, options)               │
//! │    1. CaptureService::capture     -> PixelBuffer            │
//! │    2. BaselineStore::get_or_create -> (baseline, created)   │
//! │    3. diff::compare               -> DiffResult             │
//! │    4. cluster::cluster            -> Vec<Region>            │
//! │    5. RegressionVerdict                                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Renderer (trait)        │  BlobStore (trait)               │
//! │    PlaywrightRenderer    │    FsBlobStore, MemoryBlobStore  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod baseline;
pub mod blob;
pub mod capture;
pub mod cluster;
pub mod coordinator;
pub mod diff;
pub mod error;
pub mod name;
pub mod pixel;
pub mod playwright;
pub mod render;

pub use baseline::{
    Baseline, BaselineLock, BaselineMetadata, BaselineStore, BaselineStoreOptions, WritePolicy,
};
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, Namespace};
pub use capture::{CaptureService, CaptureTarget};
pub use cluster::Region;
pub use coordinator::{CoordinatorOptions, RegressionCoordinator, RegressionVerdict};
pub use diff::{DiffOptions, DiffResult, PixelDifference};
pub use error::{ErrorKind, Result, VisregError};
pub use name::TestName;
pub use pixel::{CaptureFormat, ImageEncoding, PixelBuffer};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightRenderer};
pub use render::{BoundingBox, Framing, RawCapture, RenderFrame, Renderer, Viewport};

/// visreg version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
