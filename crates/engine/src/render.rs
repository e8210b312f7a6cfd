//! Rendering collaborator interface
//!
//! The engine never renders anything itself. A [`Renderer`] owns one
//! rendering surface (a browser page, a headless compositor, a test double)
//! and produces raw RGBA frames on request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pixel::CaptureFormat;

/// Viewport size of a rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// Axis-aligned box in surface coordinates (CSS pixels for browsers)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Grow the box by `padding` on every side without going below zero
    pub fn padded(&self, padding: u32) -> Self {
        let padding = padding as f64;
        let x = (self.x - padding).max(0.0);
        let y = (self.y - padding).max(0.0);
        Self {
            x,
            y,
            width: self.x + self.width + padding - x,
            height: self.y + self.height + padding - y,
        }
    }
}

/// What part of the surface to capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Framing {
    /// The whole scrollable surface
    FullSurface,
    /// Only what is visible in the viewport
    Viewport,
    /// A clipped rectangle
    Clip(BoundingBox),
}

/// A single capture request handed to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub framing: Framing,
    pub viewport: Viewport,
    pub format: CaptureFormat,
}

/// Unvalidated frame as produced by the renderer
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// The rendering surface the engine captures from.
///
/// Implementations report an unreachable surface as
/// `VisregError::SurfaceUnavailable`. Calls against one surface must not
/// overlap; [`crate::capture::CaptureService`] serializes them.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the requested frame into raw RGBA bytes
    async fn render_capture(&self, frame: &RenderFrame) -> Result<RawCapture>;

    /// Resize the surface viewport
    async fn resize_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Bounding box of the first element matching `selector`, if any
    async fn locate_element(&self, selector: &str) -> Result<Option<BoundingBox>>;

    /// Current viewport size
    fn viewport(&self) -> Viewport;
}
