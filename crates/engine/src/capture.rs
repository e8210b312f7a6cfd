//! Capture service: turns capture targets into pixel buffers

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, VisregError};
use crate::pixel::{CaptureFormat, PixelBuffer};
use crate::render::{Framing, RenderFrame, Renderer, Viewport};

/// What to capture from the rendering surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    /// Capture only the element matching this selector
    #[serde(default)]
    pub element: Option<String>,

    /// Extra pixels around the element on every side
    #[serde(default)]
    pub padding: Option<u32>,

    /// Capture the whole surface instead of the visible viewport
    #[serde(default)]
    pub full_surface: bool,
}

impl CaptureTarget {
    pub fn viewport() -> Self {
        Self::default()
    }

    pub fn full_surface() -> Self {
        Self {
            full_surface: true,
            ..Self::default()
        }
    }

    pub fn element(selector: impl Into<String>) -> Self {
        Self {
            element: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = Some(padding);
        self
    }
}

/// Requests pixel buffers from a single rendering surface.
///
/// Every call holds the surface lock for its whole duration, so captures and
/// viewport resizes on one surface never interleave.
pub struct CaptureService<R> {
    renderer: Arc<R>,
    surface: Mutex<()>,
}

impl<R: Renderer> CaptureService<R> {
    pub fn new(renderer: Arc<R>) -> Self {
        Self {
            renderer,
            surface: Mutex::new(()),
        }
    }

    pub fn renderer(&self) -> &Arc<R> {
        &self.renderer
    }

    /// Capture one buffer of `target` in the given format
    pub async fn capture(&self, target: &CaptureTarget, format: &CaptureFormat) -> Result<PixelBuffer> {
        format.validate()?;
        let _surface = self.surface.lock().await;
        self.capture_locked(target, format).await
    }

    /// Capture `target` once per breakpoint width, in the given order.
    ///
    /// The viewport height is kept fixed at its current value and the
    /// original viewport is restored afterwards. Repeated widths are
    /// captured once.
    pub async fn capture_responsive(
        &self,
        target: &CaptureTarget,
        breakpoints: &[u32],
        format: &CaptureFormat,
    ) -> Result<BTreeMap<u32, PixelBuffer>> {
        format.validate()?;
        if breakpoints.is_empty() {
            return Err(VisregError::InvalidRequest("no breakpoints given".into()));
        }
        if breakpoints.contains(&0) {
            return Err(VisregError::InvalidRequest(
                "breakpoint widths must be non-zero".into(),
            ));
        }

        let _surface = self.surface.lock().await;
        let original = self.renderer.viewport();

        let result = self
            .capture_breakpoints(target, breakpoints, original, format)
            .await;

        let restored = self
            .renderer
            .resize_viewport(original.width, original.height)
            .await;

        match (result, restored) {
            (Ok(captures), Ok(())) => Ok(captures),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), restored) => {
                if let Err(restore_err) = restored {
                    warn!("Failed to restore viewport after responsive capture: {}", restore_err);
                }
                Err(e)
            }
        }
    }

    async fn capture_breakpoints(
        &self,
        target: &CaptureTarget,
        breakpoints: &[u32],
        original: Viewport,
        format: &CaptureFormat,
    ) -> Result<BTreeMap<u32, PixelBuffer>> {
        let mut captures = BTreeMap::new();

        for &width in breakpoints {
            if captures.contains_key(&width) {
                debug!("Skipping repeated breakpoint {}", width);
                continue;
            }

            debug!("Capturing breakpoint {}x{}", width, original.height);
            self.renderer.resize_viewport(width, original.height).await?;
            let buffer = self.capture_locked(target, format).await?;
            captures.insert(width, buffer);
        }

        Ok(captures)
    }

    async fn capture_locked(&self, target: &CaptureTarget, format: &CaptureFormat) -> Result<PixelBuffer> {
        let framing = match &target.element {
            Some(selector) => {
                let bbox = self
                    .renderer
                    .locate_element(selector)
                    .await?
                    .ok_or_else(|| VisregError::ElementNotFound {
                        selector: selector.clone(),
                    })?;
                let clip = match target.padding {
                    Some(padding) => bbox.padded(padding),
                    None => bbox,
                };
                debug!("Element {} resolved to {:?}", selector, clip);
                Framing::Clip(clip)
            }
            None if target.full_surface => Framing::FullSurface,
            None => Framing::Viewport,
        };

        let frame = RenderFrame {
            framing,
            viewport: self.renderer.viewport(),
            format: *format,
        };

        let raw = self.renderer.render_capture(&frame).await?;
        let buffer = PixelBuffer::new(raw.width, raw.height, raw.pixels)?;
        debug!("Captured {}x{} buffer", buffer.width(), buffer.height());
        Ok(buffer)
    }
}
