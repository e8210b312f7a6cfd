//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use visreg_engine::{
    BoundingBox, MemoryBlobStore, PixelBuffer, RawCapture, RegressionCoordinator, RenderFrame,
    Renderer, Result, Viewport, VisregError,
};

pub const WHITE: [u8; 4] = [255, 255, 255, 255];
pub const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Renderer that returns whatever buffer the test scripted
pub struct ScriptedRenderer {
    current: Mutex<PixelBuffer>,
    by_width: Mutex<HashMap<u32, PixelBuffer>>,
    elements: Mutex<HashMap<String, BoundingBox>>,
    viewport: Mutex<Viewport>,
    available: AtomicBool,
    captures: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new(current: PixelBuffer) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(current),
            by_width: Mutex::new(HashMap::new()),
            elements: Mutex::new(HashMap::new()),
            viewport: Mutex::new(Viewport { width: 1024, height: 768 }),
            available: AtomicBool::new(true),
            captures: AtomicUsize::new(0),
        })
    }

    pub fn set_current(&self, buffer: PixelBuffer) {
        *self.current.lock() = buffer;
    }

    /// Buffer returned while the viewport is `width` wide
    pub fn set_for_width(&self, width: u32, buffer: PixelBuffer) {
        self.by_width.lock().insert(width, buffer);
    }

    pub fn add_element(&self, selector: &str, bbox: BoundingBox) {
        self.elements.lock().insert(selector.to_string(), bbox);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render_capture(&self, frame: &RenderFrame) -> Result<RawCapture> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(VisregError::SurfaceUnavailable {
                operation: "capture",
                reason: "renderer offline".into(),
            });
        }
        self.captures.fetch_add(1, Ordering::SeqCst);

        let buffer = self
            .by_width
            .lock()
            .get(&frame.viewport.width)
            .cloned()
            .unwrap_or_else(|| self.current.lock().clone());

        Ok(RawCapture {
            width: buffer.width(),
            height: buffer.height(),
            pixels: buffer.as_bytes().to_vec(),
        })
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<()> {
        *self.viewport.lock() = Viewport { width, height };
        Ok(())
    }

    async fn locate_element(&self, selector: &str) -> Result<Option<BoundingBox>> {
        Ok(self.elements.lock().get(selector).copied())
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.lock()
    }
}

pub type TestCoordinator = RegressionCoordinator<ScriptedRenderer, MemoryBlobStore>;

pub fn coordinator(current: PixelBuffer) -> (TestCoordinator, Arc<ScriptedRenderer>, Arc<MemoryBlobStore>) {
    let renderer = ScriptedRenderer::new(current);
    let blobs = Arc::new(MemoryBlobStore::new());
    let coordinator = RegressionCoordinator::new(renderer.clone(), blobs.clone());
    (coordinator, renderer, blobs)
}

pub fn solid(width: u32, height: u32, color: [u8; 4]) -> PixelBuffer {
    PixelBuffer::filled(width, height, color).unwrap()
}

/// Copy of `base` with the listed pixels recolored
pub fn paint(base: &PixelBuffer, pixels: &[(u32, u32)], color: [u8; 4]) -> PixelBuffer {
    let width = base.width() as usize;
    base.map_pixels(|p| {
        for &(x, y) in pixels {
            let offset = (y as usize * width + x as usize) * 4;
            p[offset..offset + 4].copy_from_slice(&color);
        }
    })
}

/// Copy of `base` with a filled rectangle
pub fn paint_rect(base: &PixelBuffer, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) -> PixelBuffer {
    let pixels: Vec<_> = (y..y + h).flat_map(|py| (x..x + w).map(move |px| (px, py))).collect();
    paint(base, &pixels, color)
}
