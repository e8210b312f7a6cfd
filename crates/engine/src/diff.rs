//! Per-pixel comparison of two equally sized buffers
//!
//! Color distance is measured in YIQ space, which tracks perceived
//! brightness and chroma better than raw RGB. Semi-transparent pixels are
//! blended onto white before measuring. With anti-aliasing exclusion on, a
//! changed pixel is ignored when it looks like an edge-smoothing pixel in
//! either image: its 3x3 neighbourhood holds both a darker and a brighter
//! neighbour, and that extreme neighbour sits inside a flat area in both
//! images.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VisregError};
use crate::pixel::{PixelBuffer, CHANNELS};

/// Largest possible squared YIQ distance between two colors
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Comparison tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Tolerated color distance as a fraction (0..=1) of the largest possible distance
    pub threshold: f64,

    /// Count anti-aliasing pixels as differences
    pub include_anti_aliasing: bool,

    /// Color painted over differing pixels in the visualization
    pub diff_color: [u8; 3],
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_anti_aliasing: false,
            diff_color: [255, 0, 0],
        }
    }
}

impl DiffOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(VisregError::InvalidRequest(format!(
                "threshold must be within 0.0-1.0, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// One pixel flagged as different
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelDifference {
    pub x: u32,
    pub y: u32,
    pub baseline_color: [u8; 4],
    pub current_color: [u8; 4],
}

/// Outcome of a comparison
#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub total_pixels: u64,
    pub different_pixels: u64,
    pub similarity_percent: f64,
    /// Differing pixels in row-major order
    pub differences: Vec<PixelDifference>,
    /// Present iff at least one pixel differs
    #[serde(skip)]
    pub diff_visualization: Option<PixelBuffer>,
}

impl DiffResult {
    pub fn is_identical(&self) -> bool {
        self.different_pixels == 0
    }

    fn identical(total_pixels: u64) -> Self {
        Self {
            total_pixels,
            different_pixels: 0,
            similarity_percent: 100.0,
            differences: Vec::new(),
            diff_visualization: None,
        }
    }
}

/// Compare `current` against `baseline`
pub fn compare(baseline: &PixelBuffer, current: &PixelBuffer, options: &DiffOptions) -> Result<DiffResult> {
    options.validate()?;

    if baseline.dimensions() != current.dimensions() {
        return Err(VisregError::DimensionMismatch {
            name: None,
            baseline: baseline.dimensions(),
            current: current.dimensions(),
        });
    }

    let total_pixels = baseline.pixel_count();
    if baseline.as_bytes() == current.as_bytes() {
        debug!("Buffers are byte-identical, skipping per-pixel pass");
        return Ok(DiffResult::identical(total_pixels));
    }

    let base = Image::new(baseline);
    let curr = Image::new(current);
    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;

    let mut differences = Vec::new();
    let mut anti_aliased = 0u64;

    for y in 0..base.height {
        for x in 0..base.width {
            let a = base.get(x, y);
            let b = curr.get(x, y);
            if a == b {
                continue;
            }

            // Strictly greater: a distance equal to the threshold is tolerated
            if color_delta(a, b) <= max_delta {
                continue;
            }

            if !options.include_anti_aliasing
                && (is_anti_aliased(&base, &curr, x, y) || is_anti_aliased(&curr, &base, x, y))
            {
                anti_aliased += 1;
                continue;
            }

            differences.push(PixelDifference {
                x,
                y,
                baseline_color: a,
                current_color: b,
            });
        }
    }

    let different_pixels = differences.len() as u64;
    let similarity_percent =
        ((total_pixels - different_pixels) as f64 / total_pixels as f64 * 100.0).clamp(0.0, 100.0);

    debug!(
        "Compared {} pixels: {} different, {} anti-aliased ignored",
        total_pixels, different_pixels, anti_aliased
    );

    let diff_visualization = if differences.is_empty() {
        None
    } else {
        Some(render_visualization(baseline, &differences, options.diff_color))
    };

    Ok(DiffResult {
        total_pixels,
        different_pixels,
        similarity_percent,
        differences,
        diff_visualization,
    })
}

/// Transparent image with `color` painted over every difference
fn render_visualization(like: &PixelBuffer, differences: &[PixelDifference], color: [u8; 3]) -> PixelBuffer {
    let width = like.width() as usize;
    let mut pixels = vec![0u8; like.as_bytes().len()];
    for d in differences {
        let offset = (d.y as usize * width + d.x as usize) * CHANNELS;
        pixels[offset..offset + CHANNELS].copy_from_slice(&[color[0], color[1], color[2], 255]);
    }
    // Same dimensions as an already valid buffer
    like.map_pixels(|p| p.copy_from_slice(&pixels))
}

/// Borrowed view over a buffer's pixels
struct Image<'a> {
    width: u32,
    height: u32,
    bytes: &'a [u8],
}

impl<'a> Image<'a> {
    fn new(buffer: &'a PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            bytes: buffer.as_bytes(),
        }
    }

    fn get(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            self.bytes[offset + 3],
        ]
    }

    /// Inclusive 3x3 window around (x, y), clipped to the image
    fn window(&self, x: u32, y: u32) -> (u32, u32, u32, u32) {
        (
            x.saturating_sub(1),
            y.saturating_sub(1),
            (x + 1).min(self.width - 1),
            (y + 1).min(self.height - 1),
        )
    }
}

fn blend(channel: u8, alpha: f64) -> f64 {
    255.0 + (channel as f64 - 255.0) * alpha
}

fn to_opaque(c: [u8; 4]) -> (f64, f64, f64) {
    let alpha = c[3] as f64 / 255.0;
    if c[3] == 255 {
        (c[0] as f64, c[1] as f64, c[2] as f64)
    } else {
        (blend(c[0], alpha), blend(c[1], alpha), blend(c[2], alpha))
    }
}

fn luma(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn in_phase(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_1 - b * 0.321_801_89
}

fn quadrature(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

/// Squared YIQ distance, symmetric in its arguments
fn color_delta(a: [u8; 4], b: [u8; 4]) -> f64 {
    let (r1, g1, b1) = to_opaque(a);
    let (r2, g2, b2) = to_opaque(b);

    let y = luma(r1, g1, b1) - luma(r2, g2, b2);
    let i = in_phase(r1, g1, b1) - in_phase(r2, g2, b2);
    let q = quadrature(r1, g1, b1) - quadrature(r2, g2, b2);

    0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q
}

/// Signed brightness change from `a` to `b`
fn brightness_delta(a: [u8; 4], b: [u8; 4]) -> f64 {
    let (r1, g1, b1) = to_opaque(a);
    let (r2, g2, b2) = to_opaque(b);
    luma(r2, g2, b2) - luma(r1, g1, b1)
}

fn on_border(image: &Image<'_>, x: u32, y: u32) -> bool {
    x == 0 || y == 0 || x == image.width - 1 || y == image.height - 1
}

/// Whether (x, y) in `image` looks like an anti-aliasing pixel, using `other`
/// to confirm that its extreme neighbours are flat in both images
fn is_anti_aliased(image: &Image<'_>, other: &Image<'_>, x: u32, y: u32) -> bool {
    let (x0, y0, x2, y2) = image.window(x, y);
    let center = image.get(x, y);

    let mut equal = u32::from(on_border(image, x, y));
    let mut darkest = (0.0, x, y);
    let mut brightest = (0.0, x, y);

    for ny in y0..=y2 {
        for nx in x0..=x2 {
            if nx == x && ny == y {
                continue;
            }

            let delta = brightness_delta(center, image.get(nx, ny));
            if delta == 0.0 {
                equal += 1;
                // Too many identical neighbours: a real change, not an edge
                if equal > 2 {
                    return false;
                }
            } else if delta < darkest.0 {
                darkest = (delta, nx, ny);
            } else if delta > brightest.0 {
                brightest = (delta, nx, ny);
            }
        }
    }

    // Anti-aliasing sits between a darker and a brighter neighbour
    if darkest.0 == 0.0 || brightest.0 == 0.0 {
        return false;
    }

    let flat_in_both =
        |px: u32, py: u32| has_many_siblings(image, px, py) && has_many_siblings(other, px, py);

    flat_in_both(darkest.1, darkest.2) || flat_in_both(brightest.1, brightest.2)
}

/// Whether (x, y) has at least three identical neighbours (image border counts as one)
fn has_many_siblings(image: &Image<'_>, x: u32, y: u32) -> bool {
    let (x0, y0, x2, y2) = image.window(x, y);
    let center = image.get(x, y);

    let mut equal = u32::from(on_border(image, x, y));
    for ny in y0..=y2 {
        for nx in x0..=x2 {
            if nx == x && ny == y {
                continue;
            }
            if image.get(nx, ny) == center {
                equal += 1;
                if equal > 2 {
                    return true;
                }
            }
        }
    }

    false
}
