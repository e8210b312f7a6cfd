//! Groups differing pixels into rectangular regions
//!
//! Connected components are found by breadth-first search over the sparse
//! set of differing coordinates using 4-connectivity. Only the difference
//! set is visited, never the full image.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::diff::PixelDifference;

/// Bounding box of one cluster of differing pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

/// Running bounds of a component
struct Bounds {
    min_x: u32,
    max_x: u32,
    min_y: u32,
    max_y: u32,
}

impl Bounds {
    fn at(x: u32, y: u32) -> Self {
        Self { min_x: x, max_x: x, min_y: y, max_y: y }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    fn region(&self) -> Region {
        Region {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
        }
    }
}

/// Cluster differences into regions sorted by their top-left corner (y, then x).
///
/// Components whose bounding box is one pixel wide or one pixel tall are
/// dropped as noise.
pub fn cluster(differences: &[PixelDifference]) -> Vec<Region> {
    let points: HashSet<(u32, u32)> = differences.iter().map(|d| (d.x, d.y)).collect();
    let mut visited: HashSet<(u32, u32)> = HashSet::with_capacity(points.len());
    let mut queue = VecDeque::new();
    let mut regions = Vec::new();

    for d in differences {
        let start = (d.x, d.y);
        if !visited.insert(start) {
            continue;
        }

        let mut bounds = Bounds::at(d.x, d.y);
        queue.push_back(start);

        while let Some((x, y)) = queue.pop_front() {
            bounds.include(x, y);

            let neighbours = [
                x.checked_sub(1).map(|nx| (nx, y)),
                x.checked_add(1).map(|nx| (nx, y)),
                y.checked_sub(1).map(|ny| (x, ny)),
                y.checked_add(1).map(|ny| (x, ny)),
            ];

            for next in neighbours.into_iter().flatten() {
                if points.contains(&next) && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let region = bounds.region();
        if region.width > 1 && region.height > 1 {
            regions.push(region);
        }
    }

    regions.sort_by_key(|r| (r.y, r.x, r.height, r.width));
    regions
}
