//! Finding new points to track.
//!
//! Candidates are the grid points with the largest change between the two
//! most recent field images, restricted to grid cells no tracked point
//! already covers, then snapped to the nearest corner.

use glam::Vec2;
use lumaflow_image::{GrayImage, Image, ImageSize};
use lumaflow_tracking::{corner_subpix, SubPixParams};
use rand::Rng;

use crate::tracker::TrackedPoint;

/// Parameters of point discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryParams {
    /// Coverage grid cell size, in pixels.
    pub grid_spacing: usize,
    /// Uniform jitter applied to a candidate before refinement, in pixels.
    pub jitter: f32,
    /// Corner refinement window and termination criteria.
    pub subpix: SubPixParams,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            grid_spacing: 6,
            jitter: 0.0,
            subpix: SubPixParams::default(),
        }
    }
}

/// Coarse grid recording which cells already hold a tracked point.
#[derive(Debug, Clone)]
pub struct CoverageGrid {
    spacing: usize,
    cols: usize,
    rows: usize,
    covered: Vec<bool>,
}

impl CoverageGrid {
    /// An empty grid over an image of `size`.
    pub fn new(size: ImageSize, spacing: usize) -> Self {
        let (cols, rows) = match spacing {
            0 => (0, 0),
            s => (size.width / s, size.height / s),
        };
        Self {
            spacing,
            cols,
            rows,
            covered: vec![false; cols * rows],
        }
    }

    /// A grid with the cells of `points` marked.
    pub fn from_points(size: ImageSize, spacing: usize, points: &[TrackedPoint]) -> Self {
        let mut grid = Self::new(size, spacing);
        for point in points {
            grid.mark(point.position);
        }
        grid
    }

    /// Mark the cell containing `position`. Positions off the grid are ignored.
    pub fn mark(&mut self, position: Vec2) {
        if let Some(idx) = self.cell_index(position) {
            self.covered[idx] = true;
        }
    }

    /// Whether the cell at grid column `col` and row `row` is covered.
    pub fn is_covered(&self, col: usize, row: usize) -> bool {
        col < self.cols && row < self.rows && self.covered[row * self.cols + col]
    }

    /// Grid dimensions as `(cols, rows)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn cell_index(&self, position: Vec2) -> Option<usize> {
        if self.spacing == 0 || !position.is_finite() || position.x < 0.0 || position.y < 0.0 {
            return None;
        }
        let col = (position.x / self.spacing as f32) as usize;
        let row = (position.y / self.spacing as f32) as usize;
        (col < self.cols && row < self.rows).then_some(row * self.cols + col)
    }
}

/// Find the uncovered interior grid point that changed most between `prev`
/// and `next`.
///
/// Ties keep the first point in raster order. Returns `None` when no
/// uncovered interior point changed at all.
pub fn find_candidate(prev: &GrayImage, next: &GrayImage, grid: &CoverageGrid) -> Option<Vec2> {
    let (cols, rows) = grid.dims();
    let mut best: Option<(u32, Vec2)> = None;

    for row in 1..rows.saturating_sub(1) {
        for col in 1..cols.saturating_sub(1) {
            if grid.is_covered(col, row) {
                continue;
            }
            let (x, y) = (col * grid.spacing, row * grid.spacing);
            let (Some(&a), Some(&b)) = (prev.get([y, x, 0]), next.get([y, x, 0])) else {
                continue;
            };
            let diff = (a as i32 - b as i32).pow(2) as u32;
            if diff > best.map_or(0, |(d, _)| d) {
                best = Some((diff, Vec2::new(x as f32, y as f32)));
            }
        }
    }

    best.map(|(_, p)| p)
}

/// Propose one new point, or `None` when nothing changed in uncovered areas.
///
/// # Arguments
///
/// * `prev` - Previous field image.
/// * `next` - Newly completed field image.
/// * `prev_f32` - `prev` as floats, used for corner refinement.
/// * `points` - Points already tracked in this field.
/// * `params` - Discovery parameters.
/// * `rng` - Source of the candidate jitter.
pub fn discover_point<R: Rng>(
    prev: &GrayImage,
    next: &GrayImage,
    prev_f32: &Image<f32, 1>,
    points: &[TrackedPoint],
    params: &DiscoveryParams,
    rng: &mut R,
) -> Option<Vec2> {
    let grid = CoverageGrid::from_points(prev.size(), params.grid_spacing, points);
    let mut candidate = find_candidate(prev, next, &grid)?;

    if params.jitter > 0.0 {
        let j = params.jitter;
        candidate += Vec2::new(rng.random_range(-j..=j), rng.random_range(-j..=j));
        let max = Vec2::new(
            prev.width().saturating_sub(1) as f32,
            prev.height().saturating_sub(1) as f32,
        );
        candidate = candidate.clamp(Vec2::ZERO, max);
    }

    Some(corner_subpix(prev_f32, candidate, &params.subpix))
}

/// Randomly evict points: while a uniform draw falls below `probability`
/// and points remain, remove one chosen uniformly.
///
/// Returns the number of evicted points.
pub fn cull_random<R: Rng>(
    points: &mut Vec<TrackedPoint>,
    probability: f32,
    rng: &mut R,
) -> usize {
    let mut evicted = 0;
    if probability <= 0.0 {
        return evicted;
    }
    while !points.is_empty() && rng.random::<f32>() < probability {
        let idx = rng.random_range(0..points.len());
        points.swap_remove(idx);
        evicted += 1;
    }
    evicted
}
