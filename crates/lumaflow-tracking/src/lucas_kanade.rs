//! Sparse pyramidal Lucas-Kanade optical flow.
//!
//! Each point is tracked coarse to fine through a Gaussian pyramid. At every
//! level the structure tensor of the previous image around the point is
//! accumulated once, then Gauss-Newton iterations move the estimate in the
//! next image until the update falls below `epsilon` or `max_iter` is hit.
//!
//! A point is lost when, at the finest level, its window leaves the image or
//! the smallest eigenvalue of the normalized structure tensor is below
//! `min_eig_threshold`. Coarser levels that fail these checks are skipped and
//! the estimate is carried down unchanged.

use glam::Vec2;
use lumaflow_image::{Image, ImageError};
use lumaflow_imgproc::{filter::spatial_gradient_float, interpolation::sample_gray, pyramid};
use rayon::prelude::*;

// Gradients are expressed with a factor of 32 and the tensor products scaled
// by 2^-20, so the eigenvalue threshold keeps its customary magnitude.
const EIG_SCALE: f32 = 1.0 / 1024.0;

/// Parameters for pyramidal LK optical flow.
#[derive(Debug, Clone, PartialEq)]
pub struct PyrLKParams {
    /// Side of the square search window, must be odd.
    pub win_size: usize,
    /// Number of pyramid levels above the full resolution image.
    pub max_level: usize,
    /// Maximum Gauss-Newton iterations per level.
    pub max_iter: usize,
    /// Iterations stop once the update is shorter than this, in pixels.
    pub epsilon: f32,
    /// Points whose normalized minimum eigenvalue falls below this are lost.
    pub min_eig_threshold: f32,
}

impl Default for PyrLKParams {
    fn default() -> Self {
        Self {
            win_size: 15,
            max_level: 3,
            max_iter: 20,
            epsilon: 0.03,
            min_eig_threshold: 1e-4,
        }
    }
}

/// Output for each tracked feature from LK tracking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PyrLKResult {
    /// Estimated positions in the next image.
    pub next_pts: Vec<Vec2>,
    /// `true` when the point was found.
    pub status: Vec<bool>,
    /// Mean absolute intensity difference over the window at the final position.
    pub error: Vec<f32>,
}

struct LevelData {
    image: Image<f32, 1>,
    grad_x: Image<f32, 1>,
    grad_y: Image<f32, 1>,
}

fn build_levels(
    prev_img: &Image<f32, 1>,
    params: &PyrLKParams,
) -> Result<Vec<LevelData>, ImageError> {
    pyramid::build_pyramid(prev_img, params.max_level, params.win_size)?
        .into_iter()
        .map(|image| {
            let mut grad_x = Image::from_size_val(image.size(), 0.0)?;
            let mut grad_y = Image::from_size_val(image.size(), 0.0)?;
            spatial_gradient_float(&image, &mut grad_x, &mut grad_y)?;
            Ok(LevelData {
                image,
                grad_x,
                grad_y,
            })
        })
        .collect()
}

/// Compute sparse pyramidal Lucas-Kanade optical flow.
///
/// # Arguments
///
/// * `prev_img` - Previous image, intensities in grey levels.
/// * `next_img` - Next image, same size as `prev_img`.
/// * `prev_pts` - Feature points to track.
/// * `params` - LK parameters.
///
/// # Returns
///
/// A [`PyrLKResult`] with one entry per input point.
pub fn calc_optical_flow_pyr_lk(
    prev_img: &Image<f32, 1>,
    next_img: &Image<f32, 1>,
    prev_pts: &[Vec2],
    params: &PyrLKParams,
) -> Result<PyrLKResult, ImageError> {
    if prev_img.size() != next_img.size() {
        return Err(ImageError::InvalidImageSize(
            prev_img.width(),
            prev_img.height(),
            next_img.width(),
            next_img.height(),
        ));
    }

    if prev_pts.is_empty() {
        return Ok(PyrLKResult::default());
    }

    let prev_levels = build_levels(prev_img, params)?;
    let next_levels =
        pyramid::build_pyramid(next_img, prev_levels.len().saturating_sub(1), params.win_size)?;

    let tracked: Vec<(Vec2, bool, f32)> = prev_pts
        .par_iter()
        .map(|&pt| track_one_point(&prev_levels, &next_levels, pt, params))
        .collect();

    let mut result = PyrLKResult {
        next_pts: Vec::with_capacity(tracked.len()),
        status: Vec::with_capacity(tracked.len()),
        error: Vec::with_capacity(tracked.len()),
    };
    for (pt, ok, err) in tracked {
        result.next_pts.push(pt);
        result.status.push(ok);
        result.error.push(err);
    }

    Ok(result)
}

fn window_in_range(pt: Vec2, half_win: f32, win: f32, image: &Image<f32, 1>) -> bool {
    let corner = (pt - Vec2::splat(half_win)).floor();
    corner.x >= -win
        && corner.y >= -win
        && corner.x < image.cols() as f32
        && corner.y < image.rows() as f32
}

/// Tracks a single point through the image pyramid.
fn track_one_point(
    prev_levels: &[LevelData],
    next_levels: &[Image<f32, 1>],
    prev_pt: Vec2,
    params: &PyrLKParams,
) -> (Vec2, bool, f32) {
    let half = (params.win_size / 2) as isize;
    let half_win = half as f32;
    let win = params.win_size as f32;
    let area = win * win;
    let top = prev_levels.len().min(next_levels.len()).saturating_sub(1);

    let mut next_pt = prev_pt / (1u32 << top) as f32;
    let mut status = true;
    let mut error = 0.0;

    // window samples of the previous image: (offset, intensity, gx, gy)
    let mut window: Vec<(Vec2, f32, f32, f32)> = Vec::with_capacity(params.win_size.pow(2));

    for level in (0..=top).rev() {
        let prev = &prev_levels[level];
        let next = &next_levels[level];
        let level_pt = prev_pt / (1u32 << level) as f32;
        if level != top {
            next_pt *= 2.0;
        }

        if !window_in_range(level_pt, half_win, win, &prev.image) {
            if level == 0 {
                status = false;
            }
            continue;
        }

        window.clear();
        let (mut a11, mut a12, mut a22) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half..=half {
            for wx in -half..=half {
                let offset = Vec2::new(wx as f32, wy as f32);
                let p = level_pt + offset;
                let i0 = sample_gray(&prev.image, p.x, p.y);
                let gx = sample_gray(&prev.grad_x, p.x, p.y);
                let gy = sample_gray(&prev.grad_y, p.x, p.y);
                a11 += gx * gx;
                a12 += gx * gy;
                a22 += gy * gy;
                window.push((offset, i0, gx, gy));
            }
        }

        let det = a11 * a22 - a12 * a12;
        let min_eig = (a22 + a11 - ((a11 - a22) * (a11 - a22) + 4.0 * a12 * a12).sqrt())
            / (2.0 * area)
            * EIG_SCALE;

        if min_eig < params.min_eig_threshold || det.abs() < f32::EPSILON {
            if level == 0 {
                status = false;
            }
            continue;
        }

        let inv_det = 1.0 / det;
        let mut prev_delta = Vec2::ZERO;

        for iter in 0..params.max_iter {
            if !window_in_range(next_pt, half_win, win, next) {
                if level == 0 {
                    status = false;
                }
                break;
            }

            let (mut b1, mut b2) = (0.0f32, 0.0f32);
            for &(offset, i0, gx, gy) in &window {
                let q = next_pt + offset;
                let diff = sample_gray(next, q.x, q.y) - i0;
                b1 += diff * gx;
                b2 += diff * gy;
            }

            let delta = Vec2::new(
                (a12 * b2 - a22 * b1) * inv_det,
                (a12 * b1 - a11 * b2) * inv_det,
            );
            next_pt += delta;

            if delta.length_squared() <= params.epsilon * params.epsilon {
                break;
            }

            // oscillating between two positions, settle in the middle
            if iter > 0 && (delta + prev_delta).abs().max_element() < 0.01 {
                next_pt -= delta * 0.5;
                break;
            }
            prev_delta = delta;
        }

        if level == 0 && status {
            let sum: f32 = window
                .iter()
                .map(|&(offset, i0, _, _)| {
                    let q = next_pt + offset;
                    (sample_gray(next, q.x, q.y) - i0).abs()
                })
                .sum();
            error = sum / area;
        }
    }

    if status {
        let size = prev_levels[0].image.size();
        let inside = next_pt.x >= 0.0
            && next_pt.y >= 0.0
            && next_pt.x <= (size.width - 1) as f32
            && next_pt.y <= (size.height - 1) as f32;
        status = inside && next_pt.is_finite();
    }

    (next_pt, status, error)
}
