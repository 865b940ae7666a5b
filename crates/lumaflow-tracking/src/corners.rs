//! Sub-pixel corner refinement.
//!
//! For a corner at `p`, the image gradient at any nearby point `q` is
//! orthogonal to `q - p`. Summing that constraint over a Gaussian-weighted
//! window gives a 2x2 linear system whose solution is the next estimate of
//! `p`; the window is re-centred and the system solved again until the
//! update is small enough.

use glam::Vec2;
use lumaflow_image::Image;
use lumaflow_imgproc::interpolation::sample_gray;

/// Parameters for [`corner_subpix`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubPixParams {
    /// Half side of the search window; the window is `2 * half_win + 1` wide.
    pub half_win: usize,
    /// Maximum number of refinement iterations.
    pub max_iter: usize,
    /// Stop once an update is shorter than this, in pixels.
    pub epsilon: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_win: 6,
            max_iter: 20,
            epsilon: 0.03,
        }
    }
}

/// Refine the location of a corner near `seed` to sub-pixel accuracy.
///
/// The seed is returned unchanged when the system is degenerate from the
/// first iteration, or when the refined location wanders further than the
/// window from the seed.
///
/// # Arguments
///
/// * `image` - The grayscale image.
/// * `seed` - Initial corner location.
/// * `params` - Window size and termination criteria.
pub fn corner_subpix(image: &Image<f32, 1>, seed: Vec2, params: &SubPixParams) -> Vec2 {
    let win = params.half_win as isize;
    let inv_win = 1.0 / params.half_win.max(1) as f32;

    let mask: Vec<f32> = (-win..=win)
        .flat_map(|i| {
            (-win..=win).map(move |j| {
                let (y, x) = (i as f32 * inv_win, j as f32 * inv_win);
                (-x * x - y * y).exp()
            })
        })
        .collect();

    let eps2 = params.epsilon * params.epsilon;
    let (cols, rows) = (image.cols() as f32, image.rows() as f32);
    let mut c = seed;

    for _ in 0..params.max_iter.max(1) {
        let (mut a, mut b, mut cc) = (0.0f32, 0.0f32, 0.0f32);
        let (mut bb1, mut bb2) = (0.0f32, 0.0f32);

        let mut m = mask.iter();
        for i in -win..=win {
            for j in -win..=win {
                let w = m.next().copied().unwrap_or(0.0);
                let (px, py) = (j as f32, i as f32);
                let (qx, qy) = (c.x + px, c.y + py);

                let tgx = sample_gray(image, qx + 1.0, qy) - sample_gray(image, qx - 1.0, qy);
                let tgy = sample_gray(image, qx, qy + 1.0) - sample_gray(image, qx, qy - 1.0);

                let gxx = tgx * tgx * w;
                let gxy = tgx * tgy * w;
                let gyy = tgy * tgy * w;

                a += gxx;
                b += gxy;
                cc += gyy;

                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * cc - b * b;
        if det.abs() <= f32::EPSILON {
            break;
        }

        let scale = 1.0 / det;
        let next = Vec2::new(
            c.x + cc * scale * bb1 - b * scale * bb2,
            c.y - b * scale * bb1 + a * scale * bb2,
        );
        let err = (next - c).length_squared();
        c = next;

        if c.x < 0.0 || c.x >= cols || c.y < 0.0 || c.y >= rows || err <= eps2 {
            break;
        }
    }

    let drift = (c - seed).abs();
    if !c.is_finite() || drift.x > params.half_win as f32 || drift.y > params.half_win as f32 {
        return seed;
    }

    c
}
