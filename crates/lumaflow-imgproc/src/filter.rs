use lumaflow_image::{Image, ImageError};
use rayon::prelude::*;

/// Normalized 3x3 Scharr kernels for the x and y derivatives, as
/// (smoothing, derivative) separable pairs.
///
/// Each pair sums to a unit-gain derivative: a ramp of slope 1 produces 1.
pub fn normalized_scharr_kernel3() -> ([f32; 3], [f32; 3]) {
    ([3.0 / 16.0, 10.0 / 16.0, 3.0 / 16.0], [-0.5, 0.0, 0.5])
}

/// Compute the first order image derivative in both x and y using a Scharr operator.
///
/// Borders are handled by replicating the edge pixels.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dx` - The destination image for the x derivative.
/// * `dy` - The destination image for the y derivative.
pub fn spatial_gradient_float(
    src: &Image<f32, 1>,
    dx: &mut Image<f32, 1>,
    dy: &mut Image<f32, 1>,
) -> Result<(), ImageError> {
    if src.size() != dx.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dx.cols(),
            dx.rows(),
        ));
    }

    if src.size() != dy.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dy.cols(),
            dy.rows(),
        ));
    }

    let (cols, rows) = (src.cols(), src.rows());
    if cols == 0 || rows == 0 {
        return Ok(());
    }

    let (smooth, deriv) = normalized_scharr_kernel3();
    let src_data = src.as_slice();

    dx.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .zip(dy.as_slice_mut().par_chunks_exact_mut(cols))
        .enumerate()
        .for_each(|(r, (dx_row, dy_row))| {
            let rows_idx = [r.saturating_sub(1), r, (r + 1).min(rows - 1)];
            for c in 0..cols {
                let cols_idx = [c.saturating_sub(1), c, (c + 1).min(cols - 1)];
                let mut gx = 0.0;
                let mut gy = 0.0;
                for (i, &ri) in rows_idx.iter().enumerate() {
                    for (j, &cj) in cols_idx.iter().enumerate() {
                        let v = src_data[ri * cols + cj];
                        gx += smooth[i] * deriv[j] * v;
                        gy += deriv[i] * smooth[j] * v;
                    }
                }
                dx_row[c] = gx;
                dy_row[c] = gy;
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lumaflow_image::ImageSize;

    #[test]
    fn test_spatial_gradient_ramp() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 4,
        };

        // intensity = 2 * x + 3 * y
        let img = Image::<f32, 1>::new(
            size,
            (0..size.area())
                .map(|i| (2 * (i % 5) + 3 * (i / 5)) as f32)
                .collect(),
        )?;
        let mut dx = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let mut dy = Image::<f32, 1>::from_size_val(size, 0.0)?;

        spatial_gradient_float(&img, &mut dx, &mut dy)?;

        // interior pixels see the exact slope
        for y in 1..3 {
            for x in 1..4 {
                assert_relative_eq!(dx.get_pixel(x, y, 0)?, 2.0, epsilon = 1e-5);
                assert_relative_eq!(dy.get_pixel(x, y, 0)?, 3.0, epsilon = 1e-5);
            }
        }

        // replicated borders halve the central difference
        assert_relative_eq!(dx.get_pixel(0, 1, 0)?, 1.0, epsilon = 1e-5);

        Ok(())
    }

    #[test]
    fn test_spatial_gradient_size_mismatch() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::from_size_val([4, 4].into(), 0.0)?;
        let mut dx = Image::<f32, 1>::from_size_val([4, 4].into(), 0.0)?;
        let mut dy = Image::<f32, 1>::from_size_val([4, 3].into(), 0.0)?;
        assert!(spatial_gradient_float(&img, &mut dx, &mut dy).is_err());
        Ok(())
    }
}
