use lumaflow_image::{Image, ImageError, ImageSize};
use rayon::prelude::*;

// The 2D kernel is the outer product of [1, 4, 6, 4, 1] / 16 with itself.
const PYRAMID_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Mirror an index into `0..len` without repeating the edge sample (`dcb|abcd|cba`).
#[inline]
pub(crate) fn reflect_101(i: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        i = if i < 0 { -i } else { 2 * len - i - 2 };
    }
    i as usize
}

/// Size of the next coarser pyramid level.
pub fn pyrdown_size(size: ImageSize) -> ImageSize {
    ImageSize {
        width: size.width.div_ceil(2),
        height: size.height.div_ceil(2),
    }
}

/// Blur an image with a 5x5 Gaussian and drop every other row and column.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, sized with [`pyrdown_size`].
///
/// # Example
///
/// ```
/// use lumaflow_image::{Image, ImageSize};
/// use lumaflow_imgproc::pyramid::{pyrdown, pyrdown_size};
///
/// let image = Image::<f32, 1>::from_size_val(ImageSize { width: 5, height: 4 }, 2.0).unwrap();
/// let mut down = Image::<f32, 1>::from_size_val(pyrdown_size(image.size()), 0.0).unwrap();
///
/// pyrdown(&image, &mut down).unwrap();
///
/// assert_eq!(down.size(), ImageSize { width: 3, height: 2 });
/// ```
pub fn pyrdown(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    let expected = pyrdown_size(src.size());
    if dst.size() != expected {
        return Err(ImageError::InvalidImageSize(
            expected.width,
            expected.height,
            dst.width(),
            dst.height(),
        ));
    }

    let (src_w, src_h) = (src.width(), src.height());
    let dst_w = dst.width();
    if dst_w == 0 || dst.height() == 0 {
        return Ok(());
    }
    let src_data = src.as_slice();

    // horizontal pass on every source row, sampled at even columns
    let mut tmp = vec![0.0f32; src_h * dst_w];
    tmp.par_chunks_exact_mut(dst_w)
        .enumerate()
        .for_each(|(y, tmp_row)| {
            let row = &src_data[y * src_w..(y + 1) * src_w];
            for (x, out) in tmp_row.iter_mut().enumerate() {
                let cx = 2 * x as isize;
                *out = PYRAMID_KERNEL
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * row[reflect_101(cx + k as isize - 2, src_w)])
                    .sum();
            }
        });

    // vertical pass, sampled at even rows
    dst.as_slice_mut()
        .par_chunks_exact_mut(dst_w)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let cy = 2 * y as isize;
            for (x, out) in dst_row.iter_mut().enumerate() {
                *out = PYRAMID_KERNEL
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * tmp[reflect_101(cy + k as isize - 2, src_h) * dst_w + x])
                    .sum();
            }
        });

    Ok(())
}

/// Build a Gaussian pyramid with at most `max_level` coarser levels.
///
/// Level 0 is a copy of `src`. Construction stops early once a level would be
/// smaller than `min_size` in either dimension.
pub fn build_pyramid(
    src: &Image<f32, 1>,
    max_level: usize,
    min_size: usize,
) -> Result<Vec<Image<f32, 1>>, ImageError> {
    let mut pyramid = Vec::with_capacity(max_level + 1);
    pyramid.push(src.clone());

    for _ in 0..max_level {
        let Some(prev) = pyramid.last() else {
            break;
        };
        let size = pyrdown_size(prev.size());
        if size.width < min_size || size.height < min_size {
            break;
        }
        let mut down = Image::from_size_val(size, 0.0)?;
        pyrdown(prev, &mut down)?;
        pyramid.push(down);
    }

    Ok(pyramid)
}
