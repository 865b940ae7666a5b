use lumaflow_image::{GrayImage, ImageError, ImageSize};

use crate::{
    tracker::TrackedPoint,
    video::{VideoChunk, VideoFormat},
};

/// Size of the decimated luminance image of one field.
pub fn field_image_size(format: &VideoFormat, decimate: usize) -> ImageSize {
    ImageSize {
        width: format.pixels_per_line.checked_div(decimate).unwrap_or(0),
        height: format.lines_per_field,
    }
}

/// Luminance accumulator and tracked points of one field parity.
#[derive(Debug, Clone)]
pub struct Field {
    prev: GrayImage,
    next: GrayImage,
    /// Points tracked in this field.
    pub points: Vec<TrackedPoint>,
    cursor: (usize, usize),
}

impl Field {
    /// Allocate zeroed images of `size`.
    pub fn new(size: ImageSize) -> Result<Self, ImageError> {
        Ok(Self {
            prev: GrayImage::from_size_val(size, 0)?,
            next: GrayImage::from_size_val(size, 0)?,
            points: Vec::new(),
            cursor: (0, 0),
        })
    }

    /// The image of the previously completed field.
    pub fn prev(&self) -> &GrayImage {
        &self.prev
    }

    /// The image being filled, complete once the field ends.
    pub fn next(&self) -> &GrayImage {
        &self.next
    }

    /// Store the luminance samples of `chunk` that survive decimation.
    ///
    /// Luminance sits at odd byte offsets; every `decimate`th sample is kept,
    /// at column `byte_offset / (2 * decimate)`. The chunk must already be
    /// validated against `format`.
    ///
    /// Returns `false` when the chunk does not continue the raster where the
    /// previous one ended. It is stored at its own position regardless.
    pub fn store(&mut self, chunk: &VideoChunk, format: &VideoFormat, decimate: usize) -> bool {
        let in_order = self.cursor == (chunk.line, chunk.byte_offset);

        let stride = 2 * decimate;
        if stride > 0 {
            if let Some(row) = self.next.row_mut(chunk.line) {
                // first luminance byte of the chunk on the decimated grid
                let rem = chunk.byte_offset % stride;
                let first = chunk.byte_offset + (1 + stride - rem) % stride;

                for offset in (first..chunk.end_offset()).step_by(stride) {
                    if let Some(dst) = row.get_mut(offset / stride) {
                        *dst = chunk.data[offset - chunk.byte_offset];
                    }
                }
            }
        }

        self.cursor = match chunk.end_offset() {
            end if end == format.bytes_per_line => (chunk.line + 1, 0),
            end => (chunk.line, end),
        };
        in_order
    }

    /// Make the completed image the previous one and restart the raster.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.prev, &mut self.next);
        self.cursor = (0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // packed two bytes per pixel, luminance `base + x` at odd offsets
    fn line_bytes(pixels: usize, base: u8) -> Vec<u8> {
        (0..pixels)
            .flat_map(|x| [0x80, base.wrapping_add(x as u8)])
            .collect()
    }

    #[test]
    fn test_field_image_size() {
        let format = VideoFormat::default();
        assert_eq!(
            field_image_size(&format, 3),
            ImageSize {
                width: 213,
                height: 240
            }
        );
        assert_eq!(field_image_size(&format, 0).width, 0);
    }

    #[test]
    fn test_store_decimates_luma() -> Result<(), ImageError> {
        let format = VideoFormat::new(8, 2);
        let mut field = Field::new(field_image_size(&format, 2))?;
        let bytes = line_bytes(8, 10);

        assert!(field.store(&VideoChunk::new(0, 0, 0, &bytes), &format, 2));

        assert_eq!(field.next().row(0), Some(&[10u8, 12, 14, 16][..]));
        assert_eq!(field.next().row(1), Some(&[0u8; 4][..]));

        Ok(())
    }

    #[test]
    fn test_store_split_chunks() -> Result<(), ImageError> {
        let format = VideoFormat::new(9, 1);
        let mut field = Field::new(field_image_size(&format, 3))?;
        let bytes = line_bytes(9, 50);

        // split mid-pixel and mid-stride
        for (start, end) in [(0, 5), (5, 12), (12, 18)] {
            let chunk = VideoChunk::new(0, 0, start, &bytes[start..end]);
            let in_order = field.store(&chunk, &format, 3);
            assert!(in_order);
        }

        assert_eq!(field.next().row(0), Some(&[50u8, 53, 56][..]));

        Ok(())
    }

    #[test]
    fn test_out_of_order_chunk_detected() -> Result<(), ImageError> {
        let format = VideoFormat::new(4, 3);
        let mut field = Field::new(field_image_size(&format, 1))?;
        let bytes = line_bytes(4, 0);

        assert!(field.store(&VideoChunk::new(0, 0, 0, &bytes), &format, 1));
        // line 1 skipped
        assert!(!field.store(&VideoChunk::new(0, 2, 0, &bytes), &format, 1));
        assert_eq!(field.next().row(2), Some(&[0u8, 1, 2, 3][..]));

        Ok(())
    }

    #[test]
    fn test_swap() -> Result<(), ImageError> {
        let format = VideoFormat::new(2, 1);
        let mut field = Field::new(field_image_size(&format, 1))?;
        let bytes = line_bytes(2, 7);
        field.store(&VideoChunk::new(0, 0, 0, &bytes), &format, 1);
        field.swap();

        assert_eq!(field.prev().as_slice(), &[7, 8]);
        assert_eq!(field.next().as_slice(), &[0, 0]);
        assert!(field.store(&VideoChunk::new(0, 0, 0, &bytes), &format, 1));

        Ok(())
    }
}
