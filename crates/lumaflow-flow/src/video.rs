use crate::error::FlowError;

/// Geometry of the raw interlaced video stream.
///
/// Pixels are packed two bytes each with luminance at odd byte offsets, so a
/// line holds `2 * pixels_per_line` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    /// Pixels in one scan line.
    pub pixels_per_line: usize,
    /// Scan lines in one field.
    pub lines_per_field: usize,
    /// Bytes in one scan line.
    pub bytes_per_line: usize,
    /// Number of interlaced fields per frame.
    pub fields: usize,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            pixels_per_line: 640,
            lines_per_field: 240,
            bytes_per_line: 1280,
            fields: 2,
        }
    }
}

impl VideoFormat {
    /// Create a packed two-bytes-per-pixel format with two fields.
    pub fn new(pixels_per_line: usize, lines_per_field: usize) -> Self {
        Self {
            pixels_per_line,
            lines_per_field,
            bytes_per_line: pixels_per_line * 2,
            fields: 2,
        }
    }

    /// Check that `chunk` addresses bytes inside a single line of this format.
    pub fn validate(&self, chunk: &VideoChunk) -> Result<(), FlowError> {
        let end = chunk.byte_offset.saturating_add(chunk.data.len());
        if chunk.field >= self.fields || chunk.line >= self.lines_per_field || end > self.bytes_per_line
        {
            return Err(FlowError::InvalidChunk {
                field: chunk.field,
                line: chunk.line,
                start: chunk.byte_offset,
                end,
            });
        }
        Ok(())
    }

    /// Whether `chunk` carries the final bytes of its field.
    pub fn completes_field(&self, chunk: &VideoChunk) -> bool {
        chunk.line + 1 == self.lines_per_field
            && chunk.byte_offset + chunk.data.len() == self.bytes_per_line
    }
}

/// A contiguous byte range of one scan line.
///
/// Chunks borrow the capture buffer and are consumed synchronously.
#[derive(Debug, Clone, Copy)]
pub struct VideoChunk<'a> {
    /// Field parity, `0` or `1`.
    pub field: usize,
    /// Line index within the field.
    pub line: usize,
    /// Offset of `data[0]` from the start of the line, in bytes.
    pub byte_offset: usize,
    /// The raw bytes.
    pub data: &'a [u8],
}

impl<'a> VideoChunk<'a> {
    /// Create a chunk from its position and bytes.
    pub fn new(field: usize, line: usize, byte_offset: usize, data: &'a [u8]) -> Self {
        Self {
            field,
            line,
            byte_offset,
            data,
        }
    }

    /// Offset one past the last byte of the chunk.
    pub fn end_offset(&self) -> usize {
        self.byte_offset + self.data.len()
    }
}
