use std::path::PathBuf;

use lumaflow_image::GrayImage;
use lumaflow_imgproc::draw::draw_circle;
use lumaflow_io::png::write_image_png_gray8;

use crate::{error::FlowError, tracker::TrackedPoint};

const MARKER_RADIUS: i64 = 3;

/// Periodic writer of annotated field images.
#[derive(Debug, Clone)]
pub struct FieldDumper {
    dir: PathBuf,
    interval: u64,
    fields_seen: u64,
}

impl FieldDumper {
    /// Write one image every `interval` fields into `dir`.
    pub fn new(dir: impl Into<PathBuf>, interval: u32) -> Self {
        Self {
            dir: dir.into(),
            interval: u64::from(interval.max(1)),
            fields_seen: 0,
        }
    }

    /// Count a completed field and write it if it falls on the interval.
    ///
    /// Returns the path written, if any.
    pub fn on_field(
        &mut self,
        field: usize,
        image: &GrayImage,
        points: &[TrackedPoint],
    ) -> Result<Option<PathBuf>, FlowError> {
        self.fields_seen += 1;
        if self.fields_seen % self.interval != 0 {
            return Ok(None);
        }

        let path = self
            .dir
            .join(format!("flow-{:06}-f{field}.png", self.fields_seen));
        write_image_png_gray8(&path, &annotate(image, points))?;
        Ok(Some(path))
    }
}

/// Copy `image` with a circle around every point, brighter with age.
pub fn annotate(image: &GrayImage, points: &[TrackedPoint]) -> GrayImage {
    let mut out = image.clone();
    for point in points {
        let brightness = point.info.age.min(255) as u8;
        let center = (
            point.position.x.round() as i64,
            point.position.y.round() as i64,
        );
        draw_circle(&mut out, center, MARKER_RADIUS, [brightness]);
    }
    out
}
