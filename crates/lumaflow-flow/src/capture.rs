use glam::{Vec2, Vec3};

use crate::integrator::{FlowSource, IntegratorSnapshot};

/// One consumer's filtered view of the analyzer's flow.
///
/// Every consumer owns its own capture and decides independently when to
/// sample the integrators and when to move its reference origin.
///
/// # Example
///
/// ```
/// use lumaflow_flow::{FlowCapture, FlowSource};
///
/// let source = FlowSource::new();
/// let mut flow = FlowCapture::new(source.clone());
///
/// flow.capture(0.2);
/// assert_eq!(flow.pixels, glam::Vec2::ZERO);
/// flow.origin();
/// ```
#[derive(Debug, Clone)]
pub struct FlowCapture {
    /// Filtered displacement since the origin, in pixels.
    pub pixels: Vec2,
    /// `pixels` mapped through the source's model transform.
    pub model: Vec3,
    /// Unfiltered motion length accumulated since the origin.
    pub motion_length: f32,
    source: FlowSource,
    origin_snapshot: IntegratorSnapshot,
    capture_snapshot: IntegratorSnapshot,
}

impl FlowCapture {
    /// Create a capture whose origin is the current integrator state.
    pub fn new(source: FlowSource) -> Self {
        let snapshot = source.snapshot();
        let mut capture = Self {
            pixels: Vec2::ZERO,
            model: Vec3::ZERO,
            motion_length: 0.0,
            source,
            origin_snapshot: snapshot,
            capture_snapshot: snapshot,
        };
        capture.capture(1.0);
        capture
    }

    /// Sample the integrators and update `pixels`, `model` and
    /// `motion_length`.
    ///
    /// `filter_rate` is the weight of the new measurement: `1.0` disables
    /// filtering, smaller values low-pass the pixel displacement. The rate is
    /// clamped to `[0, 1]`; a NaN rate is taken as `1.0`.
    pub fn capture(&mut self, filter_rate: f32) {
        self.capture_snapshot = self.source.snapshot();

        let raw = self.capture_snapshot.displacement_since(&self.origin_snapshot);
        let rate = filter_rate.clamp(0.0, 1.0);
        if rate.is_nan() || rate >= 1.0 {
            self.pixels = raw;
        } else {
            self.pixels += (raw - self.pixels) * rate;
        }

        self.motion_length = self.capture_snapshot.length_since(&self.origin_snapshot);
        self.model = self.source.transform().apply(self.pixels);
    }

    /// Move the reference origin to the most recent capture.
    ///
    /// Only the next capture's raw delta restarts from zero; the filtered
    /// `pixels` keep their value.
    pub fn origin(&mut self) {
        self.origin_snapshot = self.capture_snapshot;
    }
}
