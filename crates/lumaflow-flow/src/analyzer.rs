use glam::{Vec2, Vec3};
use lumaflow_image::{ops::cast_and_scale, Image};
use lumaflow_tracking::{calc_optical_flow_pyr_lk, PyrLKParams, SubPixParams};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    debug::FieldDumper,
    discovery::{cull_random, discover_point, DiscoveryParams},
    error::FlowError,
    field::{field_image_size, Field},
    integrator::FlowSource,
    tracker::{advance_points, observations, FieldMotion, RetentionPolicy, TrackedPoint},
    video::{VideoChunk, VideoFormat},
    FlowConfig,
};

/// Estimates camera-plane motion from a stream of interlaced video chunks.
///
/// The analyzer owns all per-field state and is driven from one ingestion
/// thread. Results are published through its [`FlowSource`], which any
/// number of [`crate::FlowCapture`]s on other threads can read.
pub struct FlowAnalyzer<R = StdRng> {
    config: FlowConfig,
    format: VideoFormat,
    fields: Vec<Field>,
    source: FlowSource,
    rng: R,
    lk_params: PyrLKParams,
    discovery: DiscoveryParams,
    dumper: Option<FieldDumper>,
    prev_f32: Image<f32, 1>,
    next_f32: Image<f32, 1>,
}

impl FlowAnalyzer<StdRng> {
    /// Create an analyzer seeded from the operating system.
    pub fn new(config: FlowConfig, format: VideoFormat) -> Result<Self, FlowError> {
        Self::with_rng(config, format, StdRng::from_os_rng())
    }
}

impl<R: Rng> FlowAnalyzer<R> {
    /// Create an analyzer drawing jitter and random evictions from `rng`.
    pub fn with_rng(config: FlowConfig, format: VideoFormat, rng: R) -> Result<Self, FlowError> {
        config.validate(&format)?;

        let size = field_image_size(&format, config.decimate);
        let fields = (0..format.fields)
            .map(|_| Field::new(size))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "flow analyzer: {}x{} field images, up to {} points per field",
            size.width,
            size.height,
            config.max_points
        );

        Ok(Self {
            lk_params: lk_params(&config),
            discovery: discovery_params(&config),
            dumper: dumper(&config),
            fields,
            source: FlowSource::new(),
            rng,
            prev_f32: Image::from_size_val(size, 0.0)?,
            next_f32: Image::from_size_val(size, 0.0)?,
            config,
            format,
        })
    }

    /// Handle to the shared integrators, for creating captures.
    pub fn source(&self) -> FlowSource {
        self.source.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// The video format chunks are validated against.
    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// Points currently tracked in `field`.
    pub fn points(&self, field: usize) -> &[TrackedPoint] {
        self.fields
            .get(field)
            .map(|f| f.points.as_slice())
            .unwrap_or_default()
    }

    /// Replace the configuration.
    ///
    /// Field images are reallocated, and tracked points dropped, only when
    /// the decimated image size changes.
    pub fn set_config(&mut self, config: FlowConfig) -> Result<(), FlowError> {
        config.validate(&self.format)?;

        let size = field_image_size(&self.format, config.decimate);
        if size != field_image_size(&self.format, self.config.decimate) {
            self.fields = (0..self.format.fields)
                .map(|_| Field::new(size))
                .collect::<Result<Vec<_>, _>>()?;
            self.prev_f32 = Image::from_size_val(size, 0.0)?;
            self.next_f32 = Image::from_size_val(size, 0.0)?;
            log::info!("flow analyzer: field images resized to {size}");
        }

        self.lk_params = lk_params(&config);
        self.discovery = discovery_params(&config);
        self.dumper = dumper(&config);
        self.config = config;
        Ok(())
    }

    /// Set the model transform applied by every capture of this analyzer.
    pub fn set_transform(&self, basis_x: Vec3, basis_y: Vec3, origin: Vec3) {
        self.source.set_transform(basis_x, basis_y, origin);
    }

    /// Ingest one chunk of video.
    ///
    /// When the chunk completes a field, flow is computed for that field and
    /// published before returning. Chunks outside the video format are
    /// rejected without touching any state.
    pub fn process(&mut self, chunk: &VideoChunk) -> Result<(), FlowError> {
        if !self.config.is_enabled() {
            return Ok(());
        }
        self.format.validate(chunk)?;

        let decimate = self.config.decimate;
        let Some(field) = self.fields.get_mut(chunk.field) else {
            return Ok(());
        };
        if !field.store(chunk, &self.format, decimate) {
            log::debug!(
                "field {}: chunk at line {} offset {} is out of raster order",
                chunk.field,
                chunk.line,
                chunk.byte_offset
            );
        }

        if self.format.completes_field(chunk) {
            self.calculate_flow(chunk.field)?;
            if let Some(field) = self.fields.get_mut(chunk.field) {
                field.swap();
            }
        }
        Ok(())
    }

    fn calculate_flow(&mut self, index: usize) -> Result<(), FlowError> {
        let Some(field) = self.fields.get_mut(index) else {
            return Ok(());
        };
        let debug = self.config.debug;

        cast_and_scale(field.prev(), &mut self.prev_f32, 1.0)?;
        cast_and_scale(field.next(), &mut self.next_f32, 1.0)?;

        let culled = cull_random(
            &mut field.points,
            self.config.delete_point_probability,
            &mut self.rng,
        );
        if debug && culled > 0 {
            log::debug!("field {index}: randomly evicted {culled} points");
        }

        if field.points.len() < self.config.max_points {
            if let Some(point) = discover_point(
                field.prev(),
                field.next(),
                &self.prev_f32,
                &field.points,
                &self.discovery,
                &mut self.rng,
            ) {
                if debug {
                    log::debug!("field {index}: discovered point at {point}");
                }
                field.points.push(TrackedPoint::new(point));
            }
        }

        let motion = if field.points.is_empty() {
            FieldMotion::default()
        } else {
            let prev_pts: Vec<Vec2> = field.points.iter().map(|p| p.position).collect();
            let result =
                calc_optical_flow_pyr_lk(&self.prev_f32, &self.next_f32, &prev_pts, &self.lk_params)?;
            advance_points(&mut field.points, &observations(&result), &retention(&self.config))
        };

        self.source.accumulate(motion.displacement, motion.motion_length);

        if debug {
            log::debug!(
                "field {index}: {} points, {} tracked, {} lost, {} evicted, flow {:?}, motion {:?}",
                field.points.len(),
                motion.tracked,
                motion.lost,
                motion.evicted,
                motion.displacement,
                motion.motion_length
            );
        }

        if let Some(dumper) = self.dumper.as_mut() {
            if let Err(e) = dumper.on_field(index, field.next(), &field.points) {
                log::warn!("field {index}: failed to write debug image: {e}");
            }
        }

        Ok(())
    }
}

fn lk_params(config: &FlowConfig) -> PyrLKParams {
    PyrLKParams {
        win_size: 15,
        max_level: 3,
        max_iter: 20,
        epsilon: 0.03,
        min_eig_threshold: config.min_eig_threshold,
    }
}

fn discovery_params(config: &FlowConfig) -> DiscoveryParams {
    DiscoveryParams {
        grid_spacing: config.discovery_grid_spacing,
        jitter: config.discovery_jitter,
        subpix: SubPixParams::default(),
    }
}

fn retention(config: &FlowConfig) -> RetentionPolicy {
    RetentionPolicy {
        trial_period: config.point_trial_period,
        max_age: config.max_point_age,
        min_speed: config.min_point_speed,
    }
}

fn dumper(config: &FlowConfig) -> Option<FieldDumper> {
    config
        .debug_dir()
        .map(|dir| FieldDumper::new(dir, config.debug_frame_interval))
}
