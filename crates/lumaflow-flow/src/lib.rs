#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! A [`FlowAnalyzer`] consumes raw interlaced video chunk by chunk. For each
//! completed field it discovers at most one new feature point, tracks all
//! points into the new image and adds a weighted mean displacement and a
//! mean motion length into shared 16.16 fixed-point integrators. Consumers
//! read those through their own [`FlowCapture`], each with its own filter and
//! reference origin.

/// the flow analyzer driving ingestion, discovery and tracking.
pub mod analyzer;

/// consumer side filtered view of the flow.
pub mod capture;

/// analyzer configuration.
pub mod config;

/// diagnostic images of tracked points.
pub mod debug;

/// discovery of new points to track.
pub mod discovery;

/// Error types for the flow module.
pub mod error;

/// per-field luminance buffers.
pub mod field;

/// shared fixed-point integrators.
pub mod integrator;

/// point aging, eviction and aggregation.
pub mod tracker;

/// mapping from pixel flow to model coordinates.
pub mod transform;

/// raw video chunks and their format.
pub mod video;

pub use crate::analyzer::FlowAnalyzer;
pub use crate::capture::FlowCapture;
pub use crate::config::FlowConfig;
pub use crate::error::FlowError;
pub use crate::integrator::{FlowSource, IntegratorSnapshot};
pub use crate::tracker::{PointInfo, TrackedPoint};
pub use crate::transform::FlowTransform;
pub use crate::video::{VideoChunk, VideoFormat};
