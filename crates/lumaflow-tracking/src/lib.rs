#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//! The two primitives the flow analyzer is built on: locating a corner to
//! sub-pixel accuracy near a seed point, and following a set of points from
//! one image to the next with per-point status and residual error.

pub mod corners;
pub mod lucas_kanade;

pub use corners::{corner_subpix, SubPixParams};
pub use lucas_kanade::{calc_optical_flow_pyr_lk, PyrLKParams, PyrLKResult};
