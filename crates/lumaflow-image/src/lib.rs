#![deny(missing_docs)]
//! Image types for the lumaflow crates.
//!
//! Images are stored row-major and interleaved, `(H, W, C)`, in a plain
//! contiguous buffer owned by the image.

/// image representation for computer vision purposes.
pub mod image;

/// Error types for the image module.
pub mod error;

/// image operations that convert between pixel types.
pub mod ops;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};

/// A single channel 8-bit image, the storage format of a decimated video field.
pub type GrayImage = Image<u8, 1>;
