#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for I/O operations.
///
/// Defines [`error::IoError`] variants for file access and encoding failures.
pub mod error;

/// PNG image encoding and decoding.
///
/// Write 8-bit grayscale field images and read them back.
pub mod png;

pub use crate::error::IoError;
