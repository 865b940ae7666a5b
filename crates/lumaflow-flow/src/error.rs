use std::path::PathBuf;

use lumaflow_image::ImageError;
use lumaflow_io::IoError;

/// An error type for the flow module.
#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    /// A video chunk addresses bytes outside the configured video format.
    #[error("Video chunk out of bounds: field {field}, line {line}, bytes {start}..{end}")]
    InvalidChunk {
        /// Field parity of the chunk.
        field: usize,
        /// Line within the field.
        line: usize,
        /// First byte offset of the chunk.
        start: usize,
        /// One past the last byte offset of the chunk.
        end: usize,
    },

    /// The configuration is inconsistent with itself or the video format.
    #[error("Invalid flow configuration. {0}")]
    InvalidConfig(String),

    /// The configuration could not be parsed.
    #[error("Failed to parse flow configuration. {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("Failed to read flow configuration {}. {source}", path.display())]
    ConfigRead {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying read error.
        source: std::io::Error,
    },

    /// Any other file system error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error from the image containers.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// A diagnostic image could not be written.
    #[error("Failed to write debug image. {0}")]
    Dump(#[from] IoError),
}
