//! Custom error types for dipkit.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the dipkit library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to read pixel data from a DICOM file.
    #[error("failed to read DICOM file {path}: {message}")]
    Dicom { path: PathBuf, message: String },

    /// The file format is not supported by this build.
    #[error("unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Image dimensions are not supported.
    #[error("unsupported image dimensions {width}x{height}: {reason}")]
    UnsupportedDimensions {
        width: u32,
        height: u32,
        reason: String,
    },

    /// Channel count cannot be represented as an image.
    #[error("unsupported channel count {channels}: {reason}")]
    UnsupportedChannels { channels: usize, reason: String },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// An entry in an optimization target list is not recognised.
    #[error("unknown optimization target {0:?}, expected one of net, down, input")]
    UnknownOptTarget(String),

    /// `down` was requested without a downsampler.
    #[error("optimization over `down` requested but no downsampler was given")]
    MissingDownsampler,

    /// A grid was requested for zero images.
    #[error("cannot build an image grid from an empty list")]
    EmptyGrid,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

impl Error {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for dipkit operations.
pub type Result<T> = std::result::Result<T, Error>;
