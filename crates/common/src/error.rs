//! Validation and configuration errors (thiserror-based).

use thiserror::Error;

/// Input rejected before any state was touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Too many image files: {count} exceeds the limit of {max}")]
    TooManyImageFiles { count: usize, max: usize },

    #[error("Image file entry {index} is empty")]
    EmptyImageFile { index: usize },

    #[error("Curve {curve:?}: point {index} (frame {frame}) is out of frame order")]
    UnorderedFrames {
        curve: String,
        index: usize,
        frame: i32,
    },

    #[error("Zoom must be a positive finite number, got {0}")]
    InvalidZoom(f64),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    #[error("Unknown point status: {0:?}")]
    UnknownStatus(String),
}

/// Errors raised while loading a [`StoreConfig`](crate::StoreConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}
