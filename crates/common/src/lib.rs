//! `ct-common` -- Shared types, configuration, and errors for the curve-tracking editor core.
//!
//! This crate is the foundation that the state store depends on:
//!
//! - **Types**: `Point`, `PointStatus`, `CurveMetadata`, segment helpers
//! - **View**: `ViewState`, the immutable zoom/pan/flip transform
//! - **Color**: `Rgba` curve colors
//! - **Config**: `StoreConfig`, `HistoryConfig`, `SpatialConfig`
//! - **Errors**: `ValidationError`, `ConfigError` (thiserror-based)

pub mod color;
pub mod config;
pub mod error;
pub mod types;
pub mod view;

// Re-export commonly used items at crate root
pub use color::Rgba;
pub use config::{HistoryConfig, SpatialConfig, StoreConfig};
pub use error::{ConfigError, ValidationError};
pub use types::{
    find_frame, first_unordered, is_frame_ordered, segment_activity, CurveMetadata, Point,
    PointStatus,
};
pub use view::ViewState;
