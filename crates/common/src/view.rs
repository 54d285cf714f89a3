//! Immutable view transform shared by the store, spatial index, and renderer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Zoom / pan / flip state of the curve view.
///
/// A `ViewState` is never mutated in place: every `with_*` constructor returns
/// a new value, so copies held by observers stay valid snapshots.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
    flip_y: bool,
    scale_to_image: bool,
    image_width: f64,
    image_height: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            flip_y: false,
            scale_to_image: true,
            image_width: 1920.0,
            image_height: 1080.0,
        }
    }
}

impl ViewState {
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    pub fn scale_to_image(&self) -> bool {
        self.scale_to_image
    }

    pub fn image_size(&self) -> (f64, f64) {
        (self.image_width, self.image_height)
    }

    pub fn with_zoom(self, zoom: f64) -> Result<Self, ValidationError> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(ValidationError::InvalidZoom(zoom));
        }
        Ok(Self { zoom, ..self })
    }

    pub fn with_pan(self, pan_x: f64, pan_y: f64) -> Self {
        Self {
            pan_x,
            pan_y,
            ..self
        }
    }

    pub fn with_flip_y(self, flip_y: bool) -> Self {
        Self { flip_y, ..self }
    }

    pub fn with_scale_to_image(self, scale_to_image: bool) -> Self {
        Self {
            scale_to_image,
            ..self
        }
    }

    pub fn with_image_size(self, width: f64, height: f64) -> Self {
        Self {
            image_width: width,
            image_height: height,
            ..self
        }
    }

    /// Map curve-data coordinates to screen coordinates.
    pub fn data_to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        let y = if self.flip_y { self.image_height - y } else { y };
        (x * self.zoom + self.pan_x, y * self.zoom + self.pan_y)
    }

    /// Inverse of [`data_to_screen`](Self::data_to_screen).
    pub fn screen_to_data(&self, screen_x: f64, screen_y: f64) -> (f64, f64) {
        let x = (screen_x - self.pan_x) / self.zoom;
        let y = (screen_y - self.pan_y) / self.zoom;
        let y = if self.flip_y { self.image_height - y } else { y };
        (x, y)
    }
}
