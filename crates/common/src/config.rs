//! Configuration structs for the state store, history, and spatial index.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};

/// Undo/redo history settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of retained snapshots.
    pub max_size: usize,
    /// Deflate level (0-9).
    pub compression_level: u32,
    /// Encoded snapshots smaller than this are stored uncompressed.
    pub compression_min_bytes: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            compression_level: 6,
            compression_min_bytes: 256,
        }
    }
}

/// Grid settings for the point spatial index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Fixed cell size in screen pixels. `None` derives it from point density.
    pub cell_size: Option<f64>,
    /// Average points per cell aimed for by the adaptive cell size.
    pub target_occupancy: f64,
    pub min_cell_size: f64,
    pub max_cell_size: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            cell_size: None,
            target_occupancy: 4.0,
            min_cell_size: 8.0,
            max_cell_size: 256.0,
        }
    }
}

/// Top-level store configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub history: HistoryConfig,
    pub spatial: SpatialConfig,
    /// Upper bound accepted by the image-sequence bulk setter.
    pub max_image_files: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            spatial: SpatialConfig::default(),
            max_image_files: 10_000,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidConfig {
            field,
            reason: format!("must be a positive finite number, got {value}"),
        })
    }
}

impl StoreConfig {
    /// Parse a JSON document (missing fields take defaults) and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        tracing::debug!(
            history_max = config.history.max_size,
            max_image_files = config.max_image_files,
            "Store configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.history.max_size == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "history.max_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.history.compression_level > 9 {
            return Err(ValidationError::InvalidConfig {
                field: "history.compression_level",
                reason: format!("must be 0-9, got {}", self.history.compression_level),
            });
        }

        let spatial = &self.spatial;
        if let Some(cell_size) = spatial.cell_size {
            positive("spatial.cell_size", cell_size)?;
        }
        positive("spatial.target_occupancy", spatial.target_occupancy)?;
        positive("spatial.min_cell_size", spatial.min_cell_size)?;
        positive("spatial.max_cell_size", spatial.max_cell_size)?;
        if spatial.min_cell_size > spatial.max_cell_size {
            return Err(ValidationError::InvalidConfig {
                field: "spatial.min_cell_size",
                reason: "must not exceed spatial.max_cell_size".into(),
            });
        }

        if self.max_image_files == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "max_image_files",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
