//! Core tracking-curve types: points, point status, and per-curve metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::color::Rgba;
use crate::error::ValidationError;

/// Provenance / segment role of a tracked point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointStatus {
    #[default]
    Normal,
    /// Manually placed point; also re-opens a segment after an `Endframe`.
    Keyframe,
    Interpolated,
    /// Produced by a tracker.
    Tracked,
    /// Last point of an active tracking segment.
    Endframe,
}

impl PointStatus {
    pub const ALL: [Self; 5] = [
        Self::Normal,
        Self::Keyframe,
        Self::Interpolated,
        Self::Tracked,
        Self::Endframe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Keyframe => "keyframe",
            Self::Interpolated => "interpolated",
            Self::Tracked => "tracked",
            Self::Endframe => "endframe",
        }
    }
}

impl fmt::Display for PointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

/// A single tracked 2D position at a given frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub frame: i32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub status: PointStatus,
}

impl Point {
    /// Create a `Normal` point.
    pub fn new(frame: i32, x: f64, y: f64) -> Self {
        Self {
            frame,
            x,
            y,
            status: PointStatus::Normal,
        }
    }

    pub fn with_status(self, status: PointStatus) -> Self {
        Self { status, ..self }
    }

    pub fn with_position(self, x: f64, y: f64) -> Self {
        Self { x, y, ..self }
    }

    pub fn is_keyframe(&self) -> bool {
        self.status == PointStatus::Keyframe
    }

    pub fn is_endframe(&self) -> bool {
        self.status == PointStatus::Endframe
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {:.3}, {:.3}, {})",
            self.frame, self.x, self.y, self.status
        )
    }
}

fn default_visible() -> bool {
    true
}

/// Per-curve display metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveMetadata {
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub color: Option<Rgba>,
    /// Locked curves are shown but not meant to be edited by the UI.
    #[serde(default)]
    pub locked: bool,
}

impl Default for CurveMetadata {
    fn default() -> Self {
        Self {
            visible: true,
            color: None,
            locked: false,
        }
    }
}

/// Whether each point belongs to an active tracking segment.
///
/// Points after an `Endframe` are inactive until the next `Keyframe`.
/// The `Endframe` itself still closes its segment and is active.
pub fn segment_activity(points: &[Point]) -> Vec<bool> {
    let mut active = true;
    points
        .iter()
        .map(|point| {
            if point.is_keyframe() {
                active = true;
            }
            let current = active;
            if point.is_endframe() {
                active = false;
            }
            current
        })
        .collect()
}

/// True when frames are strictly ascending (sorted and unique).
pub fn is_frame_ordered(points: &[Point]) -> bool {
    first_unordered(points).is_none()
}

/// Index of the first point whose frame does not follow its predecessor's.
pub fn first_unordered(points: &[Point]) -> Option<usize> {
    points
        .windows(2)
        .position(|pair| pair[0].frame >= pair[1].frame)
        .map(|i| i + 1)
}

/// Position of the point at `frame`, assuming frame order.
pub fn find_frame(points: &[Point], frame: i32) -> Option<usize> {
    points.binary_search_by_key(&frame, |p| p.frame).ok()
}
