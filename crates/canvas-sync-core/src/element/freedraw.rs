//! Freehand stroke payload.

use super::Point;
use serde::Serialize;

/// A freehand stroke. Unlike lines, the point list may be empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreedrawData {
    /// Points relative to the element origin.
    pub points: Vec<Point>,
    /// Per-point pen pressure, `0.0..=1.0`. May be shorter than `points`.
    pub pressures: Vec<f64>,
    pub simulate_pressure: bool,
    pub last_committed_point: Option<Point>,
}

impl FreedrawData {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    /// Pressure at a point index, falling back to full pressure.
    pub fn pressure_at(&self, index: usize) -> f64 {
        self.pressures.get(index).copied().unwrap_or(1.0)
    }
}
