//! Line and arrow payloads.

use super::Point;
use serde::Serialize;
use serde_json::Value;

/// Points used when a line or arrow arrives without any.
pub const DEFAULT_LINEAR_POINTS: [Point; 2] = [[0.0, 0.0], [100.0, 100.0]];

/// Arrowhead drawn at the end of a fresh arrow.
pub const DEFAULT_END_ARROWHEAD: &str = "arrow";

/// Point path shared by lines and arrows.
///
/// Points are relative to the element's `(x, y)` and never empty once
/// normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearData {
    pub points: Vec<Point>,
    pub last_committed_point: Option<Point>,
    pub start_binding: Option<Value>,
    pub end_binding: Option<Value>,
    pub start_arrowhead: Option<String>,
    pub end_arrowhead: Option<String>,
}

impl LinearData {
    /// A plain line with no arrowheads.
    pub fn line(points: Vec<Point>) -> Self {
        Self {
            points: non_empty(points),
            last_committed_point: None,
            start_binding: None,
            end_binding: None,
            start_arrowhead: None,
            end_arrowhead: None,
        }
    }

    /// An arrow with the default end arrowhead.
    pub fn arrow(points: Vec<Point>) -> Self {
        Self {
            end_arrowhead: Some(DEFAULT_END_ARROWHEAD.to_string()),
            ..Self::line(points)
        }
    }

    /// Last point of the path.
    pub fn end_point(&self) -> Point {
        self.points.last().copied().unwrap_or([0.0, 0.0])
    }

    /// Check if either end is attached to another element.
    pub fn is_bound(&self) -> bool {
        self.start_binding.is_some() || self.end_binding.is_some()
    }
}

fn non_empty(points: Vec<Point>) -> Vec<Point> {
    if points.is_empty() {
        DEFAULT_LINEAR_POINTS.to_vec()
    } else {
        points
    }
}
