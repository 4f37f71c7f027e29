//! Drawn primitives.
//!
//! An [`Element`] carries the fields common to every primitive plus an
//! [`ElementKind`] payload. Elements can only be built from arbitrary input
//! through the normalizer, so every instance is structurally complete.

mod freedraw;
mod image;
mod linear;
mod text;

pub use freedraw::FreedrawData;
pub use image::{ImageData, STATUS_PENDING};
pub use linear::{DEFAULT_END_ARROWHEAD, DEFAULT_LINEAR_POINTS, LinearData};
pub use text::{DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT, TextData};

use crate::normalize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A 2-D point relative to the owning element's origin.
pub type Point = [f64; 2];

/// A drawn primitive.
///
/// Fields the model does not know about are kept in `extra` and written back
/// out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub stroke_color: String,
    pub background_color: String,
    pub fill_style: String,
    pub stroke_width: f64,
    pub stroke_style: String,
    pub roughness: f64,
    pub opacity: f64,
    pub seed: i64,
    pub version: i64,
    pub version_nonce: i64,
    pub is_deleted: bool,
    pub locked: bool,
    pub group_ids: Vec<String>,
    pub frame_id: Option<String>,
    pub bound_elements: Option<Value>,
    pub updated: i64,
    pub link: Option<String>,
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for Element {
    fn from(value: Value) -> Self {
        normalize::normalize_element(value)
    }
}

/// Type-specific payload, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Arrow(LinearData),
    Line(LinearData),
    Freedraw(FreedrawData),
    Text(TextData),
    Image(ImageData),
}

impl ElementKind {
    /// Every wire type name, in declaration order.
    pub const TYPE_NAMES: [&'static str; 8] = [
        "rectangle",
        "ellipse",
        "diamond",
        "arrow",
        "line",
        "freedraw",
        "text",
        "image",
    ];

    /// Wire name of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Rectangle => "rectangle",
            ElementKind::Ellipse => "ellipse",
            ElementKind::Diamond => "diamond",
            ElementKind::Arrow(_) => "arrow",
            ElementKind::Line(_) => "line",
            ElementKind::Freedraw(_) => "freedraw",
            ElementKind::Text(_) => "text",
            ElementKind::Image(_) => "image",
        }
    }

    /// Check if this kind carries a point path.
    pub fn is_path(&self) -> bool {
        matches!(
            self,
            ElementKind::Arrow(_) | ElementKind::Line(_) | ElementKind::Freedraw(_)
        )
    }

    /// Points of a path kind, relative to the element origin.
    pub fn points(&self) -> Option<&[Point]> {
        match self {
            ElementKind::Arrow(data) | ElementKind::Line(data) => Some(&data.points),
            ElementKind::Freedraw(data) => Some(&data.points),
            _ => None,
        }
    }
}

impl Element {
    /// Wire name of the element type.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Text content, for text elements.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Text(data) => Some(&data.text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_writes_type_tag_and_payload() {
        let element: Element = serde_json::from_value(json!({
            "id": "a1", "type": "arrow", "x": 0, "y": 0, "width": 10, "height": 10,
            "points": [[0, 0], [10, 10]]
        }))
        .unwrap();
        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["type"], "arrow");
        assert_eq!(value["points"], json!([[0.0, 0.0], [10.0, 10.0]]));
        assert_eq!(value["endArrowhead"], "arrow");
        assert_eq!(value["strokeColor"], "#000000");
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let element: Element = serde_json::from_value(json!({
            "id": "r", "type": "rectangle", "customData": {"owner": "bob"}, "roundness": {"type": 3}
        }))
        .unwrap();
        assert_eq!(element.extra.get("customData"), Some(&json!({"owner": "bob"})));

        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["roundness"], json!({"type": 3}));

        let again: Element = serde_json::from_value(value).unwrap();
        assert_eq!(again, element);
    }

    #[test]
    fn test_type_names_cover_every_kind() {
        for name in ElementKind::TYPE_NAMES {
            let element: Element =
                serde_json::from_value(json!({"id": name, "type": name})).unwrap();
            assert_eq!(element.type_name(), name);
        }
    }

    #[test]
    fn test_points_accessor() {
        let line: Element = serde_json::from_value(json!({"id": "l", "type": "line"})).unwrap();
        assert!(line.kind.is_path());
        assert_eq!(line.kind.points().map(|p| p.len()), Some(2));

        let text: Element =
            serde_json::from_value(json!({"id": "t", "type": "text", "text": "hi"})).unwrap();
        assert_eq!(text.text(), Some("hi"));
        assert!(text.kind.points().is_none());
    }
}
