//! Turns partially specified input into structurally complete documents.
//!
//! Nothing here rejects input. Missing or malformed fields are filled with
//! defaults, unknown element types become rectangles and unknown fields are
//! kept verbatim.

use crate::document::{AppState, CanvasDocument, Collaborators, Files, Timestamp};
use crate::element::{
    DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT, Element, ElementKind,
    FreedrawData, ImageData, LinearData, Point, STATUS_PENDING, TextData,
};
use crate::error::SyncError;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

pub const DEFAULT_STROKE_COLOR: &str = "#000000";
pub const DEFAULT_BACKGROUND_COLOR: &str = "transparent";
pub const DEFAULT_FILL_STYLE: &str = "solid";
pub const DEFAULT_STROKE_STYLE: &str = "solid";
pub const DEFAULT_OPACITY: f64 = 100.0;
pub const DEFAULT_ROUGHNESS: f64 = 1.0;
pub const DEFAULT_STROKE_WIDTH: f64 = 1.0;
/// Width and height given to box-like shapes that arrive without a size.
pub const DEFAULT_EXTENT: f64 = 100.0;

/// Keys of the collaborator entries that can name the collaborator.
const COLLABORATOR_ID_KEYS: [&str; 3] = ["id", "socketId", "clientId"];

/// Generate a fresh element id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Random positive 31-bit integer, as used for `seed` and `versionNonce`.
pub fn generate_seed() -> i64 {
    rand::rng().random_range(1..i64::from(i32::MAX))
}

/// Normalize a single element. Non-object input yields a default rectangle.
pub fn normalize_element(value: Value) -> Element {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            gap(format_args!("element is not an object: {}", other));
            Map::new()
        }
    };

    let type_name = match map.remove("type") {
        Some(Value::String(name)) if ElementKind::TYPE_NAMES.contains(&name.as_str()) => name,
        Some(other) => {
            log::warn!("Unknown element type {}, treating as rectangle", other);
            "rectangle".to_string()
        }
        None => {
            gap(format_args!("element without type, treating as rectangle"));
            "rectangle".to_string()
        }
    };

    let id = match take_opt_string(&mut map, "id") {
        Some(id) if !id.is_empty() => id,
        _ => {
            gap(format_args!("element without id"));
            generate_id()
        }
    };

    let default_extent = match type_name.as_str() {
        "rectangle" | "ellipse" | "diamond" | "image" => DEFAULT_EXTENT,
        _ => 0.0,
    };

    Element {
        x: take_f64(&mut map, "x", 0.0),
        y: take_f64(&mut map, "y", 0.0),
        width: take_f64(&mut map, "width", default_extent),
        height: take_f64(&mut map, "height", default_extent),
        angle: take_f64(&mut map, "angle", 0.0),
        stroke_color: take_string(&mut map, "strokeColor", DEFAULT_STROKE_COLOR),
        background_color: take_string(&mut map, "backgroundColor", DEFAULT_BACKGROUND_COLOR),
        fill_style: take_string(&mut map, "fillStyle", DEFAULT_FILL_STYLE),
        stroke_width: take_f64(&mut map, "strokeWidth", DEFAULT_STROKE_WIDTH),
        stroke_style: take_string(&mut map, "strokeStyle", DEFAULT_STROKE_STYLE),
        roughness: take_f64(&mut map, "roughness", DEFAULT_ROUGHNESS),
        opacity: take_f64(&mut map, "opacity", DEFAULT_OPACITY),
        seed: take_i64(&mut map, "seed").unwrap_or_else(generate_seed),
        version: take_i64(&mut map, "version").unwrap_or(1),
        version_nonce: take_i64(&mut map, "versionNonce").unwrap_or_else(generate_seed),
        is_deleted: take_bool(&mut map, "isDeleted"),
        locked: take_bool(&mut map, "locked"),
        group_ids: take_string_list(&mut map, "groupIds"),
        frame_id: take_opt_string(&mut map, "frameId"),
        bound_elements: take_non_null(&mut map, "boundElements"),
        updated: take_i64(&mut map, "updated").unwrap_or_else(|| Timestamp::now().as_millis()),
        link: take_opt_string(&mut map, "link"),
        kind: take_kind(&type_name, &mut map),
        id,
        extra: map,
    }
}

/// Normalize an element list. Non-array input yields an empty list.
///
/// Later elements whose id repeats an earlier one get a fresh id.
pub fn normalize_elements(value: Value) -> Vec<Element> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            gap(format_args!("elements is not a list: {}", other));
            return Vec::new();
        }
    };

    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .map(|item| {
            let mut element = normalize_element(item);
            if !seen.insert(element.id.clone()) {
                gap(format_args!("duplicate element id {}", element.id));
                element.id = generate_id();
                seen.insert(element.id.clone());
            }
            element
        })
        .collect()
}

/// Normalize app state. Non-object input yields the default state.
pub fn normalize_app_state(value: Value) -> AppState {
    let mut settings = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let collaborators = normalize_collaborators(settings.remove("collaborators"));
    AppState {
        collaborators,
        settings,
    }
}

/// Rebuild the collaborator set as a mapping.
///
/// Accepts an array of `[id, info]` pairs, an array of objects carrying their
/// own id, an object keyed by id, or nothing.
pub fn normalize_collaborators(value: Option<Value>) -> Collaborators {
    let mut collaborators = Collaborators::new();
    match value {
        Some(Value::Object(map)) => {
            for (id, info) in map {
                collaborators.insert(id, presence(info));
            }
        }
        Some(Value::Array(entries)) => {
            for entry in entries {
                match entry {
                    Value::Array(pair) => {
                        let mut pair = pair.into_iter();
                        if let (Some(Value::String(id)), info) = (pair.next(), pair.next()) {
                            collaborators.insert(id, presence(info.unwrap_or(Value::Null)));
                        }
                    }
                    Value::Object(info) => {
                        let id = COLLABORATOR_ID_KEYS
                            .iter()
                            .find_map(|key| info.get(*key).and_then(Value::as_str))
                            .map(str::to_string);
                        match id {
                            Some(id) => {
                                collaborators.insert(id, Value::Object(info));
                            }
                            None => log::debug!("Dropping collaborator without id"),
                        }
                    }
                    _ => log::debug!("Dropping malformed collaborator entry"),
                }
            }
        }
        _ => {}
    }
    collaborators
}

/// Binary files must be a mapping; anything else becomes empty.
pub fn normalize_files(value: Option<Value>) -> Files {
    match value {
        Some(Value::Object(files)) => files,
        Some(Value::Null) | None => Files::new(),
        Some(_) => {
            gap(format_args!("files is not a mapping"));
            Files::new()
        }
    }
}

/// Assemble a complete document from optional wire parts.
pub fn normalize_document(
    elements: Option<Value>,
    app_state: Option<Value>,
    files: Option<Value>,
    version: Timestamp,
) -> CanvasDocument {
    CanvasDocument {
        elements: normalize_elements(elements.unwrap_or(Value::Null)),
        app_state: normalize_app_state(app_state.unwrap_or(Value::Null)),
        files: normalize_files(files),
        version,
    }
}

fn gap(detail: std::fmt::Arguments<'_>) {
    log::debug!("{}", SyncError::NormalizationGap(detail.to_string()));
}

fn presence(info: Value) -> Value {
    match info {
        Value::Object(_) => info,
        _ => Value::Object(Map::new()),
    }
}

fn take_kind(type_name: &str, map: &mut Map<String, Value>) -> ElementKind {
    match type_name {
        "ellipse" => ElementKind::Ellipse,
        "diamond" => ElementKind::Diamond,
        "arrow" => ElementKind::Arrow(take_linear(map, true)),
        "line" => ElementKind::Line(take_linear(map, false)),
        "freedraw" => ElementKind::Freedraw(FreedrawData {
            points: take_points(map, "points"),
            pressures: take_f64_list(map, "pressures"),
            simulate_pressure: take_bool(map, "simulatePressure"),
            last_committed_point: take_point(map, "lastCommittedPoint"),
        }),
        "text" => {
            let text = take_string(map, "text", "");
            let original_text =
                take_opt_string(map, "originalText").unwrap_or_else(|| text.clone());
            ElementKind::Text(TextData {
                text,
                font_size: take_f64(map, "fontSize", DEFAULT_FONT_SIZE),
                font_family: take_i64(map, "fontFamily").unwrap_or(DEFAULT_FONT_FAMILY),
                text_align: take_string(map, "textAlign", "left"),
                vertical_align: take_string(map, "verticalAlign", "top"),
                line_height: take_f64(map, "lineHeight", DEFAULT_LINE_HEIGHT),
                original_text,
                container_id: take_opt_string(map, "containerId"),
            })
        }
        "image" => {
            let defaults = ImageData::default();
            let scale = match take_f64_list(map, "scale").as_slice() {
                [sx, sy, ..] => [*sx, *sy],
                _ => defaults.scale,
            };
            ElementKind::Image(ImageData {
                file_id: take_opt_string(map, "fileId"),
                status: take_string(map, "status", STATUS_PENDING),
                scale,
            })
        }
        _ => ElementKind::Rectangle,
    }
}

fn take_linear(map: &mut Map<String, Value>, arrow: bool) -> LinearData {
    let points = take_points(map, "points");
    let mut data = if arrow {
        LinearData::arrow(points)
    } else {
        LinearData::line(points)
    };
    data.last_committed_point = take_point(map, "lastCommittedPoint");
    data.start_binding = take_non_null(map, "startBinding");
    data.end_binding = take_non_null(map, "endBinding");
    if let Some(head) = map.remove("startArrowhead") {
        data.start_arrowhead = head.as_str().map(str::to_string);
    }
    if let Some(head) = map.remove("endArrowhead") {
        data.end_arrowhead = head.as_str().map(str::to_string);
    }
    data
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

fn take_f64(map: &mut Map<String, Value>, key: &str, default: f64) -> f64 {
    map.remove(key).as_ref().and_then(as_number).unwrap_or(default)
}

fn take_i64(map: &mut Map<String, Value>, key: &str) -> Option<i64> {
    let value = map.remove(key)?;
    value.as_i64().or_else(|| as_number(&value).map(|f| f as i64))
}

fn take_bool(map: &mut Map<String, Value>, key: &str) -> bool {
    match map.remove(key) {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str, default: &str) -> String {
    take_opt_string(map, key).unwrap_or_else(|| default.to_string())
}

fn take_opt_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn take_non_null(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    map.remove(key).filter(|v| !v.is_null())
}

fn take_string_list(map: &mut Map<String, Value>, key: &str) -> Vec<String> {
    match map.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn take_f64_list(map: &mut Map<String, Value>, key: &str) -> Vec<f64> {
    match map.remove(key) {
        Some(Value::Array(items)) => items.iter().filter_map(as_number).collect(),
        _ => Vec::new(),
    }
}

fn to_point(value: &Value) -> Option<Point> {
    match value.as_array()?.as_slice() {
        [x, y, ..] => Some([as_number(x)?, as_number(y)?]),
        _ => None,
    }
}

fn take_point(map: &mut Map<String, Value>, key: &str) -> Option<Point> {
    map.remove(key).as_ref().and_then(to_point)
}

fn take_points(map: &mut Map<String, Value>, key: &str) -> Vec<Point> {
    match map.remove(key) {
        Some(Value::Array(items)) => items.iter().filter_map(to_point).collect(),
        _ => Vec::new(),
    }
}
