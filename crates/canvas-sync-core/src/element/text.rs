//! Text payload.

use serde::Serialize;

/// Default font size in canvas units.
pub const DEFAULT_FONT_SIZE: f64 = 20.0;
/// Default font family (the hand-drawn face).
pub const DEFAULT_FONT_FAMILY: i64 = 1;
/// Default line height as a multiple of the font size.
pub const DEFAULT_LINE_HEIGHT: f64 = 1.25;

/// Content and layout of a text element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextData {
    pub text: String,
    pub font_size: f64,
    pub font_family: i64,
    pub text_align: String,
    pub vertical_align: String,
    pub line_height: f64,
    /// Text before any wrapping applied by a container.
    pub original_text: String,
    /// Id of the shape this text is bound inside, if any.
    pub container_id: Option<String>,
}

impl Default for TextData {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl TextData {
    /// Create unbound, left/top aligned text.
    pub fn new(text: String) -> Self {
        Self {
            original_text: text.clone(),
            text,
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY,
            text_align: "left".to_string(),
            vertical_align: "top".to_string(),
            line_height: DEFAULT_LINE_HEIGHT,
            container_id: None,
        }
    }

    /// Check if the text is bound inside a container shape.
    pub fn is_bound(&self) -> bool {
        self.container_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_copies_original_text() {
        let data = TextData::new("hello".to_string());
        assert_eq!(data.original_text, "hello");
        assert_eq!(data.font_size, DEFAULT_FONT_SIZE);
        assert!(!data.is_bound());
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(TextData::default()).unwrap();
        assert_eq!(value["textAlign"], "left");
        assert_eq!(value["verticalAlign"], "top");
        assert_eq!(value["lineHeight"], 1.25);
        assert!(value["containerId"].is_null());
    }
}
