//! Image payload.

use serde::Serialize;

/// Status of an image whose file has not been loaded yet.
pub const STATUS_PENDING: &str = "pending";

/// Reference to an entry of the document's `files` map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub file_id: Option<String>,
    pub status: String,
    pub scale: [f64; 2],
}

impl Default for ImageData {
    fn default() -> Self {
        Self {
            file_id: None,
            status: STATUS_PENDING.to_string(),
            scale: [1.0, 1.0],
        }
    }
}
