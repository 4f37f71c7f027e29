//! Wire types of the remote canvas service.
//!
//! Shared by the client side (`remote`, `watch`) and the reference service.

use crate::document::{CanvasDocument, Timestamp};
use crate::element::Element;
use crate::normalize;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the event stream carrying full-canvas draw notifications.
pub const DRAW_STREAM: &str = "excalidraw_draw";

/// Canvas as stored and served by the remote service.
///
/// Every part is optional on the wire; `appState` is also accepted as
/// `app_state`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasData {
    #[serde(default)]
    pub elements: Option<Value>,
    #[serde(default, rename = "appState", alias = "app_state")]
    pub app_state: Option<Value>,
    #[serde(default)]
    pub files: Option<Value>,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl CanvasData {
    /// Wire form of a document, stamped with the document version.
    pub fn from_document(document: &CanvasDocument) -> Self {
        Self {
            elements: serde_json::to_value(&document.elements).ok(),
            app_state: serde_json::to_value(&document.app_state).ok(),
            files: Some(Value::Object(document.files.clone())),
            updated_at: document.version,
        }
    }

    /// Normalize into a complete document versioned at `updated_at`.
    pub fn into_document(self) -> CanvasDocument {
        normalize::normalize_document(self.elements, self.app_state, self.files, self.updated_at)
    }

    /// Number of elements, if `elements` is a list.
    pub fn element_count(&self) -> usize {
        self.elements
            .as_ref()
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Response body of `GET /canvas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasEnvelope {
    pub canvas: CanvasData,
}

/// Body of `PUT /canvas` and `POST /draw`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawPayload {
    #[serde(default)]
    pub elements: Option<Value>,
    #[serde(default, rename = "appState", alias = "app_state")]
    pub app_state: Option<Value>,
    #[serde(default)]
    pub files: Option<Value>,
}

impl DrawPayload {
    pub fn from_document(document: &CanvasDocument) -> Self {
        let data = CanvasData::from_document(document);
        Self {
            elements: data.elements,
            app_state: data.app_state,
            files: data.files,
        }
    }
}

/// Body of `PUT /canvas/element/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateElementPayload {
    pub element: Value,
}

impl UpdateElementPayload {
    pub fn new(element: &Element) -> Result<Self, serde_json::Error> {
        Ok(Self {
            element: serde_json::to_value(element)?,
        })
    }
}

/// Generic acknowledgement returned by mutating routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Messages a client sends on the event stream socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving a named stream
    Subscribe { stream: String },
    /// Stop receiving the current stream
    Unsubscribe,
}

/// Messages the service sends on the event stream socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription confirmed
    Subscribed { stream: String },
    /// Full canvas after a mutation
    Draw { stream: String, canvas: CanvasData },
    /// Error message
    Error { message: String },
}
