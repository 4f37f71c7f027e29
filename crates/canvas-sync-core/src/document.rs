//! Canvas document, app state and version timestamps.

use crate::element::Element;
use crate::normalize;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Binary assets keyed by file id. Carried verbatim, never diffed.
pub type Files = Map<String, Value>;

/// Presence info for every collaborator, keyed by collaborator id.
pub type Collaborators = BTreeMap<String, Value>;

/// Monotonic document version, in milliseconds since the Unix epoch.
///
/// On the wire this is either a number or an RFC 3339 string; both decode
/// to the same millisecond value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    /// Decode a wire token (number, numeric string or RFC 3339 string).
    pub fn from_token(token: &Value) -> Option<Self> {
        match token {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map(Self),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(millis) = s.parse::<i64>() {
                    return Some(Self(millis));
                }
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| Self(dt.timestamp_millis()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = Value::deserialize(deserializer)?;
        Self::from_token(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", token)))
    }
}

/// Viewport, theme and tool configuration plus the collaborator set.
///
/// The collaborator set is always a mapping here, whatever shape it had on
/// the wire. Every other setting is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct AppState {
    pub collaborators: Collaborators,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl From<Value> for AppState {
    fn from(value: Value) -> Self {
        normalize::normalize_app_state(value)
    }
}

impl AppState {
    /// Look up a setting by its wire name.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }
}

/// The full drawable state held by the surface, the cache and the remote.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub app_state: AppState,
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub version: Timestamp,
}

impl CanvasDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty document at the given version.
    pub fn empty_at(version: Timestamp) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Check if the document has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements, deleted ones included.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Get an element by id.
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a document from JSON. Elements pass through the normalizer.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
