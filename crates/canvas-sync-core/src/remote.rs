//! Client side of the remote canvas service.

use crate::document::CanvasDocument;
use crate::element::Element;
use crate::wire::{CanvasEnvelope, DrawPayload, UpdateElementPayload};
use thiserror::Error;

/// Address of a locally running canvas service.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:31337";

/// Remote service errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Unreachable(String),
    #[error("Remote returned HTTP {0}")]
    Status(u16),
    #[error("Element not found: {0}")]
    NotFound(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations the engine needs from the remote canvas service.
///
/// Calls block the calling thread; the poll watch runs them on its own
/// worker thread.
pub trait RemoteCanvas: Send + Sync {
    /// Read the current canvas, normalized.
    fn fetch(&self) -> RemoteResult<CanvasDocument>;

    /// Replace the whole canvas.
    fn replace(&self, document: &CanvasDocument) -> RemoteResult<()>;

    /// Remove every element.
    fn clear(&self) -> RemoteResult<()>;

    /// Remove one element by id.
    fn remove_element(&self, id: &str) -> RemoteResult<()>;

    /// Replace one element by id.
    fn update_element(&self, id: &str, element: &Element) -> RemoteResult<()>;
}

/// [`RemoteCanvas`] over HTTP.
pub struct HttpRemote {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn element_url(&self, id: &str) -> String {
        let base = self.url("/canvas/element");
        let Ok(mut url) = url::Url::parse(&base) else {
            return format!("{}/{}", base, id);
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url.to_string()
    }

    /// Check that the service answers `GET /health`.
    pub fn health(&self) -> RemoteResult<()> {
        self.agent
            .get(&self.url("/health"))
            .call()
            .map(|_| ())
            .map_err(|e| map_error(e, None))
    }
}

impl Default for HttpRemote {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn map_error(err: ureq::Error, element_id: Option<&str>) -> RemoteError {
    match (err, element_id) {
        (ureq::Error::Status(404, _), Some(id)) => RemoteError::NotFound(id.to_string()),
        (ureq::Error::Status(code, _), _) => RemoteError::Status(code),
        (ureq::Error::Transport(transport), _) => RemoteError::Unreachable(transport.to_string()),
    }
}

impl RemoteCanvas for HttpRemote {
    fn fetch(&self) -> RemoteResult<CanvasDocument> {
        let response = self
            .agent
            .get(&self.url("/canvas"))
            .call()
            .map_err(|e| map_error(e, None))?;
        let envelope: CanvasEnvelope = response
            .into_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(envelope.canvas.into_document())
    }

    fn replace(&self, document: &CanvasDocument) -> RemoteResult<()> {
        self.agent
            .put(&self.url("/canvas"))
            .send_json(DrawPayload::from_document(document))
            .map(|_| ())
            .map_err(|e| map_error(e, None))
    }

    fn clear(&self) -> RemoteResult<()> {
        self.agent
            .post(&self.url("/canvas/clear"))
            .call()
            .map(|_| ())
            .map_err(|e| map_error(e, None))
    }

    fn remove_element(&self, id: &str) -> RemoteResult<()> {
        self.agent
            .delete(&self.element_url(id))
            .call()
            .map(|_| ())
            .map_err(|e| map_error(e, Some(id)))
    }

    fn update_element(&self, id: &str, element: &Element) -> RemoteResult<()> {
        let payload =
            UpdateElementPayload::new(element).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.agent
            .put(&self.element_url(id))
            .send_json(payload)
            .map(|_| ())
            .map_err(|e| map_error(e, Some(id)))
    }
}
