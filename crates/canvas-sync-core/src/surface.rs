//! Boundary to the live drawing surface.

use crate::document::{AppState, CanvasDocument, Files, Timestamp};
use crate::element::Element;

/// A change notification from the live surface.
///
/// The surface reports every mutation the same way, whether a user made it or
/// the engine applied it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceChange {
    pub elements: Vec<Element>,
    pub app_state: AppState,
    pub files: Files,
}

impl SurfaceChange {
    /// Snapshot the drawable parts of a document.
    pub fn from_document(document: &CanvasDocument) -> Self {
        Self {
            elements: document.elements.clone(),
            app_state: document.app_state.clone(),
            files: document.files.clone(),
        }
    }

    pub fn into_document(self, version: Timestamp) -> CanvasDocument {
        CanvasDocument {
            elements: self.elements,
            app_state: self.app_state,
            files: self.files,
            version,
        }
    }
}

/// The in-memory drawing surface the engine keeps in sync.
pub trait LiveSurface {
    /// Replace the whole scene.
    fn apply(&mut self, document: &CanvasDocument);

    /// Current scene.
    fn read(&self) -> CanvasDocument;

    /// Drain change notifications raised since the last call.
    fn poll_changes(&mut self) -> Vec<SurfaceChange>;
}

/// A surface that only holds the scene in memory.
///
/// Used by headless hosts and tests. Every mutation, including
/// [`LiveSurface::apply`], queues a change notification.
#[derive(Debug, Default)]
pub struct MemorySurface {
    scene: CanvasDocument,
    pending: Vec<SurfaceChange>,
    applied: usize,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the scene the way a user would and notify.
    pub fn edit(&mut self, f: impl FnOnce(&mut CanvasDocument)) {
        f(&mut self.scene);
        self.pending.push(SurfaceChange::from_document(&self.scene));
    }

    /// Number of programmatic applies so far.
    pub fn apply_count(&self) -> usize {
        self.applied
    }

    /// Borrow the current scene.
    pub fn scene(&self) -> &CanvasDocument {
        &self.scene
    }
}

impl LiveSurface for MemorySurface {
    fn apply(&mut self, document: &CanvasDocument) {
        self.scene = document.clone();
        self.applied += 1;
        self.pending.push(SurfaceChange::from_document(&self.scene));
    }

    fn read(&self) -> CanvasDocument {
        self.scene.clone()
    }

    fn poll_changes(&mut self) -> Vec<SurfaceChange> {
        std::mem::take(&mut self.pending)
    }
}
