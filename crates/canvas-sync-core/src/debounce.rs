//! Coalescing of live edits into durable writes.

use crate::document::{AppState, CanvasDocument, Files};
use crate::element::Element;
use crate::surface::SurfaceChange;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, Instant};

/// Default quiet period before a burst of edits is written.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(300);

/// SHA-256 of the canonical serialization of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalScene<'a> {
    elements: &'a [Element],
    app_state: &'a AppState,
    files: &'a Files,
}

impl ContentDigest {
    pub fn of(elements: &[Element], app_state: &AppState, files: &Files) -> Self {
        let scene = CanonicalScene {
            elements,
            app_state,
            files,
        };
        // Plain data with string keys; serialization cannot fail.
        let bytes = serde_json::to_vec(&scene).unwrap_or_default();
        let hash = Sha256::digest(&bytes);
        Self(hash.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Digest of a document's content. The version is not part of it.
    pub fn of_document(document: &CanvasDocument) -> Self {
        Self::of(&document.elements, &document.app_state, &document.files)
    }

    pub fn of_change(change: &SurfaceChange) -> Self {
        Self::of(&change.elements, &change.app_state, &change.files)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// A write waiting for its quiet period to end.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub change: SurfaceChange,
    pub digest: ContentDigest,
    pub due: Instant,
}

/// What a change notification did to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceOutcome {
    /// Content matches what is already persisted; nothing pending.
    Unchanged,
    /// A write is due at the given instant.
    Scheduled(Instant),
}

/// Coalesces bursts of change notifications into one write.
#[derive(Debug)]
pub struct ChangeDebouncer {
    delay: Duration,
    last_persisted: Option<ContentDigest>,
    pending: Option<PendingWrite>,
}

impl Default for ChangeDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_DELAY)
    }
}

impl ChangeDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_persisted: None,
            pending: None,
        }
    }

    /// Record a change seen at `now`.
    ///
    /// Content equal to the last persisted write cancels any pending write.
    /// Anything else replaces the pending write and restarts the delay.
    pub fn on_change(&mut self, change: SurfaceChange, now: Instant) -> DebounceOutcome {
        let digest = ContentDigest::of_change(&change);
        if self.last_persisted.as_ref() == Some(&digest) {
            if self.pending.take().is_some() {
                log::trace!("Edit reverted to persisted content {}", digest);
            }
            return DebounceOutcome::Unchanged;
        }

        let due = now + self.delay;
        self.pending = Some(PendingWrite { change, digest, due });
        DebounceOutcome::Scheduled(due)
    }

    /// Take the pending write if its delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<PendingWrite> {
        match &self.pending {
            Some(pending) if pending.due <= now => self.pending.take(),
            _ => None,
        }
    }

    /// Remember the content that is now durable.
    pub fn mark_persisted(&mut self, digest: ContentDigest) {
        self.last_persisted = Some(digest);
    }

    /// Drop the pending write. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Forget everything, including the last persisted digest.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_persisted = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending write is due, if there is one.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    pub fn last_persisted(&self) -> Option<&ContentDigest> {
        self.last_persisted.as_ref()
    }
}
