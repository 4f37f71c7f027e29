//! Suppression of change notifications caused by our own applies.

use crate::document::CanvasDocument;
use crate::surface::LiveSurface;
use std::time::{Duration, Instant};

/// Default time notifications are ignored after a programmatic apply.
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_millis(100);

/// Marks programmatic applies so their notifications are not taken for edits.
#[derive(Debug, Clone)]
pub struct EchoSuppressor {
    window: Duration,
    suppress_until: Option<Instant>,
}

impl Default for EchoSuppressor {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_WINDOW)
    }
}

impl EchoSuppressor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            suppress_until: None,
        }
    }

    /// Start (or extend) suppression at `now`.
    pub fn begin(&mut self, now: Instant) {
        self.suppress_until = Some(now + self.window);
    }

    /// Apply `document` to `surface` with suppression set beforehand.
    pub fn apply<S: LiveSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        document: &CanvasDocument,
        now: Instant,
    ) {
        self.begin(now);
        surface.apply(document);
    }

    /// Whether a notification arriving at `now` is an echo. Clears the flag
    /// once the window has passed.
    pub fn is_suppressed(&mut self, now: Instant) -> bool {
        match self.suppress_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.suppress_until = None;
                false
            }
            None => false,
        }
    }

    /// Drop any active suppression.
    pub fn reset(&mut self) {
        self.suppress_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;

    #[test]
    fn test_window_expires() {
        let start = Instant::now();
        let mut echo = EchoSuppressor::default();
        assert!(!echo.is_suppressed(start));

        echo.begin(start);
        assert!(echo.is_suppressed(start + Duration::from_millis(99)));
        assert!(!echo.is_suppressed(start + Duration::from_millis(100)));
        assert!(!echo.is_suppressed(start + Duration::from_millis(50)));
    }

    #[test]
    fn test_apply_sets_flag_first() {
        let start = Instant::now();
        let mut echo = EchoSuppressor::new(Duration::from_millis(10));
        let mut surface = MemorySurface::new();

        echo.apply(&mut surface, &CanvasDocument::new(), start);
        assert_eq!(surface.poll_changes().len(), 1);
        assert!(echo.is_suppressed(start + Duration::from_millis(5)));

        echo.reset();
        assert!(!echo.is_suppressed(start));
    }
}
