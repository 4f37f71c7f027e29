//! Fixed-period polling of the remote canvas.

use super::{ObservationSource, RemoteWatch, SyncObservation, WatchError, WatchMode};
use crate::document::Timestamp;
use crate::remote::RemoteCanvas;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Remembers the newest `updated_at` a poll has forwarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollCursor {
    last_seen: Option<Timestamp>,
}

impl PollCursor {
    /// Accept `timestamp` if strictly newer than anything seen so far.
    pub fn advance(&mut self, timestamp: Timestamp) -> bool {
        if self.last_seen.is_some_and(|seen| timestamp <= seen) {
            return false;
        }
        self.last_seen = Some(timestamp);
        true
    }

    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_seen
    }
}

/// Polls [`RemoteCanvas::fetch`] on a worker thread.
///
/// The worker only fetches and forwards; failures are logged at debug level
/// and retried on the next tick.
pub struct PollWatch {
    observations: Receiver<SyncObservation>,
    stop_tx: Option<Sender<()>>,
    _thread: Option<JoinHandle<()>>,
}

impl PollWatch {
    /// Start polling every `interval`. The first fetch happens one interval
    /// after the start.
    pub fn spawn(remote: Arc<dyn RemoteCanvas>, interval: Duration) -> Result<Self, WatchError> {
        let (obs_tx, obs_rx) = channel();
        let (stop_tx, stop_rx) = channel::<()>();

        let handle = thread::Builder::new()
            .name("canvas-poll".to_string())
            .spawn(move || {
                let mut cursor = PollCursor::default();
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    match remote.fetch() {
                        Ok(document) => {
                            if !cursor.advance(document.version) {
                                continue;
                            }
                            log::debug!("Poll saw canvas at {}", document.version);
                            let obs = SyncObservation::new(ObservationSource::RemotePoll, document);
                            if obs_tx.send(obs).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::debug!("Poll skipped: {}", e),
                    }
                }
                log::debug!("Poll worker exiting");
            })
            .map_err(|e| WatchError::Spawn(e.to_string()))?;

        Ok(Self {
            observations: obs_rx,
            stop_tx: Some(stop_tx),
            _thread: Some(handle),
        })
    }
}

impl RemoteWatch for PollWatch {
    fn mode(&self) -> WatchMode {
        WatchMode::Poll
    }

    fn poll_observations(&mut self) -> Vec<SyncObservation> {
        if self.stop_tx.is_none() {
            return Vec::new();
        }
        self.observations.try_iter().collect()
    }

    fn close(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
            log::debug!("Poll watch closed");
        }
        self._thread = None;
    }

    fn is_open(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for PollWatch {
    fn drop(&mut self) {
        self.close();
    }
}
