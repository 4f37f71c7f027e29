//! Remote watch channel.
//!
//! Produces "remote document observed" notifications, either from a push
//! subscription or from a fixed-period poll. The reconciler only sees the
//! [`RemoteWatch`] trait; the mode is chosen once by [`open_watch`].

mod poll;
mod push;

pub use poll::{DEFAULT_POLL_INTERVAL, PollCursor, PollWatch};
pub use push::{EventHost, LocalEventHost, PushWatch, Subscription};

use crate::config::SyncConfig;
use crate::document::{CanvasDocument, Timestamp};
use crate::remote::RemoteCanvas;
use std::sync::Arc;
use thiserror::Error;

/// Watch channel errors.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Invalid event stream URL: {0}")]
    InvalidUrl(String),
    #[error("Event stream connection failed: {0}")]
    Connect(String),
    #[error("Event stream protocol error: {0}")]
    Protocol(String),
    #[error("Failed to start watch worker: {0}")]
    Spawn(String),
}

/// Where an observed document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    Live,
    RemotePush,
    RemotePoll,
    StartupRestore,
}

/// A document seen somewhere, as consumed by the reconciler.
#[derive(Debug, Clone)]
pub struct SyncObservation {
    pub source: ObservationSource,
    pub document: CanvasDocument,
    pub timestamp: Timestamp,
}

impl SyncObservation {
    /// Observation stamped with the document's own version.
    pub fn new(source: ObservationSource, document: CanvasDocument) -> Self {
        Self {
            source,
            timestamp: document.version,
            document,
        }
    }

    /// Check if the observation came from the remote service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self.source,
            ObservationSource::RemotePush | ObservationSource::RemotePoll
        )
    }
}

/// Which mode a watch runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Push,
    Poll,
}

/// A source of remote observations.
pub trait RemoteWatch {
    fn mode(&self) -> WatchMode;

    /// Drain observations received since the last call (non-blocking).
    fn poll_observations(&mut self) -> Vec<SyncObservation>;

    /// Stop producing and release the underlying subscription or worker.
    /// Idempotent; also done on drop.
    fn close(&mut self);

    /// Check if the watch can still deliver observations.
    fn is_open(&self) -> bool;
}

/// Pick the watch mode once.
///
/// A host event channel wins, then a reachable push endpoint from
/// `config.push_url`; otherwise the remote is polled.
pub fn open_watch(
    config: &SyncConfig,
    remote: Arc<dyn RemoteCanvas>,
    host: Option<&dyn EventHost>,
) -> Result<Box<dyn RemoteWatch>, WatchError> {
    if let Some(watch) = host.and_then(|host| PushWatch::from_host(host, &config.stream)) {
        log::info!("Watching remote canvas via host stream {}", config.stream);
        return Ok(Box::new(watch));
    }

    if let Some(url) = &config.push_url {
        match PushWatch::connect(url, &config.stream) {
            Ok(watch) => {
                log::info!("Watching remote canvas via {}", url);
                return Ok(Box::new(watch));
            }
            Err(e) => log::info!("Push unavailable ({}), falling back to polling", e),
        }
    }

    let interval = config.poll_interval();
    log::info!("Polling remote canvas every {:?}", interval);
    Ok(Box::new(PollWatch::spawn(remote, interval)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::ScriptedRemote;
    use crate::wire::CanvasData;

    #[test]
    fn test_host_channel_preferred() {
        let host = LocalEventHost::new();
        let config = SyncConfig::default();
        let watch =
            open_watch(&config, Arc::new(ScriptedRemote::new(vec![])), Some(&host)).unwrap();
        assert_eq!(watch.mode(), WatchMode::Push);
        assert_eq!(host.subscriber_count(&config.stream), 1);

        drop(watch);
        assert_eq!(host.subscriber_count(&config.stream), 0);
    }

    #[test]
    fn test_falls_back_to_polling() {
        let config = SyncConfig {
            push_url: Some("ws://127.0.0.1:9/ws".to_string()),
            ..SyncConfig::default()
        };
        let mut watch = open_watch(&config, Arc::new(ScriptedRemote::new(vec![])), None).unwrap();
        assert_eq!(watch.mode(), WatchMode::Poll);
        watch.close();
        assert!(!watch.is_open());
    }

    #[test]
    fn test_observation_uses_document_version() {
        let doc = CanvasData {
            updated_at: Timestamp::from_millis(77),
            ..CanvasData::default()
        }
        .into_document();
        let obs = SyncObservation::new(ObservationSource::RemotePoll, doc);
        assert_eq!(obs.timestamp.as_millis(), 77);
        assert!(obs.is_remote());
    }
}
