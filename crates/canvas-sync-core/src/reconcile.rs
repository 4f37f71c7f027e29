//! Reconciliation between the live surface, the local cache and the remote.
//!
//! All state changes happen on the caller's thread, inside the methods of
//! [`Reconciler`]. Remote producers only hand observations over channels.
//! Deadlines are explicit [`Instant`]s passed in by the caller, so a host
//! drives the engine by calling [`Reconciler::tick`] from its event loop.

use crate::config::{SyncConfig, SyncDirection};
use crate::debounce::{ChangeDebouncer, ContentDigest, DebounceOutcome};
use crate::document::{CanvasDocument, Timestamp};
use crate::echo::EchoSuppressor;
use crate::error::SyncError;
use crate::remote::{HttpRemote, RemoteCanvas};
use crate::storage::{LocalCacheManager, StorageError};
use crate::surface::{LiveSurface, SurfaceChange};
use crate::watch::{
    EventHost, ObservationSource, RemoteWatch, SyncObservation, WatchMode, open_watch,
};
use std::sync::Arc;
use std::time::Instant;

/// Where the engine stands relative to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Startup has not run yet.
    Uninitialized,
    /// The last remote read or observation succeeded.
    Synced,
    /// The remote could not be read at startup; running from the cache.
    Degraded,
}

/// Result of handling one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    /// A remote document replaced the local state.
    Applied,
    /// A remote document was not newer than the cache and was dropped.
    Stale,
    /// A cached document was put on the surface.
    Restored,
    /// A newer remote version carried content already persisted, such as our
    /// own write coming back. Only the version was recorded.
    Acknowledged,
    /// A live observation went through the change pipeline.
    Local(ChangeOutcome),
}

/// Result of handling one surface change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The change was an echo of our own apply.
    Suppressed,
    /// Content already persisted; nothing scheduled.
    Unchanged,
    /// A write is scheduled at the given instant.
    Scheduled(Instant),
}

/// Who asked for a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOrigin {
    /// The local user.
    Local,
    /// The remote service; never sent back to it.
    Remote,
}

/// What one [`Reconciler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub applied: usize,
    pub stale: usize,
    pub suppressed: usize,
    pub scheduled: usize,
    /// Whether a debounced write was persisted.
    pub written: bool,
}

/// Keeps the live surface, the local cache and the remote converging.
pub struct Reconciler<S: LiveSurface> {
    surface: S,
    cache: LocalCacheManager,
    remote: Arc<dyn RemoteCanvas>,
    watch: Option<Box<dyn RemoteWatch>>,
    echo: EchoSuppressor,
    debouncer: ChangeDebouncer,
    direction: SyncDirection,
    state: SyncState,
    config: SyncConfig,
}

impl<S: LiveSurface> Reconciler<S> {
    pub fn new(
        config: &SyncConfig,
        surface: S,
        cache: LocalCacheManager,
        remote: Arc<dyn RemoteCanvas>,
    ) -> Self {
        Self {
            surface,
            cache,
            remote,
            watch: None,
            echo: EchoSuppressor::new(config.echo_window()),
            debouncer: ChangeDebouncer::new(config.debounce_delay()),
            direction: config.direction,
            state: SyncState::Uninitialized,
            config: config.clone(),
        }
    }

    /// Wire up the HTTP remote, the configured cache and a watch channel.
    pub fn from_config(config: &SyncConfig, surface: S, host: Option<&dyn EventHost>) -> Self {
        let remote: Arc<dyn RemoteCanvas> = Arc::new(HttpRemote::new(&config.base_url));
        let cache = LocalCacheManager::new(config.create_storage());
        let mut reconciler = Self::new(config, surface, cache, Arc::clone(&remote));
        match open_watch(config, remote, host) {
            Ok(watch) => reconciler.attach_watch(watch),
            Err(e) => log::warn!("{}", SyncError::from(e)),
        }
        reconciler
    }

    /// Replace the watch channel. The previous one is closed.
    pub fn attach_watch(&mut self, watch: Box<dyn RemoteWatch>) {
        if let Some(mut old) = self.watch.replace(watch) {
            old.close();
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn cache_mut(&mut self) -> &mut LocalCacheManager {
        &mut self.cache
    }

    pub fn watch_mode(&self) -> Option<WatchMode> {
        self.watch.as_ref().map(|w| w.mode())
    }

    pub fn has_pending_write(&self) -> bool {
        self.debouncer.has_pending()
    }

    /// Initial sync: adopt the remote canvas, or fall back to the cache.
    pub async fn startup(&mut self, now: Instant) -> SyncState {
        // An unavailable store is logged by the manager, which then runs in memory.
        let _ = self.cache.init().await;

        match self.remote.fetch() {
            Ok(document) => {
                log::info!(
                    "Loaded remote canvas: {} elements at {}",
                    document.len(),
                    document.version
                );
                self.adopt(document, now).await;
                self.state = SyncState::Synced;
            }
            Err(e) => {
                log::warn!("{}", SyncError::from(e));
                if let Some(document) = self.load_local().await {
                    log::info!("Restored cached canvas: {} elements", document.len());
                    let obs = SyncObservation::new(ObservationSource::StartupRestore, document);
                    self.handle_observation(obs, now).await;
                }
                self.state = SyncState::Degraded;
            }
        }
        self.state
    }

    /// Load the cached document, repairing it first if it is corrupt.
    async fn load_local(&mut self) -> Option<CanvasDocument> {
        match self.cache.load().await {
            Ok(record) => record.map(|r| r.into_document()),
            Err(StorageError::Corrupt(reason)) => {
                log::warn!("{}", SyncError::StorageCorrupt(reason));
                if !self.cache.repair().await {
                    return None;
                }
                match self.cache.load().await {
                    Ok(record) => record.map(|r| r.into_document()),
                    Err(e) => {
                        log::warn!("{}", SyncError::from(e));
                        None
                    }
                }
            }
            Err(e) => {
                log::warn!("{}", SyncError::from(e));
                None
            }
        }
    }

    /// Handle one observation from any source.
    pub async fn handle_observation(
        &mut self,
        obs: SyncObservation,
        now: Instant,
    ) -> ObservationOutcome {
        match obs.source {
            ObservationSource::Live => {
                let change = SurfaceChange::from_document(&obs.document);
                ObservationOutcome::Local(self.handle_surface_change(change, now))
            }
            ObservationSource::StartupRestore => {
                self.echo.apply(&mut self.surface, &obs.document, now);
                self.debouncer.mark_persisted(ContentDigest::of_document(&obs.document));
                ObservationOutcome::Restored
            }
            ObservationSource::RemotePush | ObservationSource::RemotePoll => {
                if !self.cache.should_update(obs.timestamp).await {
                    log::debug!("Ignoring stale remote canvas at {}", obs.timestamp);
                    return ObservationOutcome::Stale;
                }
                let digest = ContentDigest::of_document(&obs.document);
                if self.debouncer.last_persisted() == Some(&digest) {
                    log::debug!("Remote canvas at {} matches persisted content", obs.timestamp);
                    if !obs.document.is_empty() {
                        if let Err(e) = self.cache.save_at(&obs.document, obs.timestamp).await {
                            log::warn!("{}", SyncError::from(e));
                        }
                    }
                    self.state = SyncState::Synced;
                    return ObservationOutcome::Acknowledged;
                }
                log::info!(
                    "Adopting remote canvas: {} elements at {}",
                    obs.document.len(),
                    obs.timestamp
                );
                self.adopt(obs.document, now).await;
                self.state = SyncState::Synced;
                ObservationOutcome::Applied
            }
        }
    }

    /// Put a remote document on the surface and in the cache.
    async fn adopt(&mut self, document: CanvasDocument, now: Instant) {
        if self.debouncer.cancel() {
            log::debug!("Remote canvas replaced a pending local write");
        }
        self.echo.apply(&mut self.surface, &document, now);
        self.persist(&document).await;
    }

    /// Write `document` to the cache at its own version. An empty document
    /// deletes the record.
    async fn persist(&mut self, document: &CanvasDocument) -> bool {
        let result = if document.is_empty() {
            self.cache.clear().await
        } else {
            self.cache.save_at(document, document.version).await
        };
        match result {
            Ok(()) => {
                self.debouncer.mark_persisted(ContentDigest::of_document(document));
                true
            }
            Err(e) => {
                log::warn!("{}", SyncError::from(e));
                false
            }
        }
    }

    /// Handle a change notification from the live surface.
    pub fn handle_surface_change(&mut self, change: SurfaceChange, now: Instant) -> ChangeOutcome {
        if self.echo.is_suppressed(now) {
            log::trace!("Suppressed echo of programmatic apply");
            return ChangeOutcome::Suppressed;
        }
        match self.debouncer.on_change(change, now) {
            DebounceOutcome::Unchanged => ChangeOutcome::Unchanged,
            DebounceOutcome::Scheduled(due) => ChangeOutcome::Scheduled(due),
        }
    }

    /// Persist the pending local write if its delay has elapsed.
    pub async fn flush_due(&mut self, now: Instant) -> bool {
        let Some(write) = self.debouncer.take_due(now) else {
            return false;
        };
        let document = write.change.into_document(Timestamp::now());
        if !self.persist(&document).await {
            return false;
        }
        log::debug!("Persisted local edit {}", write.digest);

        if self.direction == SyncDirection::Bidirectional {
            if let Err(e) = self.remote.replace(&document) {
                log::warn!("{}", SyncError::from(e));
            }
        }
        true
    }

    /// Replace a watch whose stream ended. A host stream cannot be
    /// re-acquired here, so this reconnects the push endpoint or polls.
    fn reopen_watch(&mut self) {
        log::warn!("Remote watch closed, reopening");
        match open_watch(&self.config, Arc::clone(&self.remote), None) {
            Ok(watch) => self.attach_watch(watch),
            Err(e) => {
                log::warn!("{}", SyncError::from(e));
                self.watch = None;
            }
        }
    }

    /// Drain the watch and the surface, then flush a due write.
    pub async fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        let observations = match self.watch.as_mut() {
            Some(watch) => watch.poll_observations(),
            None => Vec::new(),
        };
        if self.watch.as_ref().is_some_and(|watch| !watch.is_open()) {
            self.reopen_watch();
        }
        for obs in observations {
            match self.handle_observation(obs, now).await {
                ObservationOutcome::Applied => report.applied += 1,
                ObservationOutcome::Stale => report.stale += 1,
                _ => {}
            }
        }

        for change in self.surface.poll_changes() {
            match self.handle_surface_change(change, now) {
                ChangeOutcome::Suppressed => report.suppressed += 1,
                ChangeOutcome::Scheduled(_) => report.scheduled += 1,
                ChangeOutcome::Unchanged => {}
            }
        }

        report.written = self.flush_due(now).await;
        report
    }

    /// Empty the canvas everywhere this engine owns it.
    ///
    /// Local clears are forwarded to the remote only in bidirectional mode;
    /// remote clears never are.
    pub async fn clear(&mut self, origin: ClearOrigin, now: Instant) {
        self.debouncer.cancel();
        let empty = CanvasDocument::empty_at(Timestamp::now());
        self.echo.apply(&mut self.surface, &empty, now);
        self.persist(&empty).await;
        log::info!("Canvas cleared ({:?})", origin);

        if origin == ClearOrigin::Local && self.direction == SyncDirection::Bidirectional {
            if let Err(e) = self.remote.clear() {
                log::warn!("{}", SyncError::from(e));
            }
        }
    }

    /// Cancel the pending write and release the watch channel.
    pub fn shutdown(&mut self) {
        if self.debouncer.cancel() {
            log::debug!("Dropped pending local write on shutdown");
        }
        self.echo.reset();
        if let Some(mut watch) = self.watch.take() {
            watch.close();
        }
    }
}

impl<S: LiveSurface> Drop for Reconciler<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_on;
    use crate::remote::RemoteError;
    use crate::remote::testing::{ScriptedRemote, doc_at};
    use crate::storage::{CACHE_RECORD_KEY, MemoryStorage, Storage};
    use crate::surface::MemorySurface;
    use crate::watch::{LocalEventHost, PushWatch, Subscription};
    use crate::wire::CanvasData;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        storage: Arc<MemoryStorage>,
        remote: Arc<ScriptedRemote>,
        reconciler: Reconciler<MemorySurface>,
    }

    fn harness(config: SyncConfig, script: Vec<Result<CanvasDocument, RemoteError>>) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let remote = Arc::new(ScriptedRemote::new(script));
        let cache = LocalCacheManager::new(storage.clone());
        let reconciler = Reconciler::new(&config, MemorySurface::new(), cache, remote.clone());
        Harness {
            storage,
            remote,
            reconciler,
        }
    }

    fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    fn cached_timestamp(h: &mut Harness) -> Option<i64> {
        block_on(h.reconciler.cache_mut().load())
            .unwrap()
            .map(|r| r.timestamp.as_millis())
    }

    fn remote_obs(doc: CanvasDocument) -> SyncObservation {
        SyncObservation::new(ObservationSource::RemotePoll, doc)
    }

    fn add_rect(id: &str) -> impl FnOnce(&mut CanvasDocument) {
        let element = crate::normalize::normalize_element(json!({
            "id": id, "type": "rectangle", "seed": 1, "versionNonce": 1, "updated": 1
        }));
        move |doc| doc.elements.push(element)
    }

    #[test]
    fn test_end_to_end_adopt_repeat_and_clear() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 1))]);

        // Empty cache, remote rectangle at 100.
        assert_eq!(block_on(h.reconciler.startup(t0)), SyncState::Synced);
        assert_eq!(h.reconciler.surface().scene().len(), 1);
        assert_eq!(cached_timestamp(&mut h), Some(100));

        // Poll repeats 100: no apply, no write.
        let outcome =
            block_on(h.reconciler.handle_observation(remote_obs(doc_at(100, 1)), ms(t0, 1000)));
        assert_eq!(outcome, ObservationOutcome::Stale);
        assert_eq!(h.reconciler.surface().apply_count(), 1);
        assert_eq!(cached_timestamp(&mut h), Some(100));

        // Poll at 150 with zero elements: surface empty, cache cleared.
        let outcome =
            block_on(h.reconciler.handle_observation(remote_obs(doc_at(150, 0)), ms(t0, 2000)));
        assert_eq!(outcome, ObservationOutcome::Applied);
        assert!(h.reconciler.surface().scene().is_empty());
        assert_eq!(cached_timestamp(&mut h), None);
    }

    #[test]
    fn test_echo_of_apply_is_not_persisted() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 2))]);
        block_on(h.reconciler.startup(t0));

        let report = block_on(h.reconciler.tick(ms(t0, 10)));
        assert_eq!(report.suppressed, 1);
        assert_eq!(report.scheduled, 0);
        assert!(!h.reconciler.has_pending_write());

        let report = block_on(h.reconciler.tick(ms(t0, 1000)));
        assert!(!report.written);
        assert_eq!(cached_timestamp(&mut h), Some(100));
    }

    #[test]
    fn test_late_echo_matches_persisted_content() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 1))]);
        block_on(h.reconciler.startup(t0));

        // Notification arrives after the window, but the content is already cached.
        let report = block_on(h.reconciler.tick(ms(t0, 500)));
        assert_eq!(report.suppressed, 0);
        assert_eq!(report.scheduled, 0);
        assert!(!h.reconciler.has_pending_write());
    }

    #[test]
    fn test_burst_of_edits_writes_once() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 0))]);
        block_on(h.reconciler.startup(t0));
        block_on(h.reconciler.tick(ms(t0, 1)));

        let mut writes = 0;
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            h.reconciler.surface_mut().edit(add_rect(id));
            let report = block_on(h.reconciler.tick(ms(t0, 500 + i as u64 * 100)));
            writes += usize::from(report.written);
        }
        assert_eq!(writes, 0);

        let report = block_on(h.reconciler.tick(ms(t0, 1000)));
        assert!(report.written);
        let record = block_on(h.reconciler.cache_mut().load()).unwrap().unwrap();
        let ids: Vec<_> = record.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(h.remote.replaced.lock().unwrap().is_empty());
    }

    #[test]
    fn test_same_document_twice_persists_once() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 0))]);
        block_on(h.reconciler.startup(t0));
        block_on(h.reconciler.tick(ms(t0, 1)));

        h.reconciler.surface_mut().edit(add_rect("a"));
        block_on(h.reconciler.tick(ms(t0, 200)));
        assert!(block_on(h.reconciler.tick(ms(t0, 600))).written);

        let scene = h.reconciler.surface().read();
        let change = SurfaceChange::from_document(&scene);
        let outcome = h.reconciler.handle_surface_change(change, ms(t0, 700));
        assert_eq!(outcome, ChangeOutcome::Unchanged);
        assert!(!block_on(h.reconciler.tick(ms(t0, 2000))).written);
    }

    #[test]
    fn test_tie_keeps_local_and_newer_wins() {
        let t0 = Instant::now();
        let mut h = harness(
            SyncConfig::default(),
            vec![Err(RemoteError::Unreachable("down".into()))],
        );
        block_on(h.storage.save(
            CACHE_RECORD_KEY,
            &json!({
                "id": "canvas",
                "elements": [{"id": "local", "type": "ellipse"}],
                "appState": {},
                "files": {},
                "timestamp": 200
            }),
        ))
        .unwrap();

        assert_eq!(block_on(h.reconciler.startup(t0)), SyncState::Degraded);
        assert!(h.reconciler.surface().scene().element("local").is_some());

        let tie = block_on(h.reconciler.handle_observation(remote_obs(doc_at(200, 3)), ms(t0, 50)));
        assert_eq!(tie, ObservationOutcome::Stale);
        assert_eq!(h.reconciler.state(), SyncState::Degraded);

        let newer =
            block_on(h.reconciler.handle_observation(remote_obs(doc_at(201, 3)), ms(t0, 60)));
        assert_eq!(newer, ObservationOutcome::Applied);
        assert_eq!(h.reconciler.state(), SyncState::Synced);
        assert_eq!(h.reconciler.surface().scene().len(), 3);
    }

    #[test]
    fn test_degraded_startup_without_cache_leaves_surface_empty() {
        let mut h = harness(SyncConfig::default(), vec![]);
        assert_eq!(block_on(h.reconciler.startup(Instant::now())), SyncState::Degraded);
        assert_eq!(h.reconciler.surface().apply_count(), 0);
    }

    #[test]
    fn test_corrupt_cache_repaired_at_startup() {
        let mut h = harness(SyncConfig::default(), vec![]);
        block_on(h.storage.save(
            CACHE_RECORD_KEY,
            &json!({
                "elements": [{"id": "kept", "type": "text", "text": "hi"}],
                "appState": "broken",
                "timestamp": 5
            }),
        ))
        .unwrap();

        assert_eq!(block_on(h.reconciler.startup(Instant::now())), SyncState::Degraded);
        let scene = h.reconciler.surface().scene();
        assert_eq!(scene.element("kept").and_then(|e| e.text()), Some("hi"));
        assert_eq!(cached_timestamp(&mut h), Some(5));
    }

    #[test]
    fn test_remote_adopt_cancels_pending_write() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 0))]);
        block_on(h.reconciler.startup(t0));
        block_on(h.reconciler.tick(ms(t0, 1)));

        h.reconciler.surface_mut().edit(add_rect("draft"));
        assert_eq!(block_on(h.reconciler.tick(ms(t0, 200))).scheduled, 1);

        block_on(h.reconciler.handle_observation(remote_obs(doc_at(300, 2)), ms(t0, 250)));
        assert!(!h.reconciler.has_pending_write());
        assert!(!block_on(h.reconciler.tick(ms(t0, 2000))).written);
        assert_eq!(cached_timestamp(&mut h), Some(300));
    }

    #[test]
    fn test_bidirectional_pushes_writes_and_local_clears() {
        let t0 = Instant::now();
        let config = SyncConfig {
            direction: SyncDirection::Bidirectional,
            ..SyncConfig::default()
        };
        let mut h = harness(config, vec![Ok(doc_at(100, 0))]);
        block_on(h.reconciler.startup(t0));
        block_on(h.reconciler.tick(ms(t0, 1)));

        h.reconciler.surface_mut().edit(add_rect("mine"));
        block_on(h.reconciler.tick(ms(t0, 200)));
        assert!(block_on(h.reconciler.tick(ms(t0, 600))).written);
        assert_eq!(h.remote.replaced.lock().unwrap().len(), 1);

        block_on(h.reconciler.clear(ClearOrigin::Remote, ms(t0, 700)));
        assert_eq!(*h.remote.clears.lock().unwrap(), 0);

        block_on(h.reconciler.clear(ClearOrigin::Local, ms(t0, 800)));
        assert_eq!(*h.remote.clears.lock().unwrap(), 1);
        assert!(h.reconciler.surface().scene().is_empty());
        assert_eq!(cached_timestamp(&mut h), None);
    }

    #[test]
    fn test_own_write_coming_back_keeps_later_edits() {
        let t0 = Instant::now();
        let config = SyncConfig {
            direction: SyncDirection::Bidirectional,
            ..SyncConfig::default()
        };
        let mut h = harness(config, vec![Ok(doc_at(100, 0))]);
        block_on(h.reconciler.startup(t0));
        block_on(h.reconciler.tick(ms(t0, 1)));

        h.reconciler.surface_mut().edit(add_rect("a"));
        block_on(h.reconciler.tick(ms(t0, 200)));
        assert!(block_on(h.reconciler.tick(ms(t0, 600))).written);
        let mut sent = h.remote.replaced.lock().unwrap()[0].clone();

        h.reconciler.surface_mut().edit(add_rect("b"));
        assert_eq!(block_on(h.reconciler.tick(ms(t0, 700))).scheduled, 1);

        // The service stamps our write with its own, later version.
        sent.version = Timestamp::from_millis(sent.version.as_millis() + 1);
        let stamp = sent.version.as_millis();
        let outcome = block_on(h.reconciler.handle_observation(remote_obs(sent), ms(t0, 705)));
        assert_eq!(outcome, ObservationOutcome::Acknowledged);
        assert!(h.reconciler.has_pending_write());
        assert!(h.reconciler.surface().scene().element("b").is_some());
        assert_eq!(cached_timestamp(&mut h), Some(stamp));

        assert!(block_on(h.reconciler.tick(ms(t0, 1100))).written);
        let record = block_on(h.reconciler.cache_mut().load()).unwrap().unwrap();
        let ids: Vec<_> = record.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(h.remote.replaced.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_pull_only_never_touches_remote() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 1))]);
        block_on(h.reconciler.startup(t0));
        block_on(h.reconciler.clear(ClearOrigin::Local, ms(t0, 10)));
        assert_eq!(*h.remote.clears.lock().unwrap(), 0);
        assert!(h.remote.replaced.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tick_applies_pushed_documents_and_shutdown_releases() {
        let t0 = Instant::now();
        let host = LocalEventHost::new();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 1))]);
        h.reconciler
            .attach_watch(Box::new(PushWatch::from_host(&host, "excalidraw_draw").unwrap()));
        assert_eq!(h.reconciler.watch_mode(), Some(WatchMode::Push));
        block_on(h.reconciler.startup(t0));

        host.emit(
            "excalidraw_draw",
            CanvasData {
                elements: Some(json!([
                    {"id": "p1", "type": "diamond"},
                    {"id": "p2", "type": "text"}
                ])),
                updated_at: Timestamp::from_millis(120),
                ..CanvasData::default()
            },
        );
        let report = block_on(h.reconciler.tick(ms(t0, 500)));
        assert_eq!(report.applied, 1);
        // Both the startup apply and the pushed apply echo back.
        assert_eq!(report.suppressed, 2);
        assert_eq!(h.reconciler.surface().scene().len(), 2);
        assert_eq!(cached_timestamp(&mut h), Some(120));

        drop(h);
        assert_eq!(host.subscriber_count("excalidraw_draw"), 0);
    }

    /// Host whose stream the test can end by dropping the sender.
    struct EndingHost {
        sender: std::sync::Mutex<Option<std::sync::mpsc::Sender<CanvasData>>>,
    }

    impl EventHost for EndingHost {
        fn subscribe(
            &self,
            _stream: &str,
        ) -> Option<(std::sync::mpsc::Receiver<CanvasData>, Subscription)> {
            let (tx, rx) = std::sync::mpsc::channel();
            *self.sender.lock().unwrap() = Some(tx);
            Some((rx, Subscription::new(|| {})))
        }
    }

    #[test]
    fn test_ended_push_stream_falls_back_to_polling() {
        let t0 = Instant::now();
        let host = EndingHost {
            sender: std::sync::Mutex::new(None),
        };
        let config = SyncConfig {
            poll_interval_ms: 5,
            ..SyncConfig::default()
        };
        let mut h = harness(config, vec![Ok(doc_at(100, 1))]);
        h.reconciler
            .attach_watch(Box::new(PushWatch::from_host(&host, "excalidraw_draw").unwrap()));
        block_on(h.reconciler.startup(t0));

        let last = CanvasData {
            updated_at: Timestamp::from_millis(150),
            elements: Some(json!([{"id": "last", "type": "ellipse"}])),
            ..CanvasData::default()
        };
        // Sending on the only sender, then dropping it, ends the stream.
        let sender = host.sender.lock().unwrap().take().unwrap();
        sender.send(last).unwrap();
        drop(sender);
        let report = block_on(h.reconciler.tick(ms(t0, 500)));
        assert_eq!(report.applied, 1);
        assert_eq!(h.reconciler.watch_mode(), Some(WatchMode::Poll));

        h.remote.push(Ok(doc_at(200, 3)));
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut applied = 0;
        while applied == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
            applied = block_on(h.reconciler.tick(ms(t0, 1000))).applied;
        }
        assert_eq!(applied, 1);
        assert_eq!(h.reconciler.surface().scene().len(), 3);
    }

    #[test]
    fn test_live_observation_routes_through_debouncer() {
        let t0 = Instant::now();
        let mut h = harness(SyncConfig::default(), vec![Ok(doc_at(100, 0))]);
        block_on(h.reconciler.startup(t0));

        let outcome = block_on(h.reconciler.handle_observation(
            SyncObservation::new(ObservationSource::Live, doc_at(0, 1)),
            ms(t0, 50),
        ));
        assert_eq!(outcome, ObservationOutcome::Local(ChangeOutcome::Suppressed));

        let outcome = block_on(h.reconciler.handle_observation(
            SyncObservation::new(ObservationSource::Live, doc_at(0, 1)),
            ms(t0, 500),
        ));
        assert!(matches!(outcome, ObservationOutcome::Local(ChangeOutcome::Scheduled(_))));
    }

    #[test]
    fn test_unavailable_cache_still_syncs() {
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(doc_at(100, 1))]));
        let cache = LocalCacheManager::new(Arc::new(MemoryStorage::disabled()));
        let mut reconciler =
            Reconciler::new(&SyncConfig::default(), MemorySurface::new(), cache, remote);

        assert_eq!(block_on(reconciler.startup(Instant::now())), SyncState::Synced);
        assert!(reconciler.cache_mut().is_memory_only());
        assert_eq!(reconciler.surface().scene().len(), 1);
    }
}
