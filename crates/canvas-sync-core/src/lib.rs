//! Canvas Sync Core Library
//!
//! Keeps a live drawing surface, a durable local cache and a remote canvas
//! service converging on one document. The host owns the event loop and
//! calls [`Reconciler::tick`]; everything else is driven from there.

pub mod config;
pub mod debounce;
pub mod document;
pub mod echo;
pub mod element;
pub mod error;
pub mod normalize;
pub mod reconcile;
pub mod remote;
pub mod storage;
pub mod surface;
pub mod watch;
pub mod wire;

pub use config::{SyncConfig, SyncDirection};
pub use debounce::{ChangeDebouncer, ContentDigest, DebounceOutcome};
pub use document::{AppState, CanvasDocument, Collaborators, Files, Timestamp};
pub use echo::EchoSuppressor;
pub use element::{Element, ElementKind};
pub use error::SyncError;
pub use reconcile::{
    ChangeOutcome, ClearOrigin, ObservationOutcome, Reconciler, SyncState, TickReport,
};
pub use remote::{HttpRemote, RemoteCanvas, RemoteError, RemoteResult};
pub use storage::{
    CacheRecord, FileStorage, LocalCacheManager, MemoryStorage, Storage, StorageError,
    StorageResult,
};
pub use surface::{LiveSurface, MemorySurface, SurfaceChange};
pub use watch::{
    EventHost, LocalEventHost, ObservationSource, PollWatch, PushWatch, RemoteWatch,
    SyncObservation, WatchError, WatchMode, open_watch,
};
pub use wire::{CanvasData, DRAW_STREAM};

/// Minimal executor for the storage futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, Waker};

    let mut cx = Context::from_waker(Waker::noop());
    let mut f = std::pin::pin!(f);
    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
