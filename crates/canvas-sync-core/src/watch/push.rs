//! Push subscriptions: a host event channel or a WebSocket event stream.

use super::{ObservationSource, RemoteWatch, SyncObservation, WatchError, WatchMode};
use crate::wire::{CanvasData, ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

/// A live subscription. Dropping it releases the subscription.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release now rather than on drop.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

/// A host that can deliver named event streams, such as an embedding shell.
pub trait EventHost {
    /// Subscribe to `stream`. `None` means the host has no event channel.
    fn subscribe(&self, stream: &str) -> Option<(Receiver<CanvasData>, Subscription)>;
}

type Subscribers = HashMap<String, HashMap<u64, Sender<CanvasData>>>;

/// In-process [`EventHost`]: whatever is emitted on a stream reaches every
/// subscriber of that stream.
#[derive(Clone, Default)]
pub struct LocalEventHost {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl LocalEventHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `canvas` to every subscriber of `stream`. Returns how many
    /// subscribers received it.
    pub fn emit(&self, stream: &str, canvas: CanvasData) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };
        let Some(stream_subs) = subscribers.get_mut(stream) else {
            return 0;
        };
        stream_subs.retain(|_, tx| tx.send(canvas.clone()).is_ok());
        stream_subs.len()
    }

    pub fn subscriber_count(&self, stream: &str) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.get(stream).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

impl EventHost for LocalEventHost {
    fn subscribe(&self, stream: &str) -> Option<(Receiver<CanvasData>, Subscription)> {
        let (tx, rx) = channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .ok()?
            .entry(stream.to_string())
            .or_default()
            .insert(id, tx);

        let subscribers = Arc::clone(&self.subscribers);
        let stream = stream.to_string();
        let subscription = Subscription::new(move || {
            if let Ok(mut subs) = subscribers.lock() {
                if let Some(stream_subs) = subs.get_mut(&stream) {
                    stream_subs.remove(&id);
                }
            }
        });
        Some((rx, subscription))
    }
}

/// Forwards every pushed canvas as a `remote-push` observation.
pub struct PushWatch {
    events: Option<Receiver<CanvasData>>,
    subscription: Option<Subscription>,
    _thread: Option<JoinHandle<()>>,
}

impl PushWatch {
    /// Watch a stream delivered by the host, if the host offers one.
    pub fn from_host(host: &dyn EventHost, stream: &str) -> Option<Self> {
        let (events, subscription) = host.subscribe(stream)?;
        Some(Self {
            events: Some(events),
            subscription: Some(subscription),
            _thread: None,
        })
    }

    /// Connect to a WebSocket event stream and subscribe to `stream`.
    ///
    /// Connecting is the probe: an error here means push is unavailable.
    pub fn connect(url: &str, stream: &str) -> Result<Self, WatchError> {
        let parsed = Url::parse(url).map_err(|e| WatchError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(WatchError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let (mut socket, response) =
            tungstenite::connect(url).map_err(|e| WatchError::Connect(e.to_string()))?;
        log::info!("Event stream connected, status: {}", response.status());

        let subscribe = serde_json::to_string(&ClientMessage::Subscribe {
            stream: stream.to_string(),
        })
        .map_err(|e| WatchError::Protocol(e.to_string()))?;
        socket
            .send(Message::Text(subscribe))
            .map_err(|e| WatchError::Connect(e.to_string()))?;

        // Short read timeout so the worker notices close requests.
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => log::debug!("Non-plain stream, relying on default timeouts"),
        }

        let (event_tx, event_rx) = channel();
        let (close_tx, close_rx) = channel::<()>();
        let stream = stream.to_string();
        let handle = thread::Builder::new()
            .name("canvas-push".to_string())
            .spawn(move || run_socket(socket, &stream, event_tx, close_rx))
            .map_err(|e| WatchError::Spawn(e.to_string()))?;

        Ok(Self {
            events: Some(event_rx),
            subscription: Some(Subscription::new(move || {
                let _ = close_tx.send(());
            })),
            _thread: Some(handle),
        })
    }
}

fn run_socket(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    stream: &str,
    events: Sender<CanvasData>,
    close_rx: Receiver<()>,
) {
    loop {
        match close_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                if let Ok(msg) = serde_json::to_string(&ClientMessage::Unsubscribe) {
                    let _ = socket.send(Message::Text(msg));
                }
                let _ = socket.close(None);
                let _ = socket.flush();
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(ServerMessage::Draw { stream: name, canvas }) if name == stream => {
                    log::debug!("Pushed canvas at {}", canvas.updated_at);
                    if events.send(canvas).is_err() {
                        break;
                    }
                }
                Ok(ServerMessage::Draw { .. }) => {}
                Ok(ServerMessage::Subscribed { stream }) => log::info!("Subscribed to {}", stream),
                Ok(ServerMessage::Error { message }) => {
                    log::warn!("Event stream error: {}", message)
                }
                Err(e) => log::warn!("Failed to parse event: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Event stream closed by server");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::warn!("Event stream read error: {}", e);
                break;
            }
        }
    }
    log::debug!("Event stream worker exiting");
}

impl RemoteWatch for PushWatch {
    fn mode(&self) -> WatchMode {
        WatchMode::Push
    }

    fn poll_observations(&mut self) -> Vec<SyncObservation> {
        let Some(events) = &self.events else {
            return Vec::new();
        };

        let mut observations = Vec::new();
        loop {
            match events.try_recv() {
                Ok(canvas) => observations.push(SyncObservation::new(
                    ObservationSource::RemotePush,
                    canvas.into_document(),
                )),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("Push stream ended");
                    self.close();
                    break;
                }
            }
        }
        observations
    }

    fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.release();
            log::debug!("Push subscription released");
        }
        self.events = None;
        self._thread = None;
    }

    fn is_open(&self) -> bool {
        self.events.is_some()
    }
}

impl Drop for PushWatch {
    fn drop(&mut self) {
        self.close();
    }
}
