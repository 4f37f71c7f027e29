//! Reference canvas service.
//!
//! Holds one canvas in memory and serves it over HTTP. Every mutation stamps
//! the canvas with a strictly increasing `updated_at` and publishes the full
//! canvas on the draw stream, which WebSocket clients subscribe to at `/ws`.
//!
//! ## Event stream protocol
//!
//! ```json
//! { "type": "subscribe", "stream": "excalidraw_draw" }
//! { "type": "unsubscribe" }
//! ```
//!
//! The server answers with `subscribed`, then sends a `draw` message carrying
//! the canvas after each mutation.

mod ws;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use canvas_sync_core::Timestamp;
use canvas_sync_core::wire::{
    CanvasData, CanvasEnvelope, DRAW_STREAM, DrawPayload, StatusResponse, UpdateElementPayload,
};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Port the service listens on unless `CANVAS_PORT` says otherwise.
pub const DEFAULT_PORT: u16 = 31337;

const CHANNEL_CAPACITY: usize = 64;

/// Shared service state.
pub struct AppState {
    canvas: RwLock<CanvasData>,
    /// Draw streams by name. A stream exists while it has subscribers.
    streams: DashMap<String, broadcast::Sender<CanvasData>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            canvas: RwLock::new(CanvasData {
                updated_at: Timestamp::now(),
                ..CanvasData::default()
            }),
            streams: DashMap::new(),
        }
    }

    /// Current canvas.
    pub async fn snapshot(&self) -> CanvasData {
        self.canvas.read().await.clone()
    }

    /// Run `f` on the canvas, then stamp and publish it.
    ///
    /// Nothing is stamped or published when `f` fails.
    pub async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut CanvasData) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut canvas = self.canvas.write().await;
        let out = f(&mut canvas)?;
        canvas.updated_at = next_stamp(canvas.updated_at, Timestamp::now());
        // Published under the lock so subscribers see stamps in order.
        self.publish(DRAW_STREAM, &canvas);
        Ok(out)
    }

    fn publish(&self, stream: &str, canvas: &CanvasData) {
        if let Some(tx) = self.streams.get(stream) {
            let _ = tx.send(canvas.clone());
        }
    }

    /// Join a draw stream, creating it if needed.
    pub fn subscribe(&self, stream: &str) -> broadcast::Receiver<CanvasData> {
        self.streams
            .entry(stream.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Leave a draw stream. The stream goes away with its last subscriber.
    pub fn unsubscribe(&self, stream: &str, rx: broadcast::Receiver<CanvasData>) {
        drop(rx);
        self.streams.remove_if(stream, |_, tx| tx.receiver_count() == 0);
    }

    pub fn subscriber_count(&self, stream: &str) -> usize {
        self.streams.get(stream).map_or(0, |tx| tx.receiver_count())
    }
}

/// Later of `now` and one millisecond past `last`.
fn next_stamp(last: Timestamp, now: Timestamp) -> Timestamp {
    Timestamp::from_millis(now.as_millis().max(last.as_millis() + 1))
}

/// Request failures.
#[derive(Debug)]
pub enum ApiError {
    ElementNotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::ElementNotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("Element with ID '{}' not found", id),
            ),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/draw", post(draw))
        .route("/canvas", get(get_canvas).put(put_canvas))
        .route("/canvas/clear", post(clear_canvas))
        .route("/canvas/element/{id}", put(update_element).delete(remove_element))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn success() -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        message: None,
    })
}

/// Overwrite whichever parts the payload carries.
fn merge(canvas: &mut CanvasData, payload: DrawPayload) {
    if let Some(elements) = payload.elements {
        canvas.elements = Some(elements);
    }
    if let Some(app_state) = payload.app_state {
        canvas.app_state = Some(app_state);
    }
    if let Some(files) = payload.files {
        canvas.files = Some(files);
    }
}

async fn draw(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DrawPayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .mutate(|canvas| {
            merge(canvas, payload);
            Ok(())
        })
        .await?;
    info!("Draw request applied");
    Ok(success())
}

async fn get_canvas(State(state): State<Arc<AppState>>) -> Json<CanvasEnvelope> {
    Json(CanvasEnvelope {
        canvas: state.snapshot().await,
    })
}

async fn put_canvas(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DrawPayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    let count = state
        .mutate(|canvas| {
            merge(canvas, payload);
            Ok(canvas.element_count())
        })
        .await?;
    info!("Canvas replaced: {} elements", count);
    Ok(success())
}

async fn clear_canvas(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .mutate(|canvas| {
            canvas.elements = Some(Value::Array(Vec::new()));
            canvas.app_state = None;
            canvas.files = None;
            Ok(())
        })
        .await?;
    info!("Canvas cleared");
    Ok(success())
}

fn element_position(canvas: &CanvasData, id: &str) -> Option<usize> {
    canvas
        .elements
        .as_ref()?
        .as_array()?
        .iter()
        .position(|e| e.get("id").and_then(Value::as_str) == Some(id))
}

fn elements_mut(canvas: &mut CanvasData) -> Option<&mut Vec<Value>> {
    canvas.elements.as_mut()?.as_array_mut()
}

async fn remove_element(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .mutate(|canvas| {
            let pos = element_position(canvas, &id)
                .ok_or_else(|| ApiError::ElementNotFound(id.clone()))?;
            if let Some(elements) = elements_mut(canvas) {
                elements.remove(pos);
            }
            Ok(())
        })
        .await?;
    info!("Element removed: {}", id);
    Ok(Json(StatusResponse {
        success: true,
        message: Some(format!("Element '{}' removed", id)),
    }))
}

async fn update_element(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateElementPayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .mutate(|canvas| {
            let pos = element_position(canvas, &id)
                .ok_or_else(|| ApiError::ElementNotFound(id.clone()))?;
            if let Some(elements) = elements_mut(canvas) {
                elements[pos] = payload.element;
            }
            Ok(())
        })
        .await?;
    info!("Element updated: {}", id);
    Ok(Json(StatusResponse {
        success: true,
        message: Some(format!("Element '{}' updated", id)),
    }))
}
