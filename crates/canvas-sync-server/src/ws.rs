//! `/ws` draw event stream.

use crate::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use canvas_sync_core::wire::{CanvasData, ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send. `false` means the peer is gone.
async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode event: {}", e);
            true
        }
    }
}

/// A client's current stream subscription.
struct Subscribed {
    stream: String,
    rx: broadcast::Receiver<CanvasData>,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4().to_string();
    info!("New connection: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current: Option<Subscribed> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { stream }) => {
                                if let Some(old) = current.take() {
                                    state.unsubscribe(&old.stream, old.rx);
                                }
                                let rx = state.subscribe(&stream);
                                current = Some(Subscribed { stream: stream.clone(), rx });
                                info!("Client {} subscribed to {}", client_id, stream);
                                if !send(&mut sender, &ServerMessage::Subscribed { stream }).await {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Unsubscribe) => {
                                if let Some(old) = current.take() {
                                    info!("Client {} unsubscribed from {}", client_id, old.stream);
                                    state.unsubscribe(&old.stream, old.rx);
                                }
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", client_id, e);
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                if !send(&mut sender, &err).await {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }

            event = async {
                match &mut current {
                    Some(sub) => sub.rx.recv().await,
                    None => std::future::pending::<Result<CanvasData, RecvError>>().await,
                }
            } => {
                match event {
                    Ok(canvas) => {
                        let stream = current.as_ref().map(|s| s.stream.clone()).unwrap_or_default();
                        if !send(&mut sender, &ServerMessage::Draw { stream, canvas }).await {
                            break;
                        }
                    }
                    // Only the latest canvas matters; skipped ones are superseded.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Client {} skipped {} draw events", client_id, skipped);
                    }
                    Err(RecvError::Closed) => {
                        current = None;
                    }
                }
            }
        }
    }

    if let Some(sub) = current.take() {
        state.unsubscribe(&sub.stream, sub.rx);
    }
    info!("Connection closed: {}", client_id);
}
