//! Canvas sync reference service.

use canvas_sync_server::{AppState, DEFAULT_PORT, router};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas_sync_server=info,tower_http=info".into()),
        )
        .init();

    let port = match std::env::var("CANVAS_PORT") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid CANVAS_PORT {:?}", value);
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    };

    let app = router(Arc::new(AppState::new()));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Canvas service listening on {}", addr);
    info!("Draw event stream: ws://{}/ws", addr);

    axum::serve(listener, app).await
}
