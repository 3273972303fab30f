//! Webhook server for folder-change notifications.
//!
//! The HTTP surface acknowledges every notification immediately; actual
//! processing happens on a single background worker fed by a capacity-1
//! channel, so bursts of webhooks coalesce into one pending wakeup
//! instead of racing each other over the shared cursor.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::workflow::remote::{self, WatchState};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    /// Wakes the notification worker. Capacity 1: a pending wakeup
    /// already covers any notification that arrives meanwhile.
    pub notify: mpsc::Sender<()>,
}

/// Start the web server and the notification worker.
pub async fn serve(port: u16, watch: Arc<WatchState>) -> anyhow::Result<()> {
    let (notify, wakeups) = mpsc::channel(1);
    tokio::spawn(notification_worker(watch, wakeups));

    let app = create_router(AppState { notify });

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    tracing::info!("Starting application on port {}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Drain wakeups one at a time; notifications never overlap.
async fn notification_worker(watch: Arc<WatchState>, mut wakeups: mpsc::Receiver<()>) {
    while wakeups.recv().await.is_some() {
        if let Err(e) = remote::handle_notification(&watch).await {
            error!("Error handling folder notification: {}", e);
        }
    }
}
