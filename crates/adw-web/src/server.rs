//! Hub server
//!
//! Plain-HTTP axum server exposing `/ws` plus a health probe. Runs on
//! the loopback-facing hub port; deployments outside a trusted
//! network need their own auth in front.

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::hub::Hub;
use crate::routes::api_router;
use crate::websocket::ws_handler;

pub struct HubServer {
    addr: SocketAddr,
    hub: Arc<Hub>,
}

impl HubServer {
    pub fn new(addr: SocketAddr, hub: Arc<Hub>) -> Self {
        Self { addr, hub }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api", api_router())
            .route("/ws", get(ws_handler))
            .route("/health", get(health))
            .with_state(self.hub.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until the process exits. The fan-out task is started
    /// alongside the listener.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let fanout = self.hub.start();
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Hub listening on ws://{}/ws", self.addr);

        let result = axum::serve(listener, router).await;
        fanout.abort();
        result
    }
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "adw-hub",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
