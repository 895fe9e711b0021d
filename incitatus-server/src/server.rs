//! Axum liveness server.

use crate::state::AppState;
use axum::extract::State;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the liveness router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn alive() -> &'static str {
    "Incitatus está vivo."
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `healthy` once the gateway session is up, `starting` before.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: if state.is_ready() { "healthy" } else { "starting" },
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server until the shutdown signal flips.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Liveness server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
