use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};

pub const READY_MESSAGE: &str = "Sebastian Bot Running - Healthy";
pub const STARTING_MESSAGE: &str = "Sebastian Bot Starting...";

/// Flipped by the gateway once the platform session is established.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub fn router(readiness: Readiness) -> Router {
    Router::new().route("/", get(health)).with_state(readiness)
}

async fn health(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, READY_MESSAGE)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, STARTING_MESSAGE)
    }
}

pub async fn serve(port: u16, readiness: Readiness) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(port, "HTTP server running");
    axum::serve(listener, router(readiness)).await
}
