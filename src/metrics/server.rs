//! HTTP exporter for the capture loop's metrics.
//!
//! Runs on its own tokio runtime in a background thread; the capture loop
//! itself stays synchronous and only touches the shared registry.

use crate::metrics::MetricsRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tower_http::cors::CorsLayer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind metrics exporter: {0}")]
    Bind(#[from] std::io::Error),

    #[error("metrics exporter failed: {0}")]
    Serve(String),
}

/// Serves `/metrics`, `/status` and `/health`.
pub struct MetricsServer {
    addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    /// Exporter on all interfaces at `port`.
    pub fn new(port: u16, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            addr: ([0, 0, 0, 0], port).into(),
            registry,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn router(registry: Arc<MetricsRegistry>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .route("/health", get(|| async { (StatusCode::OK, "OK") }))
            .layer(CorsLayer::permissive())
            .with_state(registry)
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "Metrics exporter listening");

        axum::serve(listener, Self::router(self.registry))
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }

    /// Starts the exporter on a single-worker runtime in a new thread.
    /// Failures are logged; the capture loop never depends on the exporter.
    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build();
            match runtime {
                Ok(rt) => {
                    if let Err(e) = rt.block_on(self.run()) {
                        tracing::warn!("Metrics exporter stopped: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Failed to start metrics runtime: {}", e),
            }
        })
    }
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(body) => (StatusCode::OK, [("content-type", PROMETHEUS_CONTENT_TYPE)], body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string(),
        ),
    }
}

async fn status_handler(State(registry): State<Arc<MetricsRegistry>>) -> String {
    registry.status()
}
