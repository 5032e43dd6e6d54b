//! HTTP server exposing the metrics, health, and index endpoints.

use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::SharedRegistry;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Docker Healthcheck Exporter</title></head>
<body>
<h1>Docker Healthcheck Exporter</h1>
<p>Exports the health check status of Docker containers as Prometheus metrics.</p>
<ul>
<li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
<li><a href="/health">/health</a> - exporter liveness</li>
</ul>
<h2>Metrics</h2>
<ul>
<li><code>docker_container_health_status</code> - 0=unhealthy, 1=healthy, 2=starting, 3=no health check</li>
<li><code>docker_container_health_failure_streak</code> - consecutive health check failures</li>
</ul>
<p>Set the container label <code>prometheus.health.enabled</code> to <code>true</code> or
<code>false</code> to override which containers are monitored.</p>
</body>
</html>
"#;

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct AppState {
    registry: SharedRegistry,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Create the router with all endpoints.
fn create_router(registry: SharedRegistry) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the index page.
async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.registry.render();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Handler for the /health endpoint.
///
/// Reports liveness of the exporter process only. Docker reachability is
/// deliberately not checked here: a flapping daemon would otherwise take the
/// exporter out of rotation while it still serves the last good metrics.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
}

/// HTTP server for the exporter endpoints.
pub struct HttpServer {
    registry: SharedRegistry,
    listen_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(registry: SharedRegistry, listen_addr: SocketAddr) -> Self {
        Self {
            registry,
            listen_addr,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.registry);

        info!(addr = %self.listen_addr, "Starting HTTP server");

        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        info!("HTTP server shutting down");
                        break;
                    }
                }
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");

        Ok(())
    }
}
