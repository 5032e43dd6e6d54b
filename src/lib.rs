//! Prometheus exporter for Docker container health checks.
//!
//! Polls the Docker Engine API on a fixed interval and republishes the
//! health state of every monitored container as Prometheus gauges:
//!
//! ```text
//! +---------------+        +----------------+        +-------------+
//! | Docker Engine | -----> | HealthRegistry | <----- | HTTP server |
//! |   (poller)    |  poll  |   (gauges)     | scrape |  /metrics   |
//! +---------------+        +----------------+        +-------------+
//! ```
//!
//! Containers are monitored by default; the `prometheus.health.enabled`
//! label opts individual containers in or out, and `OPT_IN_ONLY=true`
//! flips the default to opt-in.
//!
//! # Usage
//!
//! ```text
//! POLL_INTERVAL=30 OPT_IN_ONLY=true docker-health-exporter
//! ```
//!
//! See [`config::ExporterConfig`] for all environment variables.

pub mod collector;
pub mod config;
pub mod docker;
pub mod http;
pub mod mapping;
pub mod poller;

pub use collector::{HealthRegistry, SharedRegistry};
pub use config::ExporterConfig;
pub use docker::{ContainerLister, ContainerSnapshot, DockerLister, HealthStatus};
pub use http::HttpServer;
pub use poller::{HealthPoller, MonitorPolicy};
