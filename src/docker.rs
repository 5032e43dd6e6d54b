//! Docker Engine API access and per-cycle container snapshots.

use std::collections::HashMap;
use std::future::Future;

use bollard::Docker;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, HealthStatusEnum};
use thiserror::Error;
use tracing::{debug, trace};

/// Container label that opts a container in or out of monitoring.
pub const MONITOR_LABEL: &str = "prometheus.health.enabled";

/// Compose labels used to derive the `stack` and `service` metric labels.
const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Swarm equivalents, used when the Compose labels are absent.
const SWARM_STACK_LABEL: &str = "com.docker.stack.namespace";
const SWARM_SERVICE_LABEL: &str = "com.docker.swarm.service.name";

/// Default Docker daemon endpoint.
const DEFAULT_DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to connect to Docker: {0}")]
    Connect(String),
    #[error("Docker API unavailable: {0}")]
    Unavailable(String),
}

/// Health state reported by a container's health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unhealthy,
    Healthy,
    Starting,
    /// The container has no health check configured.
    NoHealthCheck,
}

impl HealthStatus {
    /// Gauge encoding: 0 unhealthy, 1 healthy, 2 starting, 3 no health check.
    pub fn value(&self) -> f64 {
        match self {
            HealthStatus::Unhealthy => 0.0,
            HealthStatus::Healthy => 1.0,
            HealthStatus::Starting => 2.0,
            HealthStatus::NoHealthCheck => 3.0,
        }
    }

    /// Map the runtime-reported status; absent or unknown means no health check.
    pub fn from_docker(status: Option<HealthStatusEnum>) -> Self {
        match status {
            Some(HealthStatusEnum::HEALTHY) => HealthStatus::Healthy,
            Some(HealthStatusEnum::UNHEALTHY) => HealthStatus::Unhealthy,
            Some(HealthStatusEnum::STARTING) => HealthStatus::Starting,
            _ => HealthStatus::NoHealthCheck,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Starting => "starting",
            HealthStatus::NoHealthCheck => "none",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one container, produced fresh each poll cycle.
#[derive(Debug, Clone)]
pub struct ContainerSnapshot {
    /// Short (12 character) container id.
    pub id: String,
    /// Container name without the leading slash.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// All labels set on the container.
    pub labels: HashMap<String, String>,
    /// Health check state.
    pub health: HealthStatus,
    /// Consecutive failed health checks reported by the runtime.
    pub failure_streak: u64,
    /// Compose project or Swarm stack, empty when the container has neither.
    pub stack: String,
    /// Compose or Swarm service name, empty when the container has neither.
    pub service: String,
}

impl ContainerSnapshot {
    /// Build a snapshot, deriving the orchestration grouping labels.
    pub fn new(
        id: String,
        name: String,
        image: String,
        labels: HashMap<String, String>,
        health: HealthStatus,
        failure_streak: u64,
    ) -> Self {
        let stack = labels
            .get(COMPOSE_PROJECT_LABEL)
            .or_else(|| labels.get(SWARM_STACK_LABEL))
            .cloned()
            .unwrap_or_default();
        let service = labels
            .get(COMPOSE_SERVICE_LABEL)
            .or_else(|| labels.get(SWARM_SERVICE_LABEL))
            .cloned()
            .unwrap_or_default();

        Self {
            id: short_id(&id).to_string(),
            name: name.trim_start_matches('/').to_string(),
            image,
            labels,
            health,
            failure_streak,
            stack,
            service,
        }
    }
}

/// Truncate a full container id to the familiar 12 character form.
fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Source of container snapshots, queried once per poll cycle.
///
/// Abstracting the runtime behind a trait keeps the poller testable
/// without a live Docker daemon.
pub trait ContainerLister: Send + Sync {
    /// List all containers, running or not, with their health state.
    fn list_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerSnapshot>, RuntimeError>> + Send;
}

/// Container lister backed by the Docker Engine API.
pub struct DockerLister {
    docker: Docker,
}

impl DockerLister {
    /// Connect to the Docker daemon.
    ///
    /// `host` accepts a `unix://` socket path or a `tcp://`/`http://` endpoint;
    /// when absent the default socket is used. The client connects lazily, so
    /// this only fails on a malformed endpoint. An unreachable daemon surfaces
    /// per cycle as [`RuntimeError::Unavailable`].
    pub fn connect(host: Option<&str>, timeout_secs: u64) -> Result<Self, RuntimeError> {
        let docker = match host {
            Some(addr) if addr.starts_with("tcp://") || addr.starts_with("http://") => {
                Docker::connect_with_http(addr, timeout_secs, bollard::API_DEFAULT_VERSION)
            }
            Some(path) => {
                Docker::connect_with_socket(path, timeout_secs, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_socket(
                DEFAULT_DOCKER_SOCKET,
                timeout_secs,
                bollard::API_DEFAULT_VERSION,
            ),
        }
        .map_err(|e| RuntimeError::Connect(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Inspect one listed container for its health state.
    ///
    /// Returns `Ok(None)` when the container disappeared between list and
    /// inspect; any other API error aborts the whole cycle so a half-built
    /// snapshot set never reaches the registry.
    async fn snapshot(
        &self,
        summary: ContainerSummary,
    ) -> Result<Option<ContainerSnapshot>, RuntimeError> {
        let id = summary.id.unwrap_or_default();
        if id.is_empty() {
            return Ok(None);
        }

        let inspect = match self.docker.inspect_container(&id, None).await {
            Ok(response) => response,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(id = %id, "Container removed during poll, skipping");
                return Ok(None);
            }
            Err(e) => {
                return Err(RuntimeError::Unavailable(format!(
                    "Failed to inspect container {}: {}",
                    id, e
                )));
            }
        };

        let health = inspect.state.as_ref().and_then(|state| state.health.as_ref());
        let status = HealthStatus::from_docker(health.and_then(|h| h.status));
        let failure_streak = health
            .and_then(|h| h.failing_streak)
            .map(|streak| streak.max(0) as u64)
            .unwrap_or(0);

        trace!(id = %short_id(&id), status = %status, "Inspected container health");

        let name = summary
            .names
            .and_then(|names| names.into_iter().next())
            .unwrap_or_default();
        let image = summary.image.unwrap_or_default();
        let labels = summary.labels.unwrap_or_default();

        Ok(Some(ContainerSnapshot::new(
            id,
            name,
            image,
            labels,
            status,
            failure_streak,
        )))
    }
}

impl ContainerLister for DockerLister {
    async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        });

        let summaries = self
            .docker
            .list_containers(options)
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("Failed to list containers: {}", e)))?;

        let mut snapshots = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if let Some(snapshot) = self.snapshot(summary).await? {
                snapshots.push(snapshot);
            }
        }

        Ok(snapshots)
    }
}
