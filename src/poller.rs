//! Periodic reconciliation of container health into the registry.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::collector::{HealthSample, SeriesKey, SharedRegistry};
use crate::config::ExporterConfig;
use crate::docker::{ContainerLister, ContainerSnapshot, MONITOR_LABEL, RuntimeError};
use crate::mapping::build_label_set;

/// Decides whether a container is monitored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorPolicy {
    /// When set, containers without an explicit opt-in label are excluded.
    pub opt_in_only: bool,
}

impl MonitorPolicy {
    /// Apply the inclusion rules to a container.
    ///
    /// The `prometheus.health.enabled` label always wins: `false` excludes
    /// and `true` includes regardless of the global policy. Containers
    /// without the label (or with any other value) follow `opt_in_only`.
    pub fn should_monitor(&self, snapshot: &ContainerSnapshot) -> bool {
        match snapshot.labels.get(MONITOR_LABEL) {
            Some(value) if value.eq_ignore_ascii_case("false") => false,
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            _ => !self.opt_in_only,
        }
    }
}

/// Outcome of one completed poll cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    /// Containers returned by the runtime.
    pub listed: usize,
    /// Containers that passed the inclusion policy.
    pub monitored: usize,
}

/// Poll task that feeds the registry from a container lister.
pub struct HealthPoller<L> {
    lister: L,
    registry: SharedRegistry,
    policy: MonitorPolicy,
    label_mappings: Vec<(String, String)>,
    include_default_labels: bool,
    interval: Duration,
}

impl<L: ContainerLister> HealthPoller<L> {
    /// Create a poller from the exporter configuration.
    pub fn new(lister: L, registry: SharedRegistry, config: &ExporterConfig) -> Self {
        Self {
            lister,
            registry,
            policy: MonitorPolicy {
                opt_in_only: config.opt_in_only,
            },
            label_mappings: config.label_mappings.clone(),
            include_default_labels: config.include_default_labels,
            interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Run one poll cycle: list, filter, map, reconcile.
    ///
    /// On error the registry is left untouched; the caller decides whether
    /// to record the failure.
    pub async fn poll_once(&self) -> Result<CycleReport, RuntimeError> {
        let snapshots = self.lister.list_containers().await?;
        let listed = snapshots.len();

        let samples: Vec<HealthSample> = snapshots
            .iter()
            .filter(|snapshot| self.policy.should_monitor(snapshot))
            .map(|snapshot| HealthSample {
                key: SeriesKey::new(build_label_set(
                    snapshot,
                    &self.label_mappings,
                    self.include_default_labels,
                )),
                status: snapshot.health,
                failure_streak: snapshot.failure_streak,
            })
            .collect();

        let monitored = samples.len();
        self.registry.reconcile(samples);

        Ok(CycleReport { listed, monitored })
    }

    /// Run the poll loop until the shutdown signal is received.
    ///
    /// Cycles never overlap: when one overruns the interval, the next tick
    /// is delayed by a full interval rather than fired immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            opt_in_only = self.policy.opt_in_only,
            "Starting health poller"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(report) => {
                            debug!(
                                listed = report.listed,
                                monitored = report.monitored,
                                "Poll cycle completed"
                            );
                        }
                        Err(e) => {
                            self.registry.record_failed_cycle();
                            warn!(error = %e, "Poll cycle failed, keeping previous metrics");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health poller stopped");
    }
}
