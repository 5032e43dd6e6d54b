//! Registry that stores container health series and renders them in
//! Prometheus exposition format.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::docker::HealthStatus;

/// Gauge family for container health state.
pub const HEALTH_STATUS_METRIC: &str = "docker_container_health_status";
/// Gauge family for consecutive health check failures.
pub const FAILURE_STREAK_METRIC: &str = "docker_container_health_failure_streak";

const HEALTH_STATUS_HELP: &str = "Health status of Docker containers with health checks (0=unhealthy, 1=healthy, 2=starting, 3=no health check)";
const FAILURE_STREAK_HELP: &str = "Number of consecutive health check failures";

/// A unique identifier for a metric time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    /// Sorted label key-value pairs.
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    /// Create a series key, sorting labels for consistent hashing.
    pub fn new(mut labels: Vec<(String, String)>) -> Self {
        labels.sort_by(|a, b| a.0.cmp(&b.0));
        Self { labels }
    }

    /// Format labels for Prometheus exposition format.
    pub fn format_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();

        format!("{{{}}}", parts.join(","))
    }
}

/// One monitored container's health reading for a poll cycle.
#[derive(Debug, Clone)]
pub struct HealthSample {
    /// The series identifier.
    pub key: SeriesKey,
    /// Health check state.
    pub status: HealthStatus,
    /// Consecutive failed health checks.
    pub failure_streak: u64,
}

/// Stored values for one series, feeding both gauge families.
#[derive(Debug, Clone, Copy)]
struct SeriesValue {
    status: HealthStatus,
    failure_streak: u64,
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Poll cycles that completed and updated the registry.
    pub cycles_completed: u64,
    /// Poll cycles that failed before updating the registry.
    pub cycles_failed: u64,
    /// Containers monitored in the last completed cycle.
    pub containers_monitored: u64,
}

/// Thread-safe store of container health series.
pub struct HealthRegistry {
    /// Active series indexed by label set.
    series: RwLock<HashMap<SeriesKey, SeriesValue>>,
    /// Statistics.
    stats: RwLock<RegistryStats>,
}

impl HealthRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            stats: RwLock::new(RegistryStats::default()),
        }
    }

    /// Replace the registry contents with the samples of a completed cycle.
    ///
    /// The replacement map is built before the write lock is taken, so a
    /// concurrent scrape sees either the previous cycle or this one in full.
    /// Series absent from `samples` are dropped with the swap.
    pub fn reconcile(&self, samples: Vec<HealthSample>) {
        let monitored = samples.len();

        let mut next = HashMap::with_capacity(monitored);
        for sample in samples {
            next.insert(
                sample.key,
                SeriesValue {
                    status: sample.status,
                    failure_streak: sample.failure_streak,
                },
            );
        }

        let stale = {
            let mut series = self.series.write();
            let stale = series.keys().filter(|key| !next.contains_key(*key)).count();
            *series = next;
            stale
        };

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.containers_monitored = monitored as u64;
        }

        if stale > 0 {
            debug!(
                removed = stale,
                remaining = monitored,
                "Dropped series for departed containers"
            );
        }
    }

    /// Record a cycle that failed without touching stored series.
    pub fn record_failed_cycle(&self) {
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
    }

    /// Get the current number of stored label sets.
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.stats.read().clone()
    }

    /// Render metrics in Prometheus exposition format.
    pub fn render(&self) -> String {
        let series = self.series.read();
        let mut output = Vec::with_capacity(series.len() * 160 + 512);

        // Sort by label set for consistent output
        let mut keys: Vec<&SeriesKey> = series.keys().collect();
        keys.sort();

        writeln!(output, "# HELP {} {}", HEALTH_STATUS_METRIC, HEALTH_STATUS_HELP).ok();
        writeln!(output, "# TYPE {} gauge", HEALTH_STATUS_METRIC).ok();
        for key in &keys {
            let value = series[*key];
            writeln!(
                output,
                "{}{} {}",
                HEALTH_STATUS_METRIC,
                key.format_labels(),
                format_value(value.status.value())
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(output, "# HELP {} {}", FAILURE_STREAK_METRIC, FAILURE_STREAK_HELP).ok();
        writeln!(output, "# TYPE {} gauge", FAILURE_STREAK_METRIC).ok();
        for key in &keys {
            let value = series[*key];
            writeln!(
                output,
                "{}{} {}",
                FAILURE_STREAK_METRIC,
                key.format_labels(),
                format_value(value.failure_streak as f64)
            )
            .ok();
        }

        // Add exporter stats as metrics
        let stats = self.stats.read();
        writeln!(output).ok();
        writeln!(output, "# TYPE docker_health_exporter_poll_cycles_total counter").ok();
        writeln!(
            output,
            "docker_health_exporter_poll_cycles_total {}",
            stats.cycles_completed
        )
        .ok();

        writeln!(output, "# TYPE docker_health_exporter_poll_errors_total counter").ok();
        writeln!(
            output,
            "docker_health_exporter_poll_errors_total {}",
            stats.cycles_failed
        )
        .ok();

        writeln!(output, "# TYPE docker_health_exporter_containers_monitored gauge").ok();
        writeln!(
            output,
            "docker_health_exporter_containers_monitored {}",
            stats.containers_monitored
        )
        .ok();

        String::from_utf8(output).unwrap_or_default()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<HealthRegistry>;

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(labels: &[(&str, &str)], status: HealthStatus, failure_streak: u64) -> HealthSample {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HealthSample {
            key: SeriesKey::new(labels),
            status,
            failure_streak,
        }
    }

    /// The container family lines, without the exporter's own stats.
    fn container_lines(output: &str) -> Vec<String> {
        output
            .lines()
            .filter(|line| line.starts_with("docker_container_"))
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn test_series_key_sorts_labels() {
        let a = SeriesKey::new(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        let b = SeriesKey::new(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);

        assert_eq!(a, b);
        assert_eq!(a.format_labels(), "{a=\"1\",b=\"2\"}");
    }

    #[test]
    fn test_series_key_empty_labels() {
        let key = SeriesKey::new(Vec::new());
        assert_eq!(key.format_labels(), "");
    }

    #[test]
    fn test_reconcile_and_render() {
        let registry = HealthRegistry::new();
        registry.reconcile(vec![
            sample(
                &[("container_name", "web"), ("container_id", "abc123def456")],
                HealthStatus::Healthy,
                0,
            ),
            sample(
                &[("container_name", "db"), ("container_id", "def456abc123")],
                HealthStatus::Unhealthy,
                4,
            ),
        ]);

        let output = registry.render();

        assert!(output.contains("# TYPE docker_container_health_status gauge"));
        assert!(output.contains("# TYPE docker_container_health_failure_streak gauge"));
        assert!(output.lines().any(|line| {
            line.starts_with("docker_container_health_status{")
                && line.contains("container_name=\"web\"")
                && line.ends_with(" 1")
        }));
        assert!(output.lines().any(|line| {
            line.starts_with("docker_container_health_status{")
                && line.contains("container_name=\"db\"")
                && line.ends_with(" 0")
        }));
        assert!(output.lines().any(|line| {
            line.starts_with("docker_container_health_failure_streak{")
                && line.contains("container_name=\"db\"")
                && line.ends_with(" 4")
        }));
    }

    #[test]
    fn test_reconcile_removes_stale_series() {
        let registry = HealthRegistry::new();
        registry.reconcile(vec![
            sample(&[("container_name", "web")], HealthStatus::Healthy, 0),
            sample(&[("container_name", "db")], HealthStatus::Healthy, 0),
        ]);
        assert_eq!(registry.series_count(), 2);

        registry.reconcile(vec![sample(
            &[("container_name", "web")],
            HealthStatus::Healthy,
            0,
        )]);

        assert_eq!(registry.series_count(), 1);
        let output = registry.render();
        assert!(!output.contains("container_name=\"db\""));
    }

    #[test]
    fn test_reconcile_identical_cycles_render_identically() {
        let registry = HealthRegistry::new();
        let cycle = || {
            vec![
                sample(&[("container_name", "web")], HealthStatus::Healthy, 0),
                sample(&[("container_name", "db")], HealthStatus::Starting, 1),
            ]
        };

        registry.reconcile(cycle());
        let first = container_lines(&registry.render());

        registry.reconcile(cycle());
        let second = container_lines(&registry.render());

        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_cycle_keeps_series() {
        let registry = HealthRegistry::new();
        registry.reconcile(vec![sample(
            &[("container_name", "web")],
            HealthStatus::Healthy,
            0,
        )]);

        registry.record_failed_cycle();

        assert_eq!(registry.series_count(), 1);
        let stats = registry.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.cycles_failed, 1);
        assert!(registry.render().contains("container_name=\"web\""));
    }

    #[test]
    fn test_render_orders_series_deterministically() {
        let registry = HealthRegistry::new();
        registry.reconcile(vec![
            sample(&[("container_name", "zeta")], HealthStatus::Healthy, 0),
            sample(&[("container_name", "alpha")], HealthStatus::Healthy, 0),
        ]);

        let output = registry.render();
        let status_lines: Vec<&str> = output
            .lines()
            .filter(|line| line.starts_with("docker_container_health_status{"))
            .collect();

        assert_eq!(status_lines.len(), 2);
        assert!(status_lines[0].contains("alpha"));
        assert!(status_lines[1].contains("zeta"));
    }

    #[test]
    fn test_empty_registry_renders_families_and_stats() {
        let registry = HealthRegistry::new();
        let output = registry.render();

        assert!(output.contains("# TYPE docker_container_health_status gauge"));
        assert!(output.contains("# TYPE docker_container_health_failure_streak gauge"));
        assert!(output.contains("docker_health_exporter_poll_cycles_total 0"));
        assert!(output.contains("docker_health_exporter_poll_errors_total 0"));
        assert!(output.contains("docker_health_exporter_containers_monitored 0"));
    }

    #[test]
    fn test_stats_track_monitored_containers() {
        let registry = HealthRegistry::new();
        registry.reconcile(vec![
            sample(&[("container_name", "a")], HealthStatus::Healthy, 0),
            sample(&[("container_name", "b")], HealthStatus::Healthy, 0),
        ]);
        registry.reconcile(vec![sample(
            &[("container_name", "a")],
            HealthStatus::Healthy,
            0,
        )]);

        let stats = registry.stats();
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.containers_monitored, 1);
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
