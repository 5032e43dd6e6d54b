//! Label set construction for container health series.

use crate::docker::ContainerSnapshot;

/// Sanitize a label name to be Prometheus-compatible.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for (i, c) in name.chars().enumerate() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };

        if valid {
            result.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    // Remove trailing underscores
    while result.ends_with('_') {
        result.pop();
    }

    // Handle empty or reserved labels
    if result.is_empty() {
        return "label".to_string();
    }

    // Prefix if starts with double underscore (reserved)
    if result.starts_with("__") {
        result.insert(0, 'z');
    }

    result
}

/// Build the metric label set for a container.
///
/// Default labels come first, then the configured mappings in definition
/// order. A mapping target that repeats an earlier name overwrites it, so
/// mappings can deliberately replace a default label.
pub fn build_label_set(
    snapshot: &ContainerSnapshot,
    mappings: &[(String, String)],
    include_defaults: bool,
) -> Vec<(String, String)> {
    let mut labels: Vec<(String, String)> = Vec::with_capacity(5 + mappings.len());

    if include_defaults {
        labels.push(("container_id".to_string(), snapshot.id.clone()));
        labels.push(("container_name".to_string(), snapshot.name.clone()));
        labels.push(("image".to_string(), snapshot.image.clone()));
        labels.push(("stack".to_string(), snapshot.stack.clone()));
        labels.push(("service".to_string(), snapshot.service.clone()));
    }

    for (source, target) in mappings {
        let Some(value) = snapshot.labels.get(source) else {
            continue;
        };

        // Last write wins on duplicate targets
        if let Some(existing) = labels.iter_mut().find(|(name, _)| name == target) {
            existing.1 = value.clone();
        } else {
            labels.push((target.clone(), value.clone()));
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::HealthStatus;
    use std::collections::HashMap;

    fn make_snapshot(container_labels: &[(&str, &str)]) -> ContainerSnapshot {
        let labels: HashMap<String, String> = container_labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ContainerSnapshot::new(
            "abc123def456789a".to_string(),
            "web-1".to_string(),
            "nginx:latest".to_string(),
            labels,
            HealthStatus::Healthy,
            0,
        )
    }

    fn mappings(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_sanitize_label_name() {
        assert_eq!(sanitize_label_name("team"), "team");
        assert_eq!(sanitize_label_name("device-id"), "device_id");
        assert_eq!(sanitize_label_name("com.example.team"), "com_example_team");
    }

    #[test]
    fn test_sanitize_label_name_leading_digit() {
        assert_eq!(sanitize_label_name("1team"), "_team");
    }

    #[test]
    fn test_sanitize_label_name_reserved() {
        assert_eq!(sanitize_label_name("__meta"), "z__meta");
    }

    #[test]
    fn test_sanitize_label_name_empty() {
        assert_eq!(sanitize_label_name(""), "label");
        assert_eq!(sanitize_label_name("---"), "label");
    }

    #[test]
    fn test_build_label_set_defaults() {
        let snapshot = make_snapshot(&[
            ("com.docker.compose.project", "shop"),
            ("com.docker.compose.service", "web"),
        ]);

        let labels = build_label_set(&snapshot, &[], true);

        assert_eq!(
            labels,
            vec![
                ("container_id".to_string(), "abc123def456".to_string()),
                ("container_name".to_string(), "web-1".to_string()),
                ("image".to_string(), "nginx:latest".to_string()),
                ("stack".to_string(), "shop".to_string()),
                ("service".to_string(), "web".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_label_set_applies_mappings() {
        let snapshot = make_snapshot(&[("com.example.team", "infra")]);
        let mappings = mappings(&[("com.example.team", "team")]);

        let labels = build_label_set(&snapshot, &mappings, true);

        assert!(labels.contains(&("team".to_string(), "infra".to_string())));
        assert!(labels.iter().any(|(name, _)| name == "container_id"));
    }

    #[test]
    fn test_build_label_set_skips_missing_sources() {
        let snapshot = make_snapshot(&[]);
        let mappings = mappings(&[("com.example.team", "team")]);

        let labels = build_label_set(&snapshot, &mappings, true);

        assert!(!labels.iter().any(|(name, _)| name == "team"));
    }

    #[test]
    fn test_build_label_set_without_defaults() {
        let snapshot = make_snapshot(&[("com.example.team", "infra")]);
        let mappings = mappings(&[("com.example.team", "team")]);

        let labels = build_label_set(&snapshot, &mappings, false);

        assert_eq!(labels, vec![("team".to_string(), "infra".to_string())]);
    }

    #[test]
    fn test_build_label_set_mapping_overrides_default() {
        let snapshot = make_snapshot(&[("custom.image", "internal-nginx")]);
        let mappings = mappings(&[("custom.image", "image")]);

        let labels = build_label_set(&snapshot, &mappings, true);

        let image_values: Vec<&str> = labels
            .iter()
            .filter(|(name, _)| name == "image")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(image_values, vec!["internal-nginx"]);
    }

    #[test]
    fn test_build_label_set_duplicate_target_last_wins() {
        let snapshot = make_snapshot(&[("label.a", "first"), ("label.b", "second")]);
        let mappings = mappings(&[("label.a", "owner"), ("label.b", "owner")]);

        let labels = build_label_set(&snapshot, &mappings, false);

        assert_eq!(labels, vec![("owner".to_string(), "second".to_string())]);
    }
}
