//! Environment-driven configuration for the exporter.

use thiserror::Error;

use crate::mapping::sanitize_label_name;

const DEFAULT_LISTEN: &str = "0.0.0.0:5000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
    #[error("Failed to parse LABEL_MAPPINGS: {0}")]
    LabelMappings(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Address to listen on (default: "0.0.0.0:5000").
    pub listen: String,

    /// Docker daemon endpoint; `None` uses the default socket.
    pub docker_host: Option<String>,

    /// Docker API request timeout in seconds.
    pub docker_timeout_secs: u64,

    /// Seconds between poll cycles. Values below 1 are raised to 1.
    pub poll_interval_secs: u64,

    /// When set, only containers labelled `prometheus.health.enabled=true`
    /// are monitored.
    pub opt_in_only: bool,

    /// Container label to metric label pairs, in definition order.
    /// Target names are sanitized at load time.
    pub label_mappings: Vec<(String, String)>,

    /// Whether the five default labels are added to every series.
    pub include_default_labels: bool,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,

    /// Log output format: "text" or "json".
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from the given variable lookup.
    ///
    /// Split out from [`ExporterConfig::from_env`] so tests can inject
    /// variables without mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let docker_host = lookup("DOCKER_HOST").filter(|value| !value.trim().is_empty());
        let docker_timeout_secs =
            parse_u64(&lookup, "DOCKER_TIMEOUT", DEFAULT_DOCKER_TIMEOUT_SECS)?;
        let poll_interval_secs =
            parse_u64(&lookup, "POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?.max(1);
        let opt_in_only = parse_bool(&lookup, "OPT_IN_ONLY", false)?;
        let include_default_labels = !parse_bool(&lookup, "NO_DEFAULT_LABELS", false)?;

        let label_mappings = match lookup("LABEL_MAPPINGS") {
            Some(raw) => parse_label_mappings(&raw)?,
            None => Vec::new(),
        };

        let mut level = lookup("LOG_LEVEL")
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
            .trim()
            .to_ascii_lowercase();
        if !matches!(
            level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::Invalid {
                var: "LOG_LEVEL".to_string(),
                message: format!("unknown level {:?}", level),
            });
        }
        if parse_bool(&lookup, "DEBUG", false)? {
            level = "debug".to_string();
        }

        let format = match lookup("LOG_FORMAT") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "LOG_FORMAT".to_string(),
                        message: format!("expected \"text\" or \"json\", got {:?}", raw),
                    });
                }
            },
            None => LogFormat::default(),
        };

        let config = Self {
            listen,
            docker_host,
            docker_timeout_secs,
            poll_interval_secs,
            opt_in_only,
            label_mappings,
            include_default_labels,
            logging: LoggingConfig { level, format },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.listen
            )));
        }

        if self.docker_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "DOCKER_TIMEOUT must be > 0".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "POLL_INTERVAL must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            docker_host: None,
            docker_timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            opt_in_only: false,
            label_mappings: Vec::new(),
            include_default_labels: true,
            logging: LoggingConfig::default(),
        }
    }
}

/// Parse a `source label -> metric label` mapping from a JSON object string.
///
/// Definition order is preserved so duplicate targets resolve last-write-wins
/// in a predictable way. Metric label names are sanitized here, once.
fn parse_label_mappings(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ConfigError::LabelMappings(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ConfigError::LabelMappings("expected a JSON object".to_string()))?;

    let mut mappings = Vec::with_capacity(object.len());
    for (source, target) in object {
        let target = target.as_str().ok_or_else(|| {
            ConfigError::LabelMappings(format!("value for {:?} must be a string", source))
        })?;
        mappings.push((source.clone(), sanitize_label_name(target)));
    }

    Ok(mappings)
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let raw = match lookup(var) {
        Some(raw) => raw,
        None => return Ok(default),
    };

    raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        var: var.to_string(),
        message: e.to_string(),
    })
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let raw = match lookup(var) {
        Some(raw) => raw,
        None => return Ok(default),
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var: var.to_string(),
            message: format!("expected a boolean, got {:?}", raw),
        }),
    }
}
