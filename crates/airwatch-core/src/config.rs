//! Configuration loading and typed config structures for Airwatch.
//!
//! The canonical configuration lives in `airwatch-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads, overrides, and validates it.
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use airwatch_types::Coordinate;
use serde::Deserialize;

use crate::backoff::BackoffPolicy;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `airwatch-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AirwatchConfig {
    /// Feed endpoints and live transport selection.
    #[serde(default)]
    pub feeds: FeedsConfig,

    /// Historical backfill window.
    #[serde(default)]
    pub backfill: BackfillConfig,

    /// Live feed reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Density grid defaults.
    #[serde(default)]
    pub density: DensityConfig,

    /// Observer HTTP/WebSocket surface.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Event store sizing.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AirwatchConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values after parsing:
    /// - `AIRWATCH_BACKFILL_URL` overrides `feeds.backfill_url`
    /// - `AIRWATCH_LIVE_URL` overrides `feeds.live_url`
    /// - `AIRWATCH_OBSERVER_PORT` overrides `observer.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse, override from the process environment, and validate.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_with(yaml, |key| std::env::var(key).ok())
    }

    /// Like [`parse`](Self::parse), reading overrides through `lookup`
    /// instead of the process environment.
    pub fn parse_with<F>(yaml: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // An empty document deserializes to unit, not to an empty mapping.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides.
    ///
    /// This allows a deployment to point the feeds elsewhere without
    /// modifying the YAML file.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("AIRWATCH_BACKFILL_URL") {
            self.feeds.backfill_url = val;
        }
        if let Some(val) = lookup("AIRWATCH_LIVE_URL") {
            self.feeds.live_url = val;
        }
        if let Some(val) = lookup("AIRWATCH_OBSERVER_PORT") {
            self.observer.port = val.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "observer.port",
                reason: format!("AIRWATCH_OBSERVER_PORT={val:?}: {e}"),
            })?;
        }
        Ok(())
    }

    /// Check cross-field and range constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.backfill_url.trim().is_empty() {
            return Err(invalid("feeds.backfill_url", "must not be empty"));
        }
        if self.feeds.live_transport == LiveTransport::Websocket && self.feeds.live_url.trim().is_empty() {
            return Err(invalid("feeds.live_url", "required for the websocket transport"));
        }
        if self.feeds.poll_interval_secs == 0 {
            return Err(invalid("feeds.poll_interval_secs", "must be at least 1"));
        }
        if self.backfill.window_minutes == 0 {
            return Err(invalid("backfill.window_minutes", "must be at least 1"));
        }
        self.reconnect.policy()?;
        if !(self.density.cell_size_deg.is_finite() && self.density.cell_size_deg > 0.0) {
            return Err(invalid("density.cell_size_deg", "must be a positive number of degrees"));
        }
        if !self.observer.default_observer().is_in_range() {
            return Err(invalid("observer.default_latitude", "default observer is not a valid coordinate"));
        }
        if !(self.observer.default_radius_km.is_finite() && self.observer.default_radius_km >= 0.0) {
            return Err(invalid("observer.default_radius_km", "must be a non-negative number of kilometres"));
        }
        if self.store.broadcast_capacity == 0 {
            return Err(invalid("store.broadcast_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// How live events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveTransport {
    /// Push over a `WebSocket`, one record or array per text frame.
    Websocket,
    /// Poll the backfill endpoint on a fixed interval.
    Polling,
}

/// Feed endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedsConfig {
    /// Base URL of the historical anomaly API.
    #[serde(default = "default_backfill_url")]
    pub backfill_url: String,

    /// `WebSocket` URL of the live anomaly push.
    #[serde(default = "default_live_url")]
    pub live_url: String,

    /// Live transport selection.
    #[serde(default = "default_live_transport")]
    pub live_transport: LiveTransport,

    /// Polling interval when `live_transport` is `polling`.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timeout for a single backfill HTTP request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl FeedsConfig {
    /// Polling interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Request timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            backfill_url: default_backfill_url(),
            live_url: default_live_url(),
            live_transport: default_live_transport(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Historical backfill configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackfillConfig {
    /// How far back the session's backfill reaches.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
}

impl BackfillConfig {
    /// Backfill window as a [`Duration`].
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes.saturating_mul(60))
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
        }
    }
}

/// Live feed reconnect policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReconnectConfig {
    /// First reconnect delay.
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Upper bound on the nominal delay.
    #[serde(default = "default_cap_ms")]
    pub cap_ms: u64,

    /// Relative jitter applied to each delay (0.2 = plus or minus 20%).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Reconnects tried before the feed is declared unavailable.
    /// Absent means retry forever.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl ReconnectConfig {
    /// Build the validated backoff policy.
    pub fn policy(&self) -> Result<BackoffPolicy, ConfigError> {
        BackoffPolicy::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.cap_ms),
            self.jitter,
            self.max_retries,
        )
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            cap_ms: default_cap_ms(),
            jitter: default_jitter(),
            max_retries: None,
        }
    }
}

/// Density grid defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DensityConfig {
    /// Default cell edge length in degrees.
    #[serde(default = "default_cell_size_deg")]
    pub cell_size_deg: f64,

    /// Quiet period before a bounding-box change triggers a rebuild.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl DensityConfig {
    /// Debounce quiet period as a [`Duration`].
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            cell_size_deg: default_cell_size_deg(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Observer API configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObserverConfig {
    /// Interface to bind.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_observer_port")]
    pub port: u16,

    /// Latitude used when a client gives no position.
    #[serde(default = "default_latitude")]
    pub default_latitude: f64,

    /// Longitude used when a client gives no position.
    #[serde(default = "default_longitude")]
    pub default_longitude: f64,

    /// Radius used when a client gives a position but no radius.
    #[serde(default = "default_radius_km")]
    pub default_radius_km: f64,

    /// Window of the "recent anomalies" replay for new subscribers.
    #[serde(default = "default_recent_window_minutes")]
    pub recent_window_minutes: u64,
}

impl ObserverConfig {
    /// Default observer position.
    pub const fn default_observer(&self) -> Coordinate {
        Coordinate::new(self.default_latitude, self.default_longitude)
    }

    /// Recent window as a [`Duration`].
    pub const fn recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window_minutes.saturating_mul(60))
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            default_radius_km: default_radius_km(),
            recent_window_minutes: default_recent_window_minutes(),
        }
    }
}

/// Event store sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Per-subscriber buffer of the admission broadcast.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_backfill_url() -> String {
    "http://localhost:8080".to_owned()
}

fn default_live_url() -> String {
    "ws://localhost:8080/ws/anomalies".to_owned()
}

const fn default_live_transport() -> LiveTransport {
    LiveTransport::Websocket
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_window_minutes() -> u64 {
    120
}

const fn default_base_ms() -> u64 {
    1_000
}

const fn default_cap_ms() -> u64 {
    30_000
}

const fn default_jitter() -> f64 {
    0.2
}

const fn default_cell_size_deg() -> f64 {
    airwatch_geo::DEFAULT_CELL_SIZE_DEG
}

const fn default_debounce_ms() -> u64 {
    1_000
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8081
}

const fn default_latitude() -> f64 {
    41.0
}

const fn default_longitude() -> f64 {
    29.0
}

const fn default_radius_km() -> f64 {
    airwatch_geo::DEFAULT_RADIUS_KM
}

const fn default_recent_window_minutes() -> u64 {
    120
}

const fn default_broadcast_capacity() -> usize {
    airwatch_store::DEFAULT_BROADCAST_CAPACITY
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_valid() {
        let config = AirwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect.base_ms, 1_000);
        assert_eq!(config.reconnect.cap_ms, 30_000);
        assert_eq!(config.density.cell_size_deg, 0.01);
        assert_eq!(config.observer.default_radius_km, 25.0);
        assert_eq!(config.feeds.live_transport, LiveTransport::Websocket);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AirwatchConfig::parse_with("", no_env).unwrap();
        assert_eq!(config, AirwatchConfig::default());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
feeds:
  backfill_url: "https://anomalies.example.org"
  live_url: "wss://anomalies.example.org/ws/anomalies"
  live_transport: polling
  poll_interval_secs: 15
  request_timeout_ms: 2500

backfill:
  window_minutes: 360

reconnect:
  base_ms: 500
  cap_ms: 10000
  jitter: 0.1
  max_retries: 8

density:
  cell_size_deg: 0.05
  debounce_ms: 750

observer:
  host: "127.0.0.1"
  port: 9090
  default_latitude: 39.93
  default_longitude: 32.85
  default_radius_km: 40.0
  recent_window_minutes: 60

store:
  broadcast_capacity: 64

logging:
  level: "debug"
  json: true
"#;
        let config = AirwatchConfig::parse_with(yaml, no_env).unwrap();
        assert_eq!(config.feeds.live_transport, LiveTransport::Polling);
        assert_eq!(config.feeds.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.backfill.window(), Duration::from_secs(360 * 60));
        assert_eq!(config.reconnect.max_retries, Some(8));
        assert_eq!(config.density.debounce(), Duration::from_millis(750));
        assert_eq!(config.observer.port, 9090);
        assert_eq!(config.store.broadcast_capacity, 64);
        assert!(config.logging.json);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = AirwatchConfig::parse_with("observer:\n  port: 7000\n", no_env).unwrap();
        assert_eq!(config.observer.port, 7000);
        assert_eq!(config.observer.host, "0.0.0.0");
        assert_eq!(config.backfill.window_minutes, 120);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let lookup = |key: &str| match key {
            "AIRWATCH_BACKFILL_URL" => Some("http://backfill.internal".to_owned()),
            "AIRWATCH_OBSERVER_PORT" => Some("9999".to_owned()),
            _ => None,
        };
        let config = AirwatchConfig::parse_with("observer:\n  port: 7000\n", lookup).unwrap();
        assert_eq!(config.feeds.backfill_url, "http://backfill.internal");
        assert_eq!(config.observer.port, 9999);
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let lookup = |key: &str| (key == "AIRWATCH_OBSERVER_PORT").then(|| "http".to_owned());
        let err = AirwatchConfig::parse_with("", lookup).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "observer.port", .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "density:\n  cell_size_deg: 0\n",
            "reconnect:\n  jitter: 1.5\n",
            "reconnect:\n  base_ms: 5000\n  cap_ms: 1000\n",
            "store:\n  broadcast_capacity: 0\n",
            "observer:\n  default_latitude: 95.0\n",
        ] {
            assert!(
                matches!(
                    AirwatchConfig::parse_with(yaml, no_env),
                    Err(ConfigError::Invalid { .. })
                ),
                "accepted: {yaml}"
            );
        }
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        assert!(matches!(
            AirwatchConfig::parse_with("feeds: [unclosed", no_env),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
