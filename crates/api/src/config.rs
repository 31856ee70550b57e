//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::TransitionPolicy;
use fulfillment::FulfillmentSettings;
use fulfillment::carrier::http::DEFAULT_BASE_URL;
use fulfillment::context::{DEFAULT_EXTERNAL_TIMEOUT, DEFAULT_PICKUP_LOCATION};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How the carrier client authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierAuth {
    /// A pre-issued bearer token.
    Token(String),
    /// API-user credentials exchanged for a token on first use.
    Login { email: String, password: String },
    /// No credentials: shipments go to the in-memory carrier.
    Disabled,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `CARRIER_BASE_URL`: carrier API root
/// - `CARRIER_TOKEN`, or `CARRIER_EMAIL` and `CARRIER_PASSWORD`
/// - `CARRIER_PICKUP_LOCATIONS`: comma-separated, in preference order
/// - `EXTERNAL_TIMEOUT_SECS`: bound on carrier calls (default: `10`)
/// - `STRICT_STATUS_TRANSITIONS`: enforce the transition table (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub carrier_base_url: String,
    pub carrier_auth: CarrierAuth,
    pub pickup_locations: Vec<String>,
    pub external_timeout: Duration,
    pub strict_transitions: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let carrier_auth = match (
            non_empty("CARRIER_TOKEN"),
            non_empty("CARRIER_EMAIL"),
            non_empty("CARRIER_PASSWORD"),
        ) {
            (Some(token), _, _) => CarrierAuth::Token(token),
            (None, Some(email), Some(password)) => CarrierAuth::Login { email, password },
            _ => CarrierAuth::Disabled,
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            carrier_base_url: non_empty("CARRIER_BASE_URL").unwrap_or(defaults.carrier_base_url),
            carrier_auth,
            pickup_locations: non_empty("CARRIER_PICKUP_LOCATIONS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            external_timeout: non_empty("EXTERNAL_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.external_timeout),
            strict_transitions: non_empty("STRICT_STATUS_TRANSITIONS")
                .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Workflow settings derived from this configuration.
    pub fn fulfillment_settings(&self) -> FulfillmentSettings {
        FulfillmentSettings {
            pickup_locations: self.pickup_locations.clone(),
            fallback_pickup_location: DEFAULT_PICKUP_LOCATION.to_string(),
            external_timeout: self.external_timeout,
            transition_policy: if self.strict_transitions {
                TransitionPolicy::Strict
            } else {
                TransitionPolicy::Permissive
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            carrier_base_url: DEFAULT_BASE_URL.to_string(),
            carrier_auth: CarrierAuth::Disabled,
            pickup_locations: Vec::new(),
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
            strict_transitions: false,
        }
    }
}
