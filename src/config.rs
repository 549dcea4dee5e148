use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
    pub ops: OpsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    /// Value of the `service` label on every request sample
    pub service_name: String,
    /// Histogram bucket upper bounds, in milliseconds
    #[serde(default = "default_latency_buckets_ms")]
    pub latency_buckets_ms: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpsSettings {
    pub host_label: Option<String>,
    pub build_id: Option<String>,
    pub overall_deadline_ms: u64,
    pub dependency_timeout_ms: u64,
    #[serde(default)]
    pub services: Vec<PeerServiceConfig>,
}

/// A peer service probed over HTTP by the ops aggregator
#[derive(Debug, Clone, Deserialize)]
pub struct PeerServiceConfig {
    pub name: String,
    pub url: String,
    pub timeout_ms: u64,
    /// Whether a failure of this peer flips the readiness flag
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_latency_buckets_ms() -> Vec<f64> {
    vec![
        5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
    ]
}

fn default_required() -> bool {
    true
}

impl OpsSettings {
    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }

    /// Host label reported in the ops status; falls back to `$HOSTNAME`
    pub fn host_label(&self) -> String {
        self.host_label
            .clone()
            .or_else(|| env::var("HOSTNAME").ok())
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Determine environment
        let environment = env::var("FLEET_OPS_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(
                config::File::with_name(&format!("config/{}", environment)).required(false),
            )
            // e.g., FLEET_OPS__SERVER__PORT=8080
            .add_source(
                config::Environment::with_prefix("FLEET_OPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration("Invalid port number".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(AppError::Configuration(
                "Database URL is required".to_string(),
            ));
        }

        if self.observability.service_name.trim().is_empty() {
            return Err(AppError::Configuration(
                "Service name is required".to_string(),
            ));
        }

        let buckets = &self.observability.latency_buckets_ms;
        if buckets.is_empty() || buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::Configuration(
                "Latency buckets must be non-empty and strictly increasing".to_string(),
            ));
        }

        if self.ops.overall_deadline_ms == 0 || self.ops.dependency_timeout_ms == 0 {
            return Err(AppError::Configuration(
                "Ops deadlines must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.ops.services {
            if service.timeout_ms == 0 {
                return Err(AppError::Configuration(format!(
                    "Service '{}' has a zero timeout",
                    service.name
                )));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(AppError::Configuration(format!(
                    "Duplicate service name '{}'",
                    service.name
                )));
            }
            if reqwest::Url::parse(&service.url).is_err() {
                return Err(AppError::Configuration(format!(
                    "Service '{}' has an invalid URL",
                    service.name
                )));
            }
        }

        Ok(())
    }
}
