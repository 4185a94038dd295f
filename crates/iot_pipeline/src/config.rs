use common::postgres::PostgresConfig;
use config::{Config, ConfigError, Environment};
use ingest_worker::domain::{PipelineConfig, SimulatorConfig, ValidRanges, ValueRange};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where readings and analytics are persisted.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Storage backend: postgres or memory
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Connections per pipeline component
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Create tables and indexes at startup
    #[serde(default = "default_apply_schema")]
    pub apply_schema: bool,

    /// Monthly partitions created ahead of the current month
    #[serde(default = "default_partition_months_ahead")]
    pub partition_months_ahead: u32,

    // Simulator configuration
    /// Sensors per sensor type
    #[serde(default = "default_num_sensors")]
    pub num_sensors: usize,

    /// Readings per batch; unset sweeps every sensor once
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub simulator_seed: Option<u64>,

    // Pipeline configuration
    /// Seconds between ingest iterations
    #[serde(default = "default_sampling_interval_secs")]
    pub sampling_interval_secs: f64,

    /// Seconds between analytics runs
    #[serde(default = "default_analytics_interval_secs")]
    pub analytics_interval_secs: u64,

    /// Length of each analytics window in minutes
    #[serde(default = "default_analytics_window_minutes")]
    pub analytics_window_minutes: u32,

    /// Batches kept for performance averages
    #[serde(default = "default_metrics_window_size")]
    pub metrics_window_size: usize,

    /// Emit a health report every N stored readings; 0 disables it
    #[serde(default = "default_health_report_every")]
    pub health_report_every: u64,

    // Validation ranges
    #[serde(default = "default_temperature_min")]
    pub temperature_min: f64,

    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,

    #[serde(default = "default_humidity_min")]
    pub humidity_min: f64,

    #[serde(default = "default_humidity_max")]
    pub humidity_max: f64,

    /// Seconds allowed for shutdown closers
    #[serde(default = "default_closer_timeout_secs")]
    pub closer_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "iot_db".to_string()
}

fn default_postgres_username() -> String {
    "iot_user".to_string()
}

fn default_postgres_password() -> String {
    "iot_password".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    2
}

fn default_apply_schema() -> bool {
    true
}

fn default_partition_months_ahead() -> u32 {
    2
}

fn default_num_sensors() -> usize {
    5
}

fn default_sampling_interval_secs() -> f64 {
    1.0
}

fn default_analytics_interval_secs() -> u64 {
    300
}

fn default_analytics_window_minutes() -> u32 {
    5
}

fn default_metrics_window_size() -> usize {
    100
}

fn default_health_report_every() -> u64 {
    100
}

fn default_temperature_min() -> f64 {
    15.0
}

fn default_temperature_max() -> f64 {
    30.0
}

fn default_humidity_min() -> f64 {
    30.0
}

fn default_humidity_max() -> f64 {
    70.0
}

fn default_closer_timeout_secs() -> u64 {
    10
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "iot-pipeline".to_string()
}

impl ServiceConfig {
    /// Load configuration from `IOT_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("IOT"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling_interval_secs.is_finite() && self.sampling_interval_secs > 0.0) {
            return Err(ConfigError::Message(format!(
                "sampling_interval_secs must be positive, got {}",
                self.sampling_interval_secs
            )));
        }
        if self.num_sensors == 0 {
            return Err(ConfigError::Message(
                "num_sensors must be at least 1".to_string(),
            ));
        }
        if self.temperature_min > self.temperature_max || self.humidity_min > self.humidity_max {
            return Err(ConfigError::Message(
                "range minimum exceeds maximum".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sampling_interval: Duration::from_secs_f64(self.sampling_interval_secs),
            analytics_interval: Duration::from_secs(self.analytics_interval_secs),
            analytics_window_minutes: self.analytics_window_minutes,
            metrics_window_size: self.metrics_window_size,
            health_report_every: self.health_report_every,
            valid_ranges: ValidRanges {
                temperature: ValueRange::new(self.temperature_min, self.temperature_max),
                humidity: ValueRange::new(self.humidity_min, self.humidity_max),
            },
        }
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            num_sensors: self.num_sensors,
            batch_size: self.batch_size,
            seed: self.simulator_seed,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }
}
