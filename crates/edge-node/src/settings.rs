//! Layered settings: defaults, optional TOML file, `DROWSY__*` environment

use std::net::SocketAddr;
use std::path::Path;

use actuator_link::SerialConfig;
use alerting::AggregatorConfig;
use camera_capture::CameraConfig;
use cloud_sync::{BusConfig, TelemetryConfig};
use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix, e.g. `DROWSY__SERIAL__PORT`
const ENV_PREFIX: &str = "DROWSY";

/// Conventional variable holding the telemetry write key
const API_KEY_VAR: &str = "THINGSPEAK_API_KEY";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Metrics exporter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listen address; no exporter when unset
    pub listen_addr: Option<SocketAddr>,
}

/// Settings for either node role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSettings {
    pub camera: CameraConfig,
    pub detector: DmsConfig,
    pub aggregator: AggregatorConfig,
    pub serial: SerialConfig,
    pub bus: BusConfig,
    pub telemetry: TelemetryConfig,
    pub metrics: MetricsConfig,
}

impl EdgeSettings {
    /// Load from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings = Self::from_config(config)?;
        settings.fill_api_key(std::env::var(API_KEY_VAR).ok());
        settings.validate()?;
        Ok(settings)
    }

    fn from_config(config: Config) -> Result<Self, SettingsError> {
        Ok(config.try_deserialize()?)
    }

    /// Use `key` when no telemetry key was configured
    fn fill_api_key(&mut self, key: Option<String>) {
        if self.telemetry.api_key.is_none() {
            self.telemetry.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.camera
            .validate()
            .map_err(|e| SettingsError::Invalid(format!("camera: {}", e)))?;
        self.detector
            .validate()
            .map_err(|e| SettingsError::Invalid(format!("detector: {}", e)))?;
        self.aggregator
            .validate()
            .map_err(|e| SettingsError::Invalid(format!("aggregator: {}", e)))?;

        if self.serial.port.trim().is_empty() {
            return Err(SettingsError::Invalid("serial: port is empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(SettingsError::Invalid(
                "serial: baud_rate must be non-zero".to_string(),
            ));
        }
        if self.bus.enabled && self.bus.broker_url.trim().is_empty() {
            return Err(SettingsError::Invalid("bus: broker_url is empty".to_string()));
        }
        Ok(())
    }
}
