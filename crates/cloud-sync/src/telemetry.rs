//! Best-effort telemetry reporting (ThingSpeak-style update endpoint)

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::CloudError;

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Update endpoint
    pub endpoint: String,
    /// Write API key; reporting is disabled without one
    pub api_key: Option<String>,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.thingspeak.com/update".to_string(),
            api_key: None,
            timeout_secs: 5,
        }
    }
}

/// What happened to one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Endpoint answered 200
    Delivered,
    /// Endpoint answered with another status
    Rejected(u16),
    /// Transport failure
    Failed,
    /// No API key configured
    Disabled,
}

/// Fire-and-forget reporter. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TelemetryReporter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl TelemetryReporter {
    pub fn new(config: &TelemetryConfig) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CloudError::Http(e.to_string()))?;

        let api_key = config.api_key.clone().filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            info!("No telemetry API key configured, reporting disabled");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Update URL carrying the event counter and the score rounded to 2 decimals
    pub fn update_url(&self, event_count: u64, score: f64) -> Option<Url> {
        let api_key = self.api_key.as_deref()?;
        let params = [
            ("api_key", api_key.to_string()),
            ("field1", event_count.to_string()),
            ("field2", format!("{:.2}", score)),
        ];
        match Url::parse_with_params(&self.endpoint, &params) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Invalid telemetry endpoint {}: {}", self.endpoint, e);
                None
            }
        }
    }

    /// Send one update. Never fails; the outcome is logged and returned.
    pub async fn report(&self, event_count: u64, score: f64) -> ReportOutcome {
        if !self.is_enabled() {
            return ReportOutcome::Disabled;
        }
        let Some(url) = self.update_url(event_count, score) else {
            return ReportOutcome::Failed;
        };

        match self.client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Telemetry updated (event #{})", event_count);
                ReportOutcome::Delivered
            }
            Ok(response) => {
                warn!("Telemetry error: HTTP {}", response.status());
                ReportOutcome::Rejected(response.status().as_u16())
            }
            Err(e) => {
                warn!("Telemetry request failed: {}", e);
                debug!("Telemetry endpoint: {}", self.endpoint);
                ReportOutcome::Failed
            }
        }
    }
}
