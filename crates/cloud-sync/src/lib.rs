//! Cloud Synchronization Module
//!
//! Event distribution and reporting between edge nodes:
//! - MQTT event bus (`detector/drowsy`, `gateway/ack`)
//! - JSON event payloads
//! - Fire-and-forget telemetry updates over HTTP

mod bus;
mod message;
mod telemetry;

pub use bus::{BusConfig, Delivery, EventBus};
pub use message::{decode_drowsy, EventMessage, ACK_TOPIC, DROWSY_TOPIC};
pub use telemetry::{ReportOutcome, TelemetryConfig, TelemetryReporter};

use thiserror::Error;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}
