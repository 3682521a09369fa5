//! Actuator Link
//!
//! Async serial communication with the alarm microcontroller. The wire
//! protocol is newline-delimited text: the host sends `DROWSY`, the
//! microcontroller answers `ACK` once the driver presses its button.

mod error;
mod link;
mod protocol;

pub use error::LinkError;
pub use link::{ActuatorLink, SerialLink};
pub use protocol::{decode_line, Command, LinkMessage};

use serde::{Deserialize, Serialize};

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port device path (e.g., "/dev/ttyACM0" or "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Delay after opening the port; opening resets most Arduino boards (ms)
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            settle_ms: 2000,
        }
    }
}
