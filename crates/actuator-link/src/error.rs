//! Actuator Link Error Types

use thiserror::Error;

/// Errors that can occur on the serial link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Port could not be opened
    #[error("Failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    /// Read or write failure
    #[error("Serial I/O error: {0}")]
    Io(String),

    /// Line reader has stopped
    #[error("Serial link closed")]
    Closed,
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}
