//! Camera Capture Library for the Drowsiness Detector
//!
//! Pulls raw YUV420 video from `rpicam-vid` and exposes the luma plane of
//! each frame:
//! - Fixed-size frames at a fixed rate (default 640x480 @ 10fps)
//! - Pull-based: `next_frame` blocks the caller until a frame is available
//! - Truncated frames are skipped, never surfaced as errors

pub mod frame;
pub mod source;

pub use frame::{yuv420_frame_size, LumaFrame};
pub use source::{FrameSource, RpicamSource, Yuv420Reader};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to launch capture process: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture stream ended")]
    EndOfStream,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture program (e.g., "rpicam-vid")
    pub command: String,
    /// Arguments replacing the default rpicam-vid ones (e.g., for libcamera-vid)
    pub args: Option<Vec<String>>,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: "rpicam-vid".to_string(),
            args: None,
            width: 640,
            height: 480,
            fps: 10,
        }
    }
}

impl CameraConfig {
    /// Arguments for an endless, preview-less raw YUV420 stream on stdout
    pub fn capture_args(&self) -> Vec<String> {
        if let Some(args) = &self.args {
            return args.clone();
        }
        vec![
            "-t".to_string(),
            "0".to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
            "--framerate".to_string(),
            self.fps.to_string(),
            "--codec".to_string(),
            "yuv420".to_string(),
            "--nopreview".to_string(),
            "-o".to_string(),
            "-".to_string(),
        ]
    }

    /// Bytes per YUV420 frame on the capture pipe
    pub fn frame_size(&self) -> usize {
        yuv420_frame_size(self.width, self.height)
    }

    /// Reject configurations that cannot produce a frame
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(CameraError::Format("frame rate must be non-zero".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(CameraError::Format("capture command is empty".to_string()));
        }
        Ok(())
    }
}
