//! Frame sources: raw YUV420 stream reader and the rpicam-vid capture process

use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::frame::{yuv420_frame_size, LumaFrame};
use crate::{CameraConfig, CameraError};

/// Lazy, non-restartable sequence of luma frames
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Pull the next frame, waiting until one is available.
    ///
    /// `Ok(None)` means an incomplete frame was read and skipped.
    async fn next_frame(&mut self) -> Result<Option<LumaFrame>, CameraError>;
}

/// Splits a byte stream into fixed-size YUV420 frames
pub struct Yuv420Reader<R> {
    reader: R,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    sequence: u64,
}

impl<R: AsyncRead + Unpin> Yuv420Reader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            buffer: vec![0; yuv420_frame_size(width, height)],
            sequence: 0,
        }
    }

    /// Number of frames handed out so far
    pub fn frames_read(&self) -> u64 {
        self.sequence
    }

    /// Read until the buffer holds a full frame or the stream ends
    async fn fill(&mut self) -> std::io::Result<usize> {
        let mut filled = 0;
        while let Some(rest) = self.buffer.get_mut(filled..) {
            if rest.is_empty() {
                break;
            }
            let n = self.reader.read(rest).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

impl<R: AsyncRead + Unpin> FrameSource for Yuv420Reader<R> {
    async fn next_frame(&mut self) -> Result<Option<LumaFrame>, CameraError> {
        let read = self
            .fill()
            .await
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        if read == 0 {
            return Err(CameraError::EndOfStream);
        }
        if read < self.buffer.len() {
            debug!("Skipping short frame ({} of {} bytes)", read, self.buffer.len());
            return Ok(None);
        }

        self.sequence += 1;
        Ok(LumaFrame::from_yuv420(
            &self.buffer,
            self.width,
            self.height,
            Instant::now(),
            self.sequence,
        ))
    }
}

/// `rpicam-vid` subprocess streaming raw YUV420 on stdout.
///
/// The child is killed when this value is dropped.
pub struct RpicamSource {
    child: Child,
    frames: Yuv420Reader<ChildStdout>,
}

impl RpicamSource {
    /// Launch the capture process
    pub fn spawn(config: &CameraConfig) -> Result<Self, CameraError> {
        config.validate()?;

        let mut command = Command::new(&config.command);
        command
            .args(config.capture_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        debug!("Capture command: {:?}", command);

        let mut child = command
            .spawn()
            .map_err(|e| CameraError::Open(format!("{}: {}", config.command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::Open("capture process has no stdout".to_string()))?;

        info!(
            "Camera started: {}x{} @ {}fps ({} bytes/frame)",
            config.width,
            config.height,
            config.fps,
            config.frame_size()
        );

        Ok(Self {
            child,
            frames: Yuv420Reader::new(stdout, config.width, config.height),
        })
    }

    /// Terminate the capture process and reap it.
    ///
    /// Returns the exit status once the child is gone.
    pub async fn shutdown(mut self) -> Option<ExitStatus> {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop capture process: {}", e);
        }
        match self.child.wait().await {
            Ok(status) => {
                info!(
                    "Camera stopped after {} frames ({})",
                    self.frames.frames_read(),
                    status
                );
                Some(status)
            }
            Err(e) => {
                warn!("Failed to reap capture process: {}", e);
                None
            }
        }
    }
}

impl FrameSource for RpicamSource {
    async fn next_frame(&mut self) -> Result<Option<LumaFrame>, CameraError> {
        self.frames.next_frame().await
    }
}
