//! Detector process: camera frames in, alarm commands and events out

use actuator_link::{ActuatorLink, Command, LinkError, SerialLink};
use anyhow::Context;
use camera_capture::{CameraError, FrameSource, RpicamSource};
use cloud_sync::{EventBus, EventMessage, TelemetryReporter, DROWSY_TOPIC};
use dms::{DrowsyEvent, MotionDetector};
use tokio::io::AsyncWrite;
use tracing::{error, info, warn};

use crate::settings::EdgeSettings;

/// Error that stops the detector loop
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Camera: {0}")]
    Camera(#[from] CameraError),

    #[error("Serial link: {0}")]
    Link(#[from] LinkError),
}

/// One detector device: frame source, motion detector and its side effects
pub struct DetectorNode<S, W> {
    source: S,
    detector: MotionDetector,
    link: ActuatorLink<W>,
    bus: Option<EventBus>,
    reporter: TelemetryReporter,
}

impl<S: FrameSource, W: AsyncWrite + Unpin> DetectorNode<S, W> {
    pub fn new(
        source: S,
        detector: MotionDetector,
        link: ActuatorLink<W>,
        bus: Option<EventBus>,
        reporter: TelemetryReporter,
    ) -> Self {
        Self {
            source,
            detector,
            link,
            bus,
            reporter,
        }
    }

    /// Process one frame.
    ///
    /// Short or malformed frames are skipped. Returns the event this frame
    /// produced, if any.
    pub async fn step(&mut self) -> Result<Option<DrowsyEvent>, DetectorError> {
        let Some(frame) = self.source.next_frame().await? else {
            return Ok(None);
        };

        let event = self.detector.observe(frame);
        if let Some(event) = &event {
            self.dispatch(event).await?;
        }

        if self.link.poll_ack() {
            info!("ACK received, detector re-armed");
            metrics::counter!("acks_received_total").increment(1);
            self.detector.acknowledge();
        }

        Ok(event)
    }

    /// Process frames until the source or the link fails
    pub async fn run(&mut self) -> Result<(), DetectorError> {
        loop {
            self.step().await?;
        }
    }

    /// Alarm first, then the best-effort channels
    async fn dispatch(&mut self, event: &DrowsyEvent) -> Result<(), DetectorError> {
        metrics::counter!("drowsy_events_total").increment(1);
        self.link.send(Command::Drowsy).await?;
        info!("Alarm command sent (event #{})", event.sequence);

        if let Some(bus) = &self.bus {
            if let Err(e) = bus.publish(DROWSY_TOPIC, &EventMessage::drowsy()) {
                warn!("Failed to publish drowsy event: {}", e);
            }
        }

        if self.reporter.is_enabled() {
            let reporter = self.reporter.clone();
            let (count, score) = (event.sequence, event.score);
            tokio::spawn(async move {
                reporter.report(count, score).await;
            });
        }
        Ok(())
    }

    pub fn detector(&self) -> &MotionDetector {
        &self.detector
    }

    /// Close the link and the bus; hands back the frame source for its own shutdown
    pub async fn shutdown(self) -> S {
        self.link.close().await;
        if let Some(bus) = self.bus {
            bus.disconnect().await;
        }
        self.source
    }
}

/// Wire up the detector from settings and run it until failure or Ctrl+C
pub async fn run_detector(settings: EdgeSettings) -> anyhow::Result<()> {
    let detector = MotionDetector::new(settings.detector.clone())?;
    let reporter = TelemetryReporter::new(&settings.telemetry)?;

    let link = SerialLink::open(&settings.serial)
        .await
        .context("Serial link unavailable")?;
    let source = RpicamSource::spawn(&settings.camera).context("Camera unavailable")?;
    let bus = settings
        .bus
        .enabled
        .then(|| EventBus::connect(&settings.bus, &settings.detector.device_id));

    info!(
        "Detector running (threshold {:.1}, {:.1}s of stillness)",
        settings.detector.motion_threshold, settings.detector.drowsy_time_secs
    );

    let mut node = DetectorNode::new(source, detector, link, bus, reporter);
    let outcome = tokio::select! {
        result = node.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Stopped by user");
            Ok(())
        }
    };

    let events = node.detector().events_emitted();
    let source = node.shutdown().await;
    source.shutdown().await;
    info!("Detector stopped after {} drowsy events", events);

    if let Err(e) = &outcome {
        error!("Detector failed: {}", e);
    }
    outcome?;
    Ok(())
}
