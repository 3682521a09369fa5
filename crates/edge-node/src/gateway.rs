//! Gateway process: drowsy events from the bus in, alarm commands out
//!
//! A single task owns the aggregator and the serial link. Bus deliveries
//! and serial lines are both handled inside one `select!`, so event
//! handling, acknowledgement and the alarm write never interleave.

use std::time::Instant;

use actuator_link::{ActuatorLink, Command, LinkError, LinkMessage, SerialLink};
use alerting::{AlarmState, Aggregator};
use anyhow::Context;
use chrono::Utc;
use cloud_sync::{decode_drowsy, Delivery, EventBus, EventMessage, ACK_TOPIC, DROWSY_TOPIC};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::settings::EdgeSettings;

/// Client id role for the gateway
const ROLE: &str = "gateway";

/// Error that stops the gateway loop
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Serial link: {0}")]
    Link(#[from] LinkError),

    #[error("Serial link closed")]
    LinkClosed,

    #[error("Event bus delivery stopped")]
    BusClosed,
}

/// What one iteration of the gateway loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStep {
    /// Drowsy event recorded; `true` if it raised the alarm
    Event { alarm_raised: bool },
    /// Delivery that is not a drowsy event
    Discarded,
    /// `ACK` line; `true` if it cleared an active alarm
    Ack { cleared: bool },
    /// Any other serial line
    Ignored,
}

enum Input {
    Delivery(Option<Delivery>),
    Line(Option<LinkMessage>),
}

/// Aggregator plus the side effects of its transitions
pub struct Gateway<W> {
    aggregator: Aggregator,
    link: ActuatorLink<W>,
    bus: Option<EventBus>,
}

impl<W: AsyncWrite + Unpin> Gateway<W> {
    pub fn new(aggregator: Aggregator, link: ActuatorLink<W>, bus: Option<EventBus>) -> Self {
        Self {
            aggregator,
            link,
            bus,
        }
    }

    /// Wait for the next delivery or serial line and handle it
    pub async fn step(
        &mut self,
        deliveries: &mut mpsc::Receiver<Delivery>,
    ) -> Result<GatewayStep, GatewayError> {
        let input = tokio::select! {
            delivery = deliveries.recv() => Input::Delivery(delivery),
            line = self.link.recv() => Input::Line(line),
        };

        match input {
            Input::Delivery(Some(delivery)) => self.handle_delivery(&delivery, Instant::now()).await,
            Input::Delivery(None) => Err(GatewayError::BusClosed),
            Input::Line(Some(LinkMessage::Ack)) => Ok(GatewayStep::Ack {
                cleared: self.handle_ack().await,
            }),
            Input::Line(Some(LinkMessage::Other(line))) => {
                trace!("Ignoring serial line {:?}", line);
                Ok(GatewayStep::Ignored)
            }
            Input::Line(None) => Err(GatewayError::LinkClosed),
        }
    }

    /// Handle deliveries and serial lines until one of the channels fails
    pub async fn run(
        &mut self,
        deliveries: &mut mpsc::Receiver<Delivery>,
    ) -> Result<(), GatewayError> {
        loop {
            self.step(deliveries).await?;
        }
    }

    async fn handle_delivery(
        &mut self,
        delivery: &Delivery,
        at: Instant,
    ) -> Result<GatewayStep, GatewayError> {
        if decode_drowsy(&delivery.topic, &delivery.payload).is_none() {
            debug!("Discarding message on {}", delivery.topic);
            metrics::counter!("bus_messages_discarded_total").increment(1);
            return Ok(GatewayStep::Discarded);
        }

        metrics::counter!("bus_events_total").increment(1);
        let Some(raised) = self.aggregator.on_event(at) else {
            return Ok(GatewayStep::Event {
                alarm_raised: false,
            });
        };

        metrics::counter!("alarms_raised_total").increment(1);
        self.link.send(Command::Drowsy).await?;
        info!(
            "ALARM: {} drowsy events in window, alarm command sent",
            raised.events_in_window
        );
        Ok(GatewayStep::Event { alarm_raised: true })
    }

    async fn handle_ack(&mut self) -> bool {
        let Some(record) = self.aggregator.on_ack(Utc::now()) else {
            return false;
        };

        metrics::counter!("alarms_acknowledged_total").increment(1);
        info!("Alarm acknowledged at {}", record.timestamp);
        if let Some(bus) = &self.bus {
            if let Err(e) = bus.publish(ACK_TOPIC, &EventMessage::ack(record.timestamp)) {
                warn!("Failed to publish ack record: {}", e);
            }
        }
        true
    }

    pub fn state(&self) -> AlarmState {
        self.aggregator.state()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Close the link and the bus
    pub async fn shutdown(self) {
        self.link.close().await;
        if let Some(bus) = self.bus {
            bus.disconnect().await;
        }
    }
}

/// Wire up the gateway from settings and run it until failure or Ctrl+C
pub async fn run_gateway(settings: EdgeSettings) -> anyhow::Result<()> {
    if !settings.bus.enabled {
        anyhow::bail!("The gateway needs the event bus; set bus.enabled = true");
    }

    let link = SerialLink::open(&settings.serial)
        .await
        .context("Serial link unavailable")?;
    let (bus, mut deliveries) = EventBus::subscribe(&settings.bus, ROLE, DROWSY_TOPIC);
    let aggregator = Aggregator::new(settings.aggregator.clone());

    info!("Gateway running, waiting for drowsy events");

    let mut gateway = Gateway::new(aggregator, link, Some(bus));
    let outcome = tokio::select! {
        result = gateway.run(&mut deliveries) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Stopped by user");
            Ok(())
        }
    };

    info!(
        "Gateway stopped in state {} ({} alarms, {} acknowledged)",
        gateway.state(),
        gateway.aggregator().alarms_raised(),
        gateway.aggregator().acknowledgements()
    );
    gateway.shutdown().await;

    if let Err(e) = &outcome {
        error!("Gateway failed: {}", e);
    }
    outcome?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    struct Harness {
        gateway: Gateway<WriteHalf<DuplexStream>>,
        deliveries: mpsc::Receiver<Delivery>,
        bus: mpsc::Sender<Delivery>,
        device_rx: BufReader<ReadHalf<DuplexStream>>,
        device_tx: WriteHalf<DuplexStream>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_bus(None)
        }

        fn with_bus(bus: Option<EventBus>) -> Self {
            let (host, device) = tokio::io::duplex(256);
            let (host_rx, host_tx) = tokio::io::split(host);
            let (device_rx, device_tx) = tokio::io::split(device);
            let link = ActuatorLink::from_parts("test", host_rx, host_tx);
            let (queue, deliveries) = mpsc::channel(16);

            Self {
                gateway: Gateway::new(Aggregator::default(), link, bus),
                deliveries,
                bus: queue,
                device_rx: BufReader::new(device_rx),
                device_tx,
            }
        }

        async fn deliver(&mut self, topic: &str, payload: &[u8]) -> GatewayStep {
            self.bus
                .send(Delivery {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                })
                .await
                .unwrap();
            self.gateway.step(&mut self.deliveries).await.unwrap()
        }

        async fn drowsy(&mut self) -> GatewayStep {
            self.deliver(DROWSY_TOPIC, br#"{"event": "drowsy"}"#).await
        }

        async fn press_button(&mut self) -> GatewayStep {
            self.device_tx.write_all(b"ACK\n").await.unwrap();
            self.device_tx.flush().await.unwrap();
            self.gateway.step(&mut self.deliveries).await.unwrap()
        }

        async fn read_command(&mut self) -> String {
            let mut line = String::new();
            tokio::time::timeout(Duration::from_secs(1), self.device_rx.read_line(&mut line))
                .await
                .unwrap()
                .unwrap();
            line
        }
    }

    #[tokio::test]
    async fn test_third_event_raises_alarm() {
        let mut h = Harness::new();

        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: false });
        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: false });
        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: true });
        assert_eq!(h.gateway.state(), AlarmState::AlarmActive);
        assert_eq!(h.read_command().await, "DROWSY\n");

        // more events while active send nothing further
        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: false });
        assert_eq!(h.gateway.aggregator().alarms_raised(), 1);
    }

    #[tokio::test]
    async fn test_ack_clears_alarm() {
        let mut h = Harness::new();
        for _ in 0..4 {
            h.drowsy().await;
        }
        assert_eq!(h.read_command().await, "DROWSY\n");

        assert_eq!(h.press_button().await, GatewayStep::Ack { cleared: true });
        assert_eq!(h.gateway.state(), AlarmState::Normal);
        assert_eq!(h.gateway.aggregator().window_len(), 0);

        // a second press is a no-op
        assert_eq!(h.press_button().await, GatewayStep::Ack { cleared: false });

        // window starts empty again
        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: false });
        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: false });
        assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: true });
        assert_eq!(h.read_command().await, "DROWSY\n");
    }

    #[tokio::test]
    async fn test_ack_while_normal_is_ignored() {
        let mut h = Harness::new();
        h.drowsy().await;
        assert_eq!(h.press_button().await, GatewayStep::Ack { cleared: false });
        assert_eq!(h.gateway.aggregator().window_len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_discarded() {
        let mut h = Harness::new();
        assert_eq!(h.deliver(DROWSY_TOPIC, b"not json").await, GatewayStep::Discarded);
        assert_eq!(
            h.deliver(DROWSY_TOPIC, br#"{"event": "awake"}"#).await,
            GatewayStep::Discarded
        );
        assert_eq!(
            h.deliver(ACK_TOPIC, br#"{"event": "drowsy"}"#).await,
            GatewayStep::Discarded
        );
        assert_eq!(h.gateway.aggregator().window_len(), 0);
        assert_eq!(h.gateway.state(), AlarmState::Normal);
    }

    #[tokio::test]
    async fn test_other_serial_lines_ignored() {
        let mut h = Harness::new();
        h.device_tx.write_all(b"READY\n").await.unwrap();
        assert_eq!(
            h.gateway.step(&mut h.deliveries).await.unwrap(),
            GatewayStep::Ignored
        );
    }

    #[tokio::test]
    async fn test_closed_bus_stops_loop() {
        let mut h = Harness::new();
        drop(h.bus);
        let result = h.gateway.run(&mut h.deliveries).await;
        assert!(matches!(result, Err(GatewayError::BusClosed)));
    }

    #[tokio::test]
    async fn test_offline_broker_never_stalls_gateway() {
        let config = cloud_sync::BusConfig {
            broker_url: "127.0.0.1".to_string(),
            broker_port: 1,
            ..Default::default()
        };
        let mut h = Harness::with_bus(Some(EventBus::connect(&config, ROLE)));

        // every ack publishes a record the broker never takes
        for _ in 0..15 {
            h.drowsy().await;
            h.drowsy().await;
            assert_eq!(h.drowsy().await, GatewayStep::Event { alarm_raised: true });
            assert_eq!(h.read_command().await, "DROWSY\n");
            let step = tokio::time::timeout(Duration::from_secs(1), h.press_button())
                .await
                .unwrap();
            assert_eq!(step, GatewayStep::Ack { cleared: true });
        }
        assert_eq!(h.gateway.aggregator().acknowledgements(), 15);

        let stopped = tokio::time::timeout(Duration::from_secs(5), h.gateway.shutdown()).await;
        assert!(stopped.is_ok());
    }
}
