//! Serial link to the alarm microcontroller
//!
//! Writes go straight to the port. Reads happen on a background task that
//! splits the byte stream into lines and queues them, so the owner can poll
//! for an `ACK` without ever blocking.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

use crate::error::LinkError;
use crate::protocol::{Command, LinkMessage};
use crate::SerialConfig;

/// Inbound line queue depth
const INBOUND_CAPACITY: usize = 32;

/// Link over a real serial port
pub type SerialLink = ActuatorLink<WriteHalf<SerialStream>>;

/// Ordered request/ack channel to the microcontroller
pub struct ActuatorLink<W> {
    /// Port name, for logs
    name: String,
    writer: W,
    inbound: mpsc::Receiver<LinkMessage>,
    reader: JoinHandle<()>,
    /// Whether the line reader is still delivering
    open: bool,
}

impl SerialLink {
    /// Open the serial port and wait for the board to come out of reset
    pub async fn open(config: &SerialConfig) -> Result<Self, LinkError> {
        info!(
            "Opening serial link on {} @ {} baud",
            config.port, config.baud_rate
        );

        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|e| LinkError::Open {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = tokio::io::split(stream);
        let link = Self::from_parts(config.port.clone(), reader, writer);

        if config.settle_ms > 0 {
            debug!("Waiting {}ms for the board to reset", config.settle_ms);
            tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;
        }

        info!("Serial connected on {}", config.port);
        Ok(link)
    }
}

impl<W: AsyncWrite + Unpin> ActuatorLink<W> {
    /// Build a link from an already-open byte stream
    pub fn from_parts<R>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let name = name.into();
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_lines(name.clone(), reader, tx));

        Self {
            name,
            writer,
            inbound,
            reader,
            open: true,
        }
    }

    /// Send a command line
    pub async fn send(&mut self, command: Command) -> Result<(), LinkError> {
        self.writer.write_all(command.as_line()).await?;
        self.writer.flush().await?;
        debug!("Sent {:?} on {}", command, self.name);
        Ok(())
    }

    /// Drain every line received so far without waiting.
    ///
    /// Returns `true` if any of them was an `ACK`.
    pub fn poll_ack(&mut self) -> bool {
        let mut acked = false;
        loop {
            match self.inbound.try_recv() {
                Ok(LinkMessage::Ack) => acked = true,
                Ok(LinkMessage::Other(line)) => trace!("Ignoring line from {}: {:?}", self.name, line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.mark_closed();
                    break;
                }
            }
        }
        acked
    }

    /// Wait for the next line. `None` once the link is closed.
    pub async fn recv(&mut self) -> Option<LinkMessage> {
        let message = self.inbound.recv().await;
        if message.is_none() {
            self.mark_closed();
        }
        message
    }

    /// Whether lines are still being delivered
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Flush pending output and stop the reader
    pub async fn close(mut self) {
        if let Err(e) = self.writer.flush().await {
            warn!("Flush on {} failed: {}", self.name, e);
        }
        self.reader.abort();
        info!("Serial connection {} closed", self.name);
    }

    fn mark_closed(&mut self) {
        if self.open {
            warn!("Serial reader on {} stopped; no further acknowledgements", self.name);
            self.open = false;
        }
    }
}

impl<W> Drop for ActuatorLink<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Split the inbound byte stream into lines until EOF, error, or the link is dropped
async fn read_lines<R>(name: String, reader: R, tx: mpsc::Sender<LinkMessage>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(64);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Serial stream {} reached EOF", name);
                break;
            }
            Ok(_) => {
                let Some(message) = LinkMessage::parse(&buf) else {
                    continue;
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Serial read on {} failed: {}", name, e);
                break;
            }
        }
    }
}
