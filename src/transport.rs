use std::{
    io::{ErrorKind, Read, Write},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use crate::{AidError, MessageQueue, RingBuffer, UbxPacket};

/// Byte-oriented link to the receiver.
///
/// `read` may return `Ok(0)` when nothing arrived before the timeout;
/// `write` may return fewer bytes than requested, which the worker treats
/// as a failed send.
pub trait Transport: Send {
    /// Read whatever arrived, up to `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AidError>;
    /// Write `data`, returning how many bytes went out
    fn write(&mut self, data: &[u8]) -> Result<usize, AidError>;
}

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` with the given read timeout
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, AidError> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| AidError::Transport(format!("{path}: {e}")))?;
        log::info!("Opened {path} at {baud_rate} baud");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AidError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, AidError> {
        let n = self.port.write(data)?;
        self.port.flush()?;
        Ok(n)
    }
}

#[derive(Debug, Default)]
/// Link counters shared between the transport worker and the controller
pub struct LinkActivity {
    idle_ticks: AtomicU32,
    rx_bytes: AtomicU64,
    tx_frames: AtomicU64,
}

impl LinkActivity {
    /// Consecutive worker ticks that received nothing
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks.load(Ordering::Relaxed)
    }

    /// Bytes received since start
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    /// Frames fully written since start
    pub fn tx_frames(&self) -> u64 {
        self.tx_frames.load(Ordering::Relaxed)
    }

    fn received(&self, n: usize) {
        self.idle_ticks.store(0, Ordering::Relaxed);
        self.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn idle(&self) {
        self.idle_ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn sent(&self) {
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Transport worker pacing
pub struct TransportCfg {
    /// Minimum time between two sends, in milliseconds
    pub send_interval_ms: u64,
    /// Bytes requested from the link per read
    pub read_chunk: usize,
}

impl Default for TransportCfg {
    fn default() -> Self {
        Self {
            send_interval_ms: 200,
            read_chunk: 100,
        }
    }
}

/// Owns the link: sends queued frames one at a time and pushes every
/// received byte into the receive ring buffer.
pub struct TransportWorker<T: Transport> {
    transport: T,
    queue: Arc<MessageQueue<UbxPacket>>,
    rx: Arc<RingBuffer>,
    activity: Arc<LinkActivity>,
    send_interval: Duration,
    last_send: Option<Instant>,
    chunk: Vec<u8>,
}

impl<T: Transport> TransportWorker<T> {
    /// Create a worker over `transport`
    pub fn new(
        transport: T,
        queue: Arc<MessageQueue<UbxPacket>>,
        rx: Arc<RingBuffer>,
        activity: Arc<LinkActivity>,
        cfg: &TransportCfg,
    ) -> Self {
        Self {
            transport,
            queue,
            rx,
            activity,
            send_interval: Duration::from_millis(cfg.send_interval_ms),
            last_send: None,
            chunk: vec![0; cfg.read_chunk.max(1)],
        }
    }

    /// One pass: maybe send the front frame, then read once.
    pub fn tick(&mut self) {
        let paced = self
            .last_send
            .map_or(true, |t| t.elapsed() >= self.send_interval);
        if paced {
            if let Ok(packet) = self.queue.peek_front() {
                self.send(&packet);
                self.last_send = Some(Instant::now());
            }
        }

        match self.transport.read(&mut self.chunk) {
            Ok(0) => self.activity.idle(),
            Ok(n) => {
                self.activity.received(n);
                log::trace!("Received {n} bytes: {:02X?}", &self.chunk[..n]);
                if let Err(e) = self.rx.write(&self.chunk[..n]) {
                    log::warn!("Dropping received bytes: {e}");
                }
            }
            Err(e) => {
                log::warn!("Read failed, treating as no data: {e}");
                self.activity.idle();
            }
        }
    }

    // The frame stays queued unless every byte went out.
    fn send(&mut self, packet: &UbxPacket) {
        match self.transport.write(packet.as_bytes()) {
            Ok(n) if n == packet.len() => {
                let _ = self.queue.pop_front();
                self.activity.sent();
                log::debug!("Sent {n} byte frame, {} left", self.queue.size());
            }
            Ok(n) => log::warn!("Short write ({n}/{} bytes), will retry", packet.len()),
            Err(e) => log::warn!("Write failed, will retry: {e}"),
        }
    }

    /// Tick until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool) {
        log::info!("Transport worker started");
        while running.load(Ordering::Relaxed) {
            self.tick();
        }
        log::info!("Transport worker exiting");
    }
}
