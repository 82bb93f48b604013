#![deny(missing_docs)]
//! # UBX Aiding Agent
//! Keeps a u-blox receiver's aiding data (almanac, ephemeris, UTC/ionosphere,
//! initial position) collected over a serial link.
//!
//! A [`TransportWorker`] owns the link: it sends queued UBX requests one at
//! a time and fills a [`RingBuffer`] with whatever the receiver answers.
//! A [`PollingController`] requests the full aiding set, scans the buffered
//! bytes for valid frames, records acknowledgments in an [`AidingTracker`]
//! and re-requests whatever is missing.
mod controller;
mod error;
mod queue;
mod ring_buffer;
mod tracker;
mod transport;
pub mod ubx;

pub use controller::{ControllerCfg, CycleReport, DrainStats, PollingController};
pub use error::{AidError, FrameError};
pub use queue::MessageQueue;
pub use ring_buffer::{RingBuffer, RINGBUFFER_SIZE};
pub use tracker::{AckState, AidItem, AidingTracker, SV_COUNT, TRACKED_SLOTS};
pub use transport::{LinkActivity, SerialTransport, Transport, TransportCfg, TransportWorker};
pub use ubx::{MessageKind, UbxFrame, UbxPacket};

/// Delimiter between archived frame batches
pub const DEFAULT_DELIM: [u8; 8] = *b"\r\r\n\n\r\r\n\n";
