use thiserror::Error;

use crate::ubx::MessageKind;

#[derive(Error, Debug)]
/// Errors raised by the aiding engine
pub enum AidError {
    /// The serial link could not be opened, read or written
    #[error("Transport error: {0}")]
    Transport(String),
    /// An I/O error on the serial link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A ring buffer write did not fit in the free space
    #[error("Buffer full: {requested} bytes requested, {free} free")]
    BufferFull {
        /// Bytes the caller tried to write
        requested: usize,
        /// Bytes available at the time of the call
        free: usize,
    },
    /// A ring buffer read asked for more than is buffered
    #[error("Buffer underflow: {requested} bytes requested, {fill} buffered")]
    BufferUnderflow {
        /// Bytes the caller tried to read
        requested: usize,
        /// Bytes buffered at the time of the call
        fill: usize,
    },
    /// The message queue holds no frames
    #[error("Queue is empty")]
    QueueEmpty,
    /// An acknowledgment named a satellite outside the tracked range
    #[error("{kind:?} acknowledgment for SV {svid} is out of range")]
    SvidOutOfRange {
        /// Message that carried the SV id
        kind: MessageKind,
        /// Offending SV id
        svid: u8,
    },
    /// A per-satellite acknowledgment carried no payload
    #[error("{0:?} acknowledgment carries no SV id")]
    MissingSvid(MessageKind),
    /// A payload does not fit in the 16-bit length field
    #[error("Payload of {0} bytes does not fit in a UBX frame")]
    PayloadTooLarge(usize),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Reasons a byte span does not start with a valid UBX frame
pub enum FrameError {
    /// The span does not start with the UBX sync bytes
    #[error("Invalid sync bytes")]
    Sync,
    /// The declared frame runs past the bytes available
    #[error("Incomplete frame: need {needed} bytes, have {available}")]
    Incomplete {
        /// Total frame length declared by the header
        needed: usize,
        /// Bytes available in the span
        available: usize,
    },
    /// The trailing checksum does not match the frame contents
    #[error("Invalid checksum: expected {expected:02X?}, found {found:02X?}")]
    Checksum {
        /// Checksum computed over class..payload
        expected: [u8; 2],
        /// Checksum carried by the frame
        found: [u8; 2],
    },
    /// The declared frame length can never fit in the scan window
    #[error("Declared frame length {0} exceeds the scan window")]
    Oversized(usize),
}

impl FrameError {
    /// Whether the scanner should drop one byte and try again.
    ///
    /// Only an incomplete frame waits for more data; every other failure
    /// resynchronizes one byte later, so a real frame hiding behind a
    /// corrupt header is still found.
    pub fn skip(&self) -> bool {
        !matches!(self, FrameError::Incomplete { .. })
    }
}
