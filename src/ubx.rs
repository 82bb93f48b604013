//! UBX frame encoding and scanning for the aiding subset of the protocol.
//!
//! A frame on the wire is laid out as
//! `sync0 sync1 class id len_lo len_hi payload.. ck_a ck_b`, with the
//! checksum running over everything from `class` to the end of the payload.
use serde::{Deserialize, Serialize};

use crate::{AidError, FrameError};

/// First sync byte of every UBX frame
pub const UBX_SYNC0: u8 = 0xB5;
/// Second sync byte of every UBX frame
pub const UBX_SYNC1: u8 = 0x62;
/// Sync, class, id and length bytes
pub const UBX_HEADER_SIZE: usize = 6;
/// Trailing checksum bytes
pub const UBX_CHECKSUM_SIZE: usize = 2;

/// Navigation results class
pub const UBX_CLASS_NAV: u8 = 0x01;
/// Configuration class
pub const UBX_CLASS_CFG: u8 = 0x06;
/// Assist-now aiding class
pub const UBX_CLASS_AID: u8 = 0x0B;
/// Standard NMEA sentences, as addressed by CFG-MSG
pub const NMEA_CLASS_STD: u8 = 0xF0;

/// NAV-POSLLH message id
pub const UBX_NAV_POSLLH: u8 = 0x02;
/// CFG-MSG message id
pub const UBX_CFG_MSG: u8 = 0x01;
/// AID-INI message id
pub const UBX_AID_INI: u8 = 0x01;
/// AID-HUI message id
pub const UBX_AID_HUI: u8 = 0x02;
/// AID-ALM message id
pub const UBX_AID_ALM: u8 = 0x30;
/// AID-EPH message id
pub const UBX_AID_EPH: u8 = 0x31;

/// NMEA sentences switched off before aiding: GGA, GLL, GSA, GSV, RMC,
/// VTG and ZDA.
pub const NMEA_SILENCED_IDS: [u8; 7] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x08];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// The UBX messages this agent sends or tracks
pub enum MessageKind {
    /// Initial position and time (AID-INI)
    AidIni,
    /// GPS health, UTC and ionosphere parameters (AID-HUI)
    AidHui,
    /// Almanac (AID-ALM)
    AidAlm,
    /// Ephemeris (AID-EPH)
    AidEph,
    /// Geodetic position solution (NAV-POSLLH)
    NavPosllh,
    /// Message rate configuration (CFG-MSG), never acknowledged
    CfgMsg,
}

impl MessageKind {
    /// Class and id bytes of the message
    pub fn class_id(self) -> (u8, u8) {
        match self {
            MessageKind::AidIni => (UBX_CLASS_AID, UBX_AID_INI),
            MessageKind::AidHui => (UBX_CLASS_AID, UBX_AID_HUI),
            MessageKind::AidAlm => (UBX_CLASS_AID, UBX_AID_ALM),
            MessageKind::AidEph => (UBX_CLASS_AID, UBX_AID_EPH),
            MessageKind::NavPosllh => (UBX_CLASS_NAV, UBX_NAV_POSLLH),
            MessageKind::CfgMsg => (UBX_CLASS_CFG, UBX_CFG_MSG),
        }
    }

    /// Look up a message by its class and id bytes
    pub fn from_class_id(class: u8, id: u8) -> Option<Self> {
        match (class, id) {
            (UBX_CLASS_AID, UBX_AID_INI) => Some(MessageKind::AidIni),
            (UBX_CLASS_AID, UBX_AID_HUI) => Some(MessageKind::AidHui),
            (UBX_CLASS_AID, UBX_AID_ALM) => Some(MessageKind::AidAlm),
            (UBX_CLASS_AID, UBX_AID_EPH) => Some(MessageKind::AidEph),
            (UBX_CLASS_NAV, UBX_NAV_POSLLH) => Some(MessageKind::NavPosllh),
            (UBX_CLASS_CFG, UBX_CFG_MSG) => Some(MessageKind::CfgMsg),
            _ => None,
        }
    }
}

/// Two-accumulator UBX checksum over `data`
pub fn checksum(data: &[u8]) -> [u8; 2] {
    data.iter().fold([0u8; 2], |[ck0, ck1], &b| {
        let ck0 = ck0.wrapping_add(b);
        [ck0, ck1.wrapping_add(ck0)]
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An encoded UBX frame that owns its bytes, ready to be queued and sent
pub struct UbxPacket(Vec<u8>);

impl UbxPacket {
    /// Encode a frame with the given class, id and payload.
    pub fn new(class: u8, id: u8, payload: &[u8]) -> Result<Self, AidError> {
        let len = u16::try_from(payload.len()).map_err(|_| AidError::PayloadTooLarge(payload.len()))?;
        Ok(Self::encode(class, id, len, payload))
    }

    fn encode(class: u8, id: u8, len: u16, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(UBX_HEADER_SIZE + payload.len() + UBX_CHECKSUM_SIZE);
        bytes.extend_from_slice(&[UBX_SYNC0, UBX_SYNC1, class, id]);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(payload);
        let ck = checksum(&bytes[2..]);
        bytes.extend_from_slice(&ck);
        UbxPacket(bytes)
    }

    fn with_kind<const N: usize>(kind: MessageKind, payload: [u8; N]) -> Self {
        let (class, id) = kind.class_id();
        Self::encode(class, id, N as u16, &payload)
    }

    /// Poll request for a whole message (every SV for ALM/EPH)
    pub fn poll(kind: MessageKind) -> Self {
        Self::with_kind(kind, [])
    }

    /// Poll request for a single satellite's ALM/EPH data
    pub fn poll_sv(kind: MessageKind, svid: u8) -> Self {
        Self::with_kind(kind, [svid])
    }

    /// CFG-MSG command setting the rate of an NMEA sentence to zero
    pub fn disable_nmea(nmea_id: u8) -> Self {
        Self::with_kind(MessageKind::CfgMsg, [NMEA_CLASS_STD, nmea_id, 0x00])
    }

    /// The raw bytes to put on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Total frame length on the wire
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, an encoded frame holds at least its header and checksum
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// View the packet as a decoded frame
    pub fn frame(&self) -> UbxFrame<'_> {
        UbxFrame { bytes: &self.0 }
    }
}

impl AsRef<[u8]> for UbxPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// One CFG-MSG command per silenced NMEA sentence, in a fixed order
pub fn nmea_silence_batch() -> Vec<UbxPacket> {
    NMEA_SILENCED_IDS
        .iter()
        .map(|&id| UbxPacket::disable_nmea(id))
        .collect()
}

/// Whole-constellation poll for every aiding item: HUI, INI, ALM, EPH, POSLLH
pub fn full_aiding_batch() -> Vec<UbxPacket> {
    [
        MessageKind::AidHui,
        MessageKind::AidIni,
        MessageKind::AidAlm,
        MessageKind::AidEph,
        MessageKind::NavPosllh,
    ]
    .into_iter()
    .map(UbxPacket::poll)
    .collect()
}

/// Check whether `buf` starts with a valid frame and return its length.
///
/// On [`FrameError::Incomplete`] the caller should wait for more bytes;
/// on any other error it should advance a single byte and scan again.
pub fn scan_next(buf: &[u8]) -> Result<usize, FrameError> {
    let sync = [UBX_SYNC0, UBX_SYNC1];
    let head = buf.len().min(2);
    if buf[..head] != sync[..head] {
        return Err(FrameError::Sync);
    }
    if buf.len() < UBX_HEADER_SIZE {
        return Err(FrameError::Incomplete {
            needed: UBX_HEADER_SIZE + UBX_CHECKSUM_SIZE,
            available: buf.len(),
        });
    }
    let payload_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
    let total = UBX_HEADER_SIZE + payload_len + UBX_CHECKSUM_SIZE;
    if buf.len() < total {
        return Err(FrameError::Incomplete {
            needed: total,
            available: buf.len(),
        });
    }
    let body_end = UBX_HEADER_SIZE + payload_len;
    let expected = checksum(&buf[2..body_end]);
    let found = [buf[body_end], buf[body_end + 1]];
    if expected != found {
        return Err(FrameError::Checksum { expected, found });
    }
    Ok(total)
}

/// Like [`scan_next`], but a header declaring a frame longer than
/// `window` is rejected as [`FrameError::Oversized`] instead of waiting
/// for bytes that can never arrive in one scan.
pub fn scan_next_within(buf: &[u8], window: usize) -> Result<usize, FrameError> {
    match scan_next(buf) {
        Err(FrameError::Incomplete { needed, .. }) if needed > window => {
            Err(FrameError::Oversized(needed))
        }
        res => res,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A validated frame borrowed from a byte stream
pub struct UbxFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> UbxFrame<'a> {
    /// Validate the frame at the start of `buf`
    pub fn parse(buf: &'a [u8]) -> Result<Self, FrameError> {
        let len = scan_next(buf)?;
        Ok(UbxFrame { bytes: &buf[..len] })
    }

    /// Validate the frame at the start of `buf`, see [`scan_next_within`]
    pub fn parse_within(buf: &'a [u8], window: usize) -> Result<Self, FrameError> {
        let len = scan_next_within(buf, window)?;
        Ok(UbxFrame { bytes: &buf[..len] })
    }

    /// Message class byte
    pub fn class(&self) -> u8 {
        self.bytes[2]
    }

    /// Message id byte
    pub fn id(&self) -> u8 {
        self.bytes[3]
    }

    /// Declared payload length
    pub fn payload_len(&self) -> u16 {
        u16::from_le_bytes([self.bytes[4], self.bytes[5]])
    }

    /// Payload bytes
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[UBX_HEADER_SIZE..self.bytes.len() - UBX_CHECKSUM_SIZE]
    }

    /// Trailing checksum bytes
    pub fn checksum(&self) -> [u8; 2] {
        let n = self.bytes.len();
        [self.bytes[n - 2], self.bytes[n - 1]]
    }

    /// The tracked message this frame carries, if any
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_class_id(self.class(), self.id())
    }

    /// The whole frame, sync bytes to checksum
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Total frame length on the wire
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a parsed frame
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
