use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};

use crate::{
    ubx::{MessageKind, UbxFrame, UbxPacket},
    AidError,
};

/// Number of tracked satellites per almanac/ephemeris table (SV 0 - 31)
pub const SV_COUNT: usize = 32;
/// Singleton acknowledgments: INI, HUI and POSLLH
pub const SINGLETON_COUNT: usize = 3;
/// Every tracked acknowledgment slot
pub const TRACKED_SLOTS: usize = SINGLETON_COUNT + 2 * SV_COUNT;

#[bitfield(u8)]
#[derive(PartialEq, Eq, Serialize, Deserialize)]
/// Acknowledgment bits for the messages that are not per-satellite
pub(crate) struct SingletonAcks {
    /// AID-INI received
    pub ini: bool,
    /// AID-HUI received
    pub hui: bool,
    /// NAV-POSLLH received
    pub posllh: bool,
    #[bits(5)]
    __: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Which aiding messages have been received in the current cycle
pub struct AckState {
    singles: SingletonAcks,
    alm: [bool; SV_COUNT],
    eph: [bool; SV_COUNT],
}

impl Default for AckState {
    fn default() -> Self {
        Self {
            singles: SingletonAcks::new(),
            alm: [false; SV_COUNT],
            eph: [false; SV_COUNT],
        }
    }
}

impl AckState {
    /// AID-INI acknowledged
    pub fn ini_ack(&self) -> bool {
        self.singles.ini()
    }

    /// AID-HUI acknowledged
    pub fn hui_ack(&self) -> bool {
        self.singles.hui()
    }

    /// NAV-POSLLH acknowledged
    pub fn posllh_ack(&self) -> bool {
        self.singles.posllh()
    }

    /// Almanac acknowledgments indexed by SV id
    pub fn alm_ack(&self) -> &[bool; SV_COUNT] {
        &self.alm
    }

    /// Ephemeris acknowledgments indexed by SV id
    pub fn eph_ack(&self) -> &[bool; SV_COUNT] {
        &self.eph
    }

    fn is_acked(&self, item: AidItem) -> bool {
        match item {
            AidItem::Ini => self.ini_ack(),
            AidItem::Hui => self.hui_ack(),
            AidItem::Posllh => self.posllh_ack(),
            AidItem::Almanac(sv) => self.alm[sv as usize],
            AidItem::Ephemeris(sv) => self.eph[sv as usize],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// A single trackable aiding item
pub enum AidItem {
    /// Initial position and time
    Ini,
    /// Health, UTC and ionosphere
    Hui,
    /// Position fix
    Posllh,
    /// Almanac of one SV
    Almanac(u8),
    /// Ephemeris of one SV
    Ephemeris(u8),
}

impl AidItem {
    /// Every tracked item in request order: INI, HUI, POSLLH, ALM 0..31, EPH 0..31
    pub fn all() -> impl Iterator<Item = AidItem> {
        let svs = 0..SV_COUNT as u8;
        [AidItem::Ini, AidItem::Hui, AidItem::Posllh]
            .into_iter()
            .chain(svs.clone().map(AidItem::Almanac))
            .chain(svs.map(AidItem::Ephemeris))
    }

    /// The poll request that asks the receiver for this item
    pub fn request(self) -> UbxPacket {
        match self {
            AidItem::Ini => UbxPacket::poll(MessageKind::AidIni),
            AidItem::Hui => UbxPacket::poll(MessageKind::AidHui),
            AidItem::Posllh => UbxPacket::poll(MessageKind::NavPosllh),
            AidItem::Almanac(sv) => UbxPacket::poll_sv(MessageKind::AidAlm, sv),
            AidItem::Ephemeris(sv) => UbxPacket::poll_sv(MessageKind::AidEph, sv),
        }
    }
}

#[derive(Debug, Default, Clone)]
/// Tracks which aiding messages have arrived and builds re-requests for
/// the rest.
///
/// Only presence matters: acknowledgments may arrive in any order and
/// any number of times.
pub struct AidingTracker {
    state: AckState,
}

impl AidingTracker {
    /// Create a tracker with nothing acknowledged
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every acknowledgment, called at the start of each aiding cycle
    pub fn reset(&mut self) {
        self.state = AckState::default();
    }

    /// Current acknowledgment state
    pub fn acks(&self) -> &AckState {
        &self.state
    }

    /// Record the acknowledgment carried by a decoded frame.
    ///
    /// Returns the item acknowledged, or `None` for frames that are not
    /// tracked. An ALM/EPH frame naming an SV outside 0..32 leaves the
    /// state untouched and is reported as [`AidError::SvidOutOfRange`].
    pub fn record(&mut self, frame: &UbxFrame<'_>) -> Result<Option<AidItem>, AidError> {
        let Some(kind) = frame.kind() else {
            log::trace!(
                "Ignoring UBX {:02X}-{:02X}",
                frame.class(),
                frame.id()
            );
            return Ok(None);
        };
        let item = match kind {
            MessageKind::AidIni => AidItem::Ini,
            MessageKind::AidHui => AidItem::Hui,
            MessageKind::NavPosllh => AidItem::Posllh,
            MessageKind::AidAlm | MessageKind::AidEph => {
                let svid = *frame.payload().first().ok_or(AidError::MissingSvid(kind))?;
                if svid as usize >= SV_COUNT {
                    log::warn!("Discarding {kind:?} acknowledgment for out of range SV {svid}");
                    return Err(AidError::SvidOutOfRange { kind, svid });
                }
                if kind == MessageKind::AidAlm {
                    AidItem::Almanac(svid)
                } else {
                    AidItem::Ephemeris(svid)
                }
            }
            MessageKind::CfgMsg => return Ok(None),
        };
        match item {
            AidItem::Ini => self.state.singles.set_ini(true),
            AidItem::Hui => self.state.singles.set_hui(true),
            AidItem::Posllh => self.state.singles.set_posllh(true),
            AidItem::Almanac(sv) => self.state.alm[sv as usize] = true,
            AidItem::Ephemeris(sv) => self.state.eph[sv as usize] = true,
        }
        log::debug!("{item:?} acknowledged");
        Ok(Some(item))
    }

    /// Items not yet acknowledged, in request order
    pub fn missing_items(&self) -> Vec<AidItem> {
        AidItem::all()
            .filter(|&item| !self.state.is_acked(item))
            .collect()
    }

    /// Number of tracked slots not yet acknowledged
    pub fn missing_count(&self) -> usize {
        AidItem::all()
            .filter(|&item| !self.state.is_acked(item))
            .count()
    }

    /// Whether every tracked slot has been acknowledged
    pub fn is_complete(&self) -> bool {
        self.missing_count() == 0
    }

    /// One poll request per missing item, in request order
    pub fn build_missing_batch(&self) -> Vec<UbxPacket> {
        self.missing_items()
            .into_iter()
            .map(AidItem::request)
            .collect()
    }

    /// Log every missing item and return how many there are
    pub fn log_missing(&self) -> usize {
        let missing = self.missing_items();
        for item in &missing {
            match item {
                AidItem::Almanac(sv) => log::warn!("Missing almanac SV {sv}"),
                AidItem::Ephemeris(sv) => log::warn!("Missing ephemeris SV {sv}"),
                AidItem::Ini => log::warn!("Missing INI"),
                AidItem::Hui => log::warn!("Missing HUI"),
                AidItem::Posllh => log::warn!("Missing POSLLH"),
            }
        }
        missing.len()
    }
}
