//! The aiding cycle.
//!
//! Scheduling is coarse on purpose: the controller sleeps and polls the
//! send queue size instead of waiting on a signal, since the receiver
//! works on a scale of seconds. Every interval is part of
//! [`ControllerCfg`].
use std::{
    ops::AddAssign,
    sync::Arc,
    thread,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    tracker::{AckState, AidItem, AidingTracker},
    transport::LinkActivity,
    ubx::{full_aiding_batch, nmea_silence_batch, UbxFrame, UbxPacket},
    AidError, FrameError, MessageQueue, RingBuffer,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Cadence and sizing of the polling controller
pub struct ControllerCfg {
    /// Interval between two checks of the send queue, in milliseconds
    pub drain_poll_ms: u64,
    /// Time allowed for answers after the last request went out, in milliseconds
    pub response_settle_ms: u64,
    /// Sleep between two full aiding cycles, in seconds
    pub cycle_interval_secs: u64,
    /// Re-request rounds for missing items per cycle
    pub retry_rounds: u8,
    /// How many times the NMEA silence batch is sent before giving up
    pub silence_attempts: u8,
    /// Observation window for link silence, in milliseconds
    pub silence_window_ms: u64,
    /// Empty reads in a row required, on top of a byte-free window, before
    /// the link counts as silent
    pub silence_idle_ticks: u32,
    /// Scan window for received bytes, defaults to the receive buffer capacity
    pub scratch_capacity: Option<usize>,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            drain_poll_ms: 2000,
            response_settle_ms: 2000,
            cycle_interval_secs: 20,
            retry_rounds: 3,
            silence_attempts: 3,
            silence_window_ms: 4000,
            silence_idle_ticks: 5,
            scratch_capacity: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// What a pass over the received bytes found
pub struct DrainStats {
    /// Valid frames decoded
    pub frames: usize,
    /// Bytes dropped while resynchronizing
    pub skipped_bytes: usize,
    /// Frames rejected for a bad checksum
    pub checksum_errors: usize,
    /// ALM/EPH acknowledgments naming an untracked SV
    pub out_of_range: usize,
    /// Bytes of an incomplete frame kept for the next pass
    pub carried: usize,
}

impl AddAssign for DrainStats {
    fn add_assign(&mut self, rhs: Self) {
        self.frames += rhs.frames;
        self.skipped_bytes += rhs.skipped_bytes;
        self.checksum_errors += rhs.checksum_errors;
        self.out_of_range += rhs.out_of_range;
        self.carried = rhs.carried;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Outcome of one aiding cycle
pub struct CycleReport {
    /// When the cycle started
    pub started: DateTime<Utc>,
    /// When the cycle finished
    pub finished: DateTime<Utc>,
    /// Retry rounds spent on missing items
    pub retry_rounds: u8,
    /// Items still missing at the end of the cycle
    pub missing: Vec<AidItem>,
    /// Final acknowledgment state
    pub acks: AckState,
    /// Accumulated drain statistics
    pub stats: DrainStats,
}

impl CycleReport {
    /// Whether every aiding item arrived
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Drives aiding cycles: requests, waits, scans the answers and retries.
pub struct PollingController {
    queue: Arc<MessageQueue<UbxPacket>>,
    rx: Arc<RingBuffer>,
    frames: Arc<RingBuffer>,
    activity: Arc<LinkActivity>,
    tracker: AidingTracker,
    cfg: ControllerCfg,
    scratch: Vec<u8>,
    carry: usize,
}

impl PollingController {
    /// Create a controller.
    ///
    /// `rx` is filled by the transport worker, every decoded frame is
    /// copied into `frames`.
    pub fn new(
        queue: Arc<MessageQueue<UbxPacket>>,
        rx: Arc<RingBuffer>,
        frames: Arc<RingBuffer>,
        activity: Arc<LinkActivity>,
        cfg: ControllerCfg,
    ) -> Self {
        let scratch = vec![0; cfg.scratch_capacity.unwrap_or_else(|| rx.capacity())];
        Self {
            queue,
            rx,
            frames,
            activity,
            tracker: AidingTracker::new(),
            cfg,
            scratch,
            carry: 0,
        }
    }

    /// The acknowledgment tracker
    pub fn tracker(&self) -> &AidingTracker {
        &self.tracker
    }

    /// Store of every frame decoded so far
    pub fn frames(&self) -> Arc<RingBuffer> {
        self.frames.clone()
    }

    /// Block until the transport worker has sent every queued frame
    pub fn wait_for_queue_drain(&self) {
        let poll = Duration::from_millis(self.cfg.drain_poll_ms);
        loop {
            let left = self.queue.size();
            if left == 0 {
                break;
            }
            log::info!("{left} messages left in tx queue");
            thread::sleep(poll);
        }
    }

    fn send_batch(&self, batch: Vec<UbxPacket>) {
        log::debug!("Queueing {} requests", batch.len());
        self.queue.extend(batch);
        self.wait_for_queue_drain();
        thread::sleep(Duration::from_millis(self.cfg.response_settle_ms));
    }

    /// Turn off the receiver's NMEA output, then discard whatever was
    /// buffered so far.
    ///
    /// The link counts as silent once a whole `silence_window_ms` passes
    /// without a received byte and the worker has seen more than
    /// `silence_idle_ticks` empty reads in a row.
    pub fn silence_nmea(&mut self) {
        let threshold = self.cfg.silence_idle_ticks;
        let window = Duration::from_millis(self.cfg.silence_window_ms);
        for attempt in 1..=self.cfg.silence_attempts {
            self.queue.extend(nmea_silence_batch());
            self.wait_for_queue_drain();
            let before = self.activity.rx_bytes();
            thread::sleep(window);
            let received = self.activity.rx_bytes() - before;
            let idle = self.activity.idle_ticks();
            if received == 0 && idle > threshold {
                log::info!("Serial port is silent now");
                break;
            }
            log::warn!(
                "Receiver still talking after silence attempt {attempt} ({received} bytes, {idle} idle ticks)"
            );
        }
        self.rx.clear();
        self.carry = 0;
    }

    /// Scan every buffered byte, feeding valid frames to the tracker.
    ///
    /// Bad sync or a bad checksum drops one byte and scans again. A header
    /// whose frame runs past the buffered bytes is only kept for the next
    /// call when no valid frame follows it; otherwise its bytes count as
    /// skipped.
    pub fn drain(&mut self) -> DrainStats {
        let mut stats = DrainStats::default();
        let window = self.scratch.len();
        let end = self.carry + self.rx.read_available(&mut self.scratch[self.carry..]);
        let mut offset = 0;
        // start of the earliest unresolved incomplete frame
        let mut pending: Option<usize> = None;
        while offset < end {
            match UbxFrame::parse_within(&self.scratch[offset..end], window) {
                Ok(frame) => {
                    if let Some(at) = pending.take() {
                        log::debug!(
                            "Header at offset {at} was bogus, skipping {} bytes",
                            offset - at
                        );
                        stats.skipped_bytes += offset - at;
                    }
                    stats.frames += 1;
                    if let Err(e) = self.frames.write(frame.as_bytes()) {
                        log::warn!("Frame store full, dropping frame: {e}");
                    }
                    match self.tracker.record(&frame) {
                        Ok(_) => {}
                        Err(AidError::SvidOutOfRange { .. }) => stats.out_of_range += 1,
                        Err(e) => log::warn!("Unusable acknowledgment: {e}"),
                    }
                    offset += frame.len();
                }
                Err(FrameError::Incomplete { .. }) => {
                    pending.get_or_insert(offset);
                    offset += 1;
                }
                Err(e) => {
                    if pending.is_none() {
                        if let FrameError::Checksum { .. } = e {
                            log::warn!("{e} at offset {offset}");
                            stats.checksum_errors += 1;
                        }
                        stats.skipped_bytes += 1;
                    }
                    offset += 1;
                }
            }
        }
        let keep_from = pending.unwrap_or(end);
        if keep_from < end {
            log::debug!("Keeping {} bytes for the next pass", end - keep_from);
        }
        self.scratch.copy_within(keep_from..end, 0);
        self.carry = end - keep_from;
        stats.carried = self.carry;
        stats
    }

    /// Run one full cycle: request the whole aiding set, then re-request
    /// what is missing for up to `retry_rounds` rounds.
    pub fn run_aiding_cycle(&mut self) -> CycleReport {
        let started = Utc::now();
        self.tracker.reset();

        log::info!("Asking for aid messages");
        self.send_batch(full_aiding_batch());
        let mut stats = self.drain();

        let mut rounds = 0;
        for round in 1..=self.cfg.retry_rounds {
            let missing = self.tracker.log_missing();
            if missing == 0 {
                break;
            }
            log::info!("{missing} aiding messages missing, retry round {round}");
            self.send_batch(self.tracker.build_missing_batch());
            stats += self.drain();
            rounds = round;
        }

        let missing = self.tracker.missing_items();
        if missing.is_empty() {
            log::info!("All aiding messages are here");
        } else {
            log::warn!(
                "Aiding set incomplete after {rounds} retry rounds: {} missing",
                missing.len()
            );
        }
        CycleReport {
            started,
            finished: Utc::now(),
            retry_rounds: rounds,
            missing,
            acks: *self.tracker.acks(),
            stats,
        }
    }

    /// Silence NMEA, then run aiding cycles forever, handing each report
    /// to `on_cycle`.
    pub fn run_forever<F: FnMut(&CycleReport)>(&mut self, mut on_cycle: F) -> ! {
        self.silence_nmea();
        let pause = Duration::from_secs(self.cfg.cycle_interval_secs);
        loop {
            let report = self.run_aiding_cycle();
            on_cycle(&report);
            thread::sleep(pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        transport::{tests::FakeLink, Transport, TransportCfg, TransportWorker},
        ubx::{
            MessageKind, UBX_AID_ALM, UBX_AID_EPH, UBX_AID_HUI, UBX_AID_INI, UBX_CLASS_AID,
            UBX_CLASS_NAV, UBX_NAV_POSLLH,
        },
    };
    use std::{
        collections::{HashSet, VecDeque},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex,
        },
    };

    fn fast_cfg() -> ControllerCfg {
        ControllerCfg {
            drain_poll_ms: 1,
            response_settle_ms: 50,
            cycle_interval_secs: 0,
            retry_rounds: 3,
            silence_attempts: 2,
            silence_window_ms: 20,
            silence_idle_ticks: 5,
            scratch_capacity: None,
        }
    }

    fn controller(rx_capacity: usize) -> PollingController {
        PollingController::new(
            Arc::new(MessageQueue::new()),
            Arc::new(RingBuffer::new(rx_capacity)),
            Arc::new(RingBuffer::new(rx_capacity)),
            Arc::new(LinkActivity::default()),
            fast_cfg(),
        )
    }

    fn sv_ack(id: u8, svid: u8) -> UbxPacket {
        UbxPacket::new(UBX_CLASS_AID, id, &[svid, 0, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD]).unwrap()
    }

    #[test]
    fn test_drain_garbage_then_acks() {
        let mut ctl = controller(5000);
        let ini = UbxPacket::new(UBX_CLASS_AID, UBX_AID_INI, &[0; 48]).unwrap();
        let alm = sv_ack(UBX_AID_ALM, 5);
        ctl.rx.write(&[0x01, 0x02, 0x03]).unwrap();
        ctl.rx.write(ini.as_bytes()).unwrap();
        ctl.rx.write(alm.as_bytes()).unwrap();

        let stats = ctl.drain();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.skipped_bytes, 3);
        assert_eq!(stats.carried, 0);

        let acks = ctl.tracker().acks();
        assert!(acks.ini_ack());
        assert!(!acks.hui_ack());
        assert!(!acks.posllh_ack());
        for sv in 0..32 {
            assert_eq!(acks.alm_ack()[sv], sv == 5);
            assert!(!acks.eph_ack()[sv]);
        }
        assert_eq!(ctl.tracker().missing_count(), 65);

        let store = ctl.frames();
        let mut stored = vec![0u8; ini.len() + alm.len()];
        store.read(&mut stored).unwrap();
        assert_eq!(&stored[..ini.len()], ini.as_bytes());
        assert_eq!(&stored[ini.len()..], alm.as_bytes());
        assert!(store.is_empty());
    }

    #[test]
    fn test_incomplete_frame_is_carried() {
        let mut ctl = controller(5000);
        let eph = sv_ack(UBX_AID_EPH, 9);
        let (head, tail) = eph.as_bytes().split_at(7);
        ctl.rx.write(head).unwrap();
        let stats = ctl.drain();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.skipped_bytes, 0);
        assert_eq!(stats.carried, 7);

        ctl.rx.write(tail).unwrap();
        let stats = ctl.drain();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.carried, 0);
        assert!(ctl.tracker().acks().eph_ack()[9]);
    }

    #[test]
    fn test_bogus_header_does_not_hide_frames() {
        let mut ctl = controller(5000);
        let ini = UbxPacket::new(UBX_CLASS_AID, UBX_AID_INI, &[0; 48]).unwrap();
        let alm = sv_ack(UBX_AID_ALM, 5);
        // AID-ALM header declaring a 256 byte payload that never follows
        ctl.rx.write(&[0xB5, 0x62, 0x0B, 0x30, 0x00, 0x01]).unwrap();
        ctl.rx.write(ini.as_bytes()).unwrap();
        ctl.rx.write(alm.as_bytes()).unwrap();

        let stats = ctl.drain();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.skipped_bytes, 6);
        assert_eq!(stats.carried, 0);
        assert!(ctl.tracker().acks().ini_ack());
        assert!(ctl.tracker().acks().alm_ack()[5]);
        assert_eq!(ctl.tracker().missing_count(), 65);
    }

    #[test]
    fn test_only_trailing_fragment_is_carried() {
        let mut ctl = controller(5000);
        let ini = UbxPacket::new(UBX_CLASS_AID, UBX_AID_INI, &[0; 48]).unwrap();
        let eph = sv_ack(UBX_AID_EPH, 3);
        let (head, tail) = eph.as_bytes().split_at(10);
        ctl.rx.write(&[0xB5, 0x62, 0x0B, 0x31, 0x00, 0x01]).unwrap();
        ctl.rx.write(ini.as_bytes()).unwrap();
        ctl.rx.write(head).unwrap();

        let stats = ctl.drain();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.skipped_bytes, 6);
        assert_eq!(stats.carried, head.len());

        ctl.rx.write(tail).unwrap();
        let stats = ctl.drain();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.skipped_bytes, 0);
        assert_eq!(stats.carried, 0);
        assert!(ctl.tracker().acks().eph_ack()[3]);
    }

    #[test]
    fn test_corrupt_frames_do_not_stall() {
        let mut ctl = controller(256);
        let mut bad = sv_ack(UBX_AID_ALM, 1).as_bytes().to_vec();
        bad[7] ^= 0xFF;
        let good = sv_ack(UBX_AID_ALM, 2);
        // a header that declares more bytes than the scan window holds
        ctl.rx.write(&[0xB5, 0x62, 0x0B, 0x30, 0x00, 0x10]).unwrap();
        ctl.rx.write(&bad).unwrap();
        ctl.rx.write(good.as_bytes()).unwrap();

        let stats = ctl.drain();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.checksum_errors, 1);
        assert_eq!(stats.skipped_bytes, 6 + bad.len());
        assert!(!ctl.tracker().acks().alm_ack()[1]);
        assert!(ctl.tracker().acks().alm_ack()[2]);
    }

    #[test]
    fn test_out_of_range_is_counted() {
        let mut ctl = controller(5000);
        ctl.rx.write(sv_ack(UBX_AID_ALM, 33).as_bytes()).unwrap();
        ctl.rx.write(sv_ack(UBX_AID_EPH, 255).as_bytes()).unwrap();
        let stats = ctl.drain();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.out_of_range, 2);
        assert_eq!(ctl.tracker().missing_count(), 67);
    }

    /// Answers poll requests the way a receiver would, optionally holding
    /// back some items from whole-constellation polls or entirely.
    #[derive(Clone)]
    struct Receiver {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        requests: Arc<Mutex<Vec<UbxPacket>>>,
        hold_back_bulk: HashSet<AidItem>,
        never: HashSet<AidItem>,
    }

    impl Receiver {
        fn new(hold_back_bulk: &[AidItem], never: &[AidItem]) -> Self {
            Self {
                inbound: Arc::default(),
                requests: Arc::default(),
                hold_back_bulk: hold_back_bulk.iter().copied().collect(),
                never: never.iter().copied().collect(),
            }
        }

        fn answer(&self, item: AidItem, bulk: bool) -> Option<UbxPacket> {
            if self.never.contains(&item) || (bulk && self.hold_back_bulk.contains(&item)) {
                return None;
            }
            Some(match item {
                AidItem::Ini => UbxPacket::new(UBX_CLASS_AID, UBX_AID_INI, &[1; 48]).unwrap(),
                AidItem::Hui => UbxPacket::new(UBX_CLASS_AID, UBX_AID_HUI, &[2; 72]).unwrap(),
                AidItem::Posllh => {
                    UbxPacket::new(UBX_CLASS_NAV, UBX_NAV_POSLLH, &[3; 28]).unwrap()
                }
                AidItem::Almanac(sv) => sv_ack(UBX_AID_ALM, sv),
                AidItem::Ephemeris(sv) => sv_ack(UBX_AID_EPH, sv),
            })
        }
    }

    impl Transport for Receiver {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, AidError> {
            let mut inbound = self.inbound.lock().unwrap();
            let n = buf.len().min(inbound.len());
            for (slot, b) in buf.iter_mut().zip(inbound.drain(..n)) {
                *slot = b;
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, AidError> {
            let frame = UbxFrame::parse(data).expect("controller sends valid frames");
            self.requests
                .lock()
                .unwrap()
                .push(UbxPacket::new(frame.class(), frame.id(), frame.payload()).unwrap());
            let svs = 0..32u8;
            let (items, bulk): (Vec<AidItem>, bool) = match (frame.kind(), frame.payload()) {
                (Some(MessageKind::AidIni), _) => (vec![AidItem::Ini], false),
                (Some(MessageKind::AidHui), _) => (vec![AidItem::Hui], false),
                (Some(MessageKind::NavPosllh), _) => (vec![AidItem::Posllh], false),
                (Some(MessageKind::AidAlm), []) => (svs.map(AidItem::Almanac).collect(), true),
                (Some(MessageKind::AidEph), []) => (svs.map(AidItem::Ephemeris).collect(), true),
                (Some(MessageKind::AidAlm), [sv]) => (vec![AidItem::Almanac(*sv)], false),
                (Some(MessageKind::AidEph), [sv]) => (vec![AidItem::Ephemeris(*sv)], false),
                _ => (vec![], false),
            };
            let mut inbound = self.inbound.lock().unwrap();
            for packet in items.into_iter().filter_map(|i| self.answer(i, bulk)) {
                inbound.extend(packet.as_bytes());
            }
            Ok(data.len())
        }
    }

    fn run_cycle_against(receiver: Receiver) -> (CycleReport, Vec<UbxPacket>) {
        let queue = Arc::new(MessageQueue::new());
        let rx = Arc::new(RingBuffer::default());
        let activity = Arc::new(LinkActivity::default());
        let running = Arc::new(AtomicBool::new(true));
        let mut worker = TransportWorker::new(
            receiver.clone(),
            queue.clone(),
            rx.clone(),
            activity.clone(),
            &TransportCfg {
                send_interval_ms: 0,
                read_chunk: 100,
            },
        );
        let hdl = {
            let running = running.clone();
            thread::spawn(move || worker.run(&running))
        };
        let mut ctl = PollingController::new(
            queue,
            rx,
            Arc::new(RingBuffer::new(20_000)),
            activity,
            fast_cfg(),
        );
        let report = ctl.run_aiding_cycle();
        running.store(false, Ordering::Relaxed);
        hdl.join().unwrap();
        let requests = receiver.requests.lock().unwrap().clone();
        (report, requests)
    }

    #[test]
    fn test_cycle_completes_first_time() {
        let (report, requests) = run_cycle_against(Receiver::new(&[], &[]));
        assert!(report.is_complete());
        assert_eq!(report.retry_rounds, 0);
        assert_eq!(report.stats.frames, 67);
        assert_eq!(requests, full_aiding_batch());
    }

    #[test]
    fn test_cycle_retries_missing_items() {
        let held = [AidItem::Ephemeris(7), AidItem::Almanac(30)];
        let (report, requests) = run_cycle_against(Receiver::new(&held, &[]));
        assert!(report.is_complete());
        assert_eq!(report.retry_rounds, 1);
        assert_eq!(
            &requests[5..],
            &[
                UbxPacket::poll_sv(MessageKind::AidAlm, 30),
                UbxPacket::poll_sv(MessageKind::AidEph, 7)
            ]
        );
    }

    #[test]
    fn test_cycle_gives_up_after_retry_rounds() {
        let (report, requests) = run_cycle_against(Receiver::new(&[], &[AidItem::Hui]));
        assert!(!report.is_complete());
        assert_eq!(report.missing, vec![AidItem::Hui]);
        assert_eq!(report.retry_rounds, 3);
        assert!(!report.acks.hui_ack());
        let hui_polls = requests
            .iter()
            .filter(|p| **p == UbxPacket::poll(MessageKind::AidHui))
            .count();
        assert_eq!(hui_polls, 4);
    }

    #[test]
    fn test_silence_nmea() {
        let link = FakeLink::default();
        let queue = Arc::new(MessageQueue::new());
        let rx = Arc::new(RingBuffer::new(512));
        let activity = Arc::new(LinkActivity::default());
        let running = Arc::new(AtomicBool::new(true));
        rx.write(b"$GPGGA,chatter*00\r\n").unwrap();
        let mut worker = TransportWorker::new(
            link.clone(),
            queue.clone(),
            rx.clone(),
            activity.clone(),
            &TransportCfg {
                send_interval_ms: 0,
                read_chunk: 100,
            },
        );
        let hdl = {
            let running = running.clone();
            thread::spawn(move || worker.run(&running))
        };
        let mut ctl = PollingController::new(
            queue,
            rx.clone(),
            Arc::new(RingBuffer::new(512)),
            activity,
            fast_cfg(),
        );
        ctl.silence_nmea();
        running.store(false, Ordering::Relaxed);
        hdl.join().unwrap();

        assert!(rx.is_empty());
        let written = link.0.lock().unwrap().written.clone();
        let expected: Vec<Vec<u8>> = nmea_silence_batch()
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect();
        assert_eq!(written, expected);
    }

    /// Link that keeps sending a byte every few reads
    #[derive(Clone, Default)]
    struct Chatter {
        reads: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    impl Transport for Chatter {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, AidError> {
            thread::sleep(Duration::from_micros(200));
            if self.reads.fetch_add(1, Ordering::Relaxed) % 20 == 19 {
                buf[0] = b'$';
                return Ok(1);
            }
            Ok(0)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, AidError> {
            self.writes.fetch_add(1, Ordering::Relaxed);
            Ok(data.len())
        }
    }

    #[test]
    fn test_silence_nmea_keeps_trying_on_chatter() {
        let link = Chatter::default();
        let queue = Arc::new(MessageQueue::new());
        let rx = Arc::new(RingBuffer::new(4096));
        let activity = Arc::new(LinkActivity::default());
        let running = Arc::new(AtomicBool::new(true));
        let mut worker = TransportWorker::new(
            link.clone(),
            queue.clone(),
            rx.clone(),
            activity.clone(),
            &TransportCfg {
                send_interval_ms: 0,
                read_chunk: 100,
            },
        );
        let hdl = {
            let running = running.clone();
            thread::spawn(move || worker.run(&running))
        };
        let mut ctl = PollingController::new(
            queue,
            rx,
            Arc::new(RingBuffer::new(512)),
            activity.clone(),
            ControllerCfg {
                silence_attempts: 3,
                silence_window_ms: 50,
                ..fast_cfg()
            },
        );
        ctl.silence_nmea();
        running.store(false, Ordering::Relaxed);
        hdl.join().unwrap();

        let batch = nmea_silence_batch().len();
        assert_eq!(link.writes.load(Ordering::Relaxed), 3 * batch);
        assert_eq!(activity.tx_frames(), 3 * batch as u64);
        assert!(activity.rx_bytes() > 0);
    }
}
