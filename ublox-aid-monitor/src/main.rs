#![deny(missing_docs)]
//! # Aiding Monitor
mod config;
mod store;
use chrono::Utc;
use crossterm::terminal;
use std::{
    fs::OpenOptions,
    io::Write,
    str::FromStr,
    sync::{atomic::AtomicBool, Arc},
    thread,
    time::Duration,
};
use ublox_aid::{
    AidItem, CycleReport, LinkActivity, MessageQueue, PollingController, RingBuffer,
    SerialTransport, TransportWorker, RINGBUFFER_SIZE,
};

pub use config::MonitorCfg;
use store::{Archive, ArchiveKind};

fn main() {
    let cfg: MonitorCfg = argh::from_env();
    let cfg = if cfg.serial_port.is_some() {
        cfg
    } else {
        MonitorCfg::load_default().expect("No serial port given and no stored configuration")
    };
    if cfg.save_config {
        cfg.store_default().expect("Failed to store configuration");
    }
    init_logging(&cfg);
    ctrlc::set_handler(|| {
        log::info!("Shutting down");
        log::logger().flush();
        std::process::exit(0);
    })
    .expect("Failed to set Ctrl-C handler");

    let port = cfg.serial_port.clone().unwrap_or_default();
    let transport = SerialTransport::open(&port, cfg.baud_rate, Duration::from_millis(cfg.timeout))
        .expect("Failed to open serial port");

    let queue = Arc::new(MessageQueue::new());
    let rx = Arc::new(RingBuffer::default());
    // holds every frame of a cycle, retries included
    let frames = Arc::new(RingBuffer::new(4 * RINGBUFFER_SIZE));
    let activity = Arc::new(LinkActivity::default());

    let mut worker = TransportWorker::new(
        transport,
        queue.clone(),
        rx.clone(),
        activity.clone(),
        &cfg.transport(),
    );
    thread::Builder::new()
        .name("transport".into())
        .spawn(move || worker.run(&AtomicBool::new(true)))
        .expect("Failed to start transport thread");

    let compress = !cfg.no_compress;
    let mut frame_archive = Archive::new(cfg.save_dir.join("frames"), ArchiveKind::Frames, compress)
        .expect("Failed to create frame archive directory");
    let mut report_archive =
        Archive::new(cfg.save_dir.join("reports"), ArchiveKind::Report, compress)
            .expect("Failed to create report archive directory");

    let mut controller = PollingController::new(queue, rx, frames.clone(), activity, cfg.controller());
    let mut scratch = vec![0u8; 4 * RINGBUFFER_SIZE];
    controller.run_forever(|report| {
        let n = frames.read_available(&mut scratch);
        if n > 0 {
            if let Err(e) = frame_archive.store(report.finished, &scratch[..n]) {
                log::warn!("Failed to archive {n} bytes of frames: {e}");
            }
        }
        match serde_json::to_string(report) {
            Ok(json) => {
                if let Err(e) = report_archive.store(report.finished, json.as_bytes()) {
                    log::warn!("Failed to archive cycle report: {e}");
                }
            }
            Err(e) => log::warn!("Could not convert cycle report to JSON: {e}"),
        }
        print_status(report);
    })
}

fn init_logging(cfg: &MonitorCfg) {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.log_file)
        .expect("Failed to open log file");
    let level = log::LevelFilter::from_str(&cfg.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}:{}: {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
    log::info!("Initialized log messages");
}

fn print_status(report: &CycleReport) {
    let width = terminal::size().map(|(w, _)| w as usize).unwrap_or(80);
    println!(
        "\n{:-<width$}",
        format!(
            "{} [{} retries, {} frames] ",
            report.finished.format("%Y-%m-%d %H:%M:%S%Z"),
            report.retry_rounds,
            report.stats.frames,
        ),
        width = width
    );
    if report.is_complete() {
        println!("\tAll aiding messages received");
    } else {
        let (mut alm, mut eph) = (Vec::new(), Vec::new());
        for item in &report.missing {
            match item {
                AidItem::Almanac(sv) => alm.push(*sv),
                AidItem::Ephemeris(sv) => eph.push(*sv),
                other => println!("\tMissing {other:?}"),
            }
        }
        if !alm.is_empty() {
            println!("\tMissing almanac: {alm:?}");
        }
        if !eph.is_empty() {
            println!("\tMissing ephemeris: {eph:?}");
        }
    }
    if report.stats.checksum_errors > 0 || report.stats.out_of_range > 0 {
        println!(
            "\t{} checksum errors, {} out of range SVs, {} bytes skipped",
            report.stats.checksum_errors, report.stats.out_of_range, report.stats.skipped_bytes
        );
    }
    println!("{:=<width$}", "", width = width);
}
