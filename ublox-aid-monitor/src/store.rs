use lazy_static::lazy_static;
use std::{
    ffi::OsStr,
    fmt::{self, Display, Formatter},
    fs::{remove_dir_all, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{mpsc, Mutex},
    thread,
};

use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use ublox_aid::DEFAULT_DELIM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What an archive holds
pub enum ArchiveKind {
    /// Raw UBX frames collected in one cycle
    Frames,
    /// One JSON cycle report per line
    Report,
}

impl ArchiveKind {
    fn delimiter(&self) -> &'static [u8] {
        match self {
            ArchiveKind::Frames => &DEFAULT_DELIM,
            ArchiveKind::Report => b"\n",
        }
    }
}

impl Display for ArchiveKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ArchiveKind::Frames => write!(f, "bin"),
            ArchiveKind::Report => write!(f, "json"),
        }
    }
}

type Compressor = mpsc::Sender<PathBuf>;

lazy_static! {
    // One compression thread serves every archive in the process.
    static ref COMPRESSOR: Mutex<Option<Compressor>> = Mutex::new(None);
}

fn compressor() -> Option<Compressor> {
    let mut slot = COMPRESSOR.lock().ok()?;
    if let Some(tx) = slot.as_ref() {
        return Some(tx.clone());
    }
    let (tx, rx) = mpsc::channel::<PathBuf>();
    thread::Builder::new()
        .name("archive-compress".into())
        .spawn(move || {
            log::info!("Compression thread started");
            while let Ok(dir) = rx.recv() {
                compress_dir(&dir);
            }
            log::info!("Compression thread exiting");
        })
        .map_err(|e| log::warn!("Could not start compression thread: {e}"))
        .ok()?;
    *slot = Some(tx.clone());
    Some(tx)
}

/// Pack `dir` into `dir.tar.gz` and remove it on success
fn compress_dir(dir: &Path) {
    if !dir.is_dir() {
        return;
    }
    let mut outfile = dir.to_path_buf();
    outfile.set_extension("tar.gz");
    log::info!("Compressing {dir:?} to {outfile:?}...");
    let res = File::create(&outfile).and_then(|file| {
        let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let root = dir.file_name().unwrap_or(OsStr::new("."));
        tar.append_dir_all(root, dir)?;
        tar.into_inner()?.finish()?;
        Ok(())
    });
    match res {
        Ok(()) => match remove_dir_all(dir) {
            Ok(()) => log::info!("Compression successful! Deleted {dir:?}"),
            Err(e) => log::warn!("Error deleting directory {dir:?}: {e:?}"),
        },
        Err(e) => log::warn!("Compression error {e:?}: {dir:?}"),
    }
}

#[derive(Debug)]
/// Appends records to hourly files inside per-day directories, handing
/// finished days to the compression thread.
pub struct Archive {
    root_dir: PathBuf,
    kind: ArchiveKind,
    current_dir: Option<PathBuf>,
    last_date: Option<String>,
    last_hour: Option<String>,
    writer: Option<File>,
    compress: Option<Compressor>,
}

impl Archive {
    pub fn new(root_dir: PathBuf, kind: ArchiveKind, compress: bool) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root_dir)?;
        Ok(Self {
            root_dir,
            kind,
            current_dir: None,
            last_date: None,
            last_hour: None,
            writer: None,
            compress: if compress { compressor() } else { None },
        })
    }

    pub fn store(&mut self, tstamp: DateTime<Utc>, data: &[u8]) -> Result<(), std::io::Error> {
        let date = tstamp.format("%Y%m%d").to_string();
        let hour = tstamp.format("%H").to_string();
        if self.last_date.as_deref() != Some(&date) {
            self.writer = None;
            if let (Some(tx), Some(dir)) = (&self.compress, self.current_dir.take()) {
                let _ = tx.send(dir);
            }
            let dir = self.root_dir.join(&date);
            std::fs::create_dir_all(&dir)?;
            self.current_dir = Some(dir);
            self.last_date = Some(date.clone());
            self.last_hour = None;
        }
        if self.last_hour.as_deref() != Some(&hour) {
            let dir = self.current_dir.as_ref().unwrap_or(&self.root_dir);
            let filename = dir.join(format!("{}{}0000.{}", &date, &hour, self.kind));
            self.writer = Some(OpenOptions::new().create(true).append(true).open(filename)?);
            self.last_hour = Some(hour);
        }
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data)?;
                writer.write_all(self.kind.delimiter())?;
                writer.flush()
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "No file writer",
            )),
        }
    }
}
