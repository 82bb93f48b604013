use std::{io, path::PathBuf};

use argh::FromArgs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use ublox_aid::{ControllerCfg, TransportCfg};

#[derive(FromArgs, Serialize, Deserialize, Debug, Clone)]
/// Keep a u-blox receiver's aiding data collected
pub struct MonitorCfg {
    /// serial device, falls back to the stored configuration
    #[argh(positional)]
    pub serial_port: Option<String>,
    /// baud rate
    #[argh(option, default = "9600")]
    pub baud_rate: u32,
    /// read timeout in milliseconds
    #[argh(option, default = "100")]
    pub timeout: u64,
    /// minimum time between two sends in milliseconds
    #[argh(option, default = "200")]
    pub send_interval: u64,
    /// seconds to sleep between aiding cycles
    #[argh(option, default = "20")]
    pub cycle_interval: u64,
    /// re-request rounds for missing aiding items
    #[argh(option, default = "3")]
    pub retry_rounds: u8,
    /// log file
    #[argh(option, default = "PathBuf::from(\"/tmp/aidGps.log\")")]
    pub log_file: PathBuf,
    /// log level (error, warn, info, debug, trace)
    #[argh(option, default = "String::from(\"info\")")]
    pub log_level: String,
    /// archive collected frames and cycle reports under this directory
    #[argh(option, default = "PathBuf::from(\".\")")]
    pub save_dir: PathBuf,
    /// keep finished days uncompressed
    #[argh(switch)]
    pub no_compress: bool,
    /// store this configuration as the default
    #[serde(skip)]
    #[argh(switch)]
    pub save_config: bool,
}

impl MonitorCfg {
    /// Polling controller settings
    pub fn controller(&self) -> ControllerCfg {
        ControllerCfg {
            cycle_interval_secs: self.cycle_interval,
            retry_rounds: self.retry_rounds,
            ..Default::default()
        }
    }

    /// Transport worker settings
    pub fn transport(&self) -> TransportCfg {
        TransportCfg {
            send_interval_ms: self.send_interval,
            ..Default::default()
        }
    }

    /// Store the configuration in the default location
    pub fn store_default(&self) -> Result<(), std::io::Error> {
        let path = config_file()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(&path, json)?;
        log::info!("Stored configuration in {path:?}");
        Ok(())
    }

    /// Load the configuration from the default location
    pub fn load_default() -> Result<Self, std::io::Error> {
        let data = std::fs::read(config_file()?)?;
        serde_json::from_slice(&data).map_err(io::Error::other)
    }
}

/// `config.json` in the platform configuration directory
fn config_file() -> Result<PathBuf, io::Error> {
    ProjectDirs::from("", "", "ublox_aid_monitor")
        .map(|dirs| dirs.config_dir().join("config.json"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))
}
