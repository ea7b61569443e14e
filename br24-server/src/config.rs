//! Receiver configuration
//!
//! Read once at startup from a JSON file. Every field has a default so an
//! empty object (or no file at all) gives a working passive receiver.

use br24_core::guard_zones::{GuardZone, DEFAULT_DETECTION_THRESHOLD, MAX_GUARD_ZONES};
use br24_core::range::RangeUnit;
use br24_core::{ConfigError, Generation};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::radar::RadarError;

pub const DATA_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 8), 6678);
pub const REPORT_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 9), 6679);
pub const COMMAND_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 10), 6680);

const CONFIG_FILE: &str = "config.json";

pub fn get_project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "navico-radar", "br24")
}

/// Where the configuration lives when `--config` is not given
pub fn default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Spoke data multicast group
    pub data_addr: SocketAddrV4,
    /// Report multicast group
    pub report_addr: SocketAddrV4,
    /// Command echo multicast group we listen on
    pub command_addr: SocketAddrV4,
    /// Where commands are sent
    pub send_addr: SocketAddrV4,
    /// Interface name or IPv4 address to join the groups on
    pub interface: Option<String>,
    /// Fixes the spoke header layout instead of taking it from report 0x03
    pub generation: Option<Generation>,
    pub guard_zones: Vec<GuardZone>,
    /// Scan lines older than this are not used
    pub max_age_ms: u64,
    /// Consecutive occupied rotations before a zone alarms
    pub debounce_ticks: u32,
    /// Return strength a bin must exceed to count as a bogey
    pub detection_threshold: u8,
    /// Radar is absent when no report arrived for this long
    pub liveness_timeout_ms: u64,
    /// Sent commands not echoed within this time are dropped
    pub ack_timeout_ms: u64,
    /// Send the stay-alive sequence periodically
    pub keep_alive: bool,
    pub keep_alive_interval_ms: u64,
    /// Degrees added to every heading
    pub heading_correction: f64,
    /// Factor applied to the range of every spoke
    pub range_calibration: f64,
    pub range_unit: RangeUnit,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_addr: DATA_ADDR,
            report_addr: REPORT_ADDR,
            command_addr: COMMAND_ADDR,
            send_addr: COMMAND_ADDR,
            interface: None,
            generation: None,
            guard_zones: Vec::new(),
            max_age_ms: 6_000,
            debounce_ticks: 1,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            liveness_timeout_ms: 5_000,
            ack_timeout_ms: 2_000,
            keep_alive: false,
            keep_alive_interval_ms: 1_000,
            heading_correction: 0.0,
            range_calibration: 1.0,
            range_unit: RangeUnit::NauticalMiles,
        }
    }
}

impl Config {
    /// Load from `path`, which must exist
    pub fn load(path: &Path) -> Result<Config, RadarError> {
        let file = File::open(path).map_err(|e| {
            RadarError::Config(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).map_err(|e| {
            RadarError::Config(format!("Cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, or from the default location when it exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, RadarError> {
        if let Some(path) = path {
            return Config::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Config::load(&path),
            _ => {
                log::debug!("No configuration file, using defaults");
                Ok(Config::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), RadarError> {
        if self.guard_zones.len() > MAX_GUARD_ZONES {
            return Err(ConfigError::TooManyZones {
                max: MAX_GUARD_ZONES,
                actual: self.guard_zones.len(),
            }
            .into());
        }
        for zone in &self.guard_zones {
            zone.validate()?;
        }
        if !(self.range_calibration.is_finite() && self.range_calibration > 0.0) {
            return Err(RadarError::Config(format!(
                "Range calibration must be positive, got {}",
                self.range_calibration
            )));
        }
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms.max(100))
    }
}
