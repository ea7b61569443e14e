//! # BR24 Server
//!
//! Receiver for Navico BR24 and 3G/4G broadband radars.
//!
//! This crate:
//! - Joins the data, report and command multicast groups of one radar
//! - Assembles spokes into a rotation-sized scan buffer
//! - Tracks the radar state from its reports and confirms sent commands
//! - Evaluates up to two guard zones once per rotation
//!
//! ## Architecture
//!
//! The server is built on top of [`br24_core`] for all decoding and
//! bookkeeping, with [`tokio`] providing the async runtime and
//! [`tokio_graceful_shutdown`] the subsystem tree.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    br24-server                          │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐         │
//! │  │ data       │  │ report     │  │ command    │         │
//! │  │ receiver   │  │ receiver   │  │ receiver   │         │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘         │
//! │        ▼               ▼               ▼                │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │              Session (Arc)                          ││
//! │  │  - SpokeBuffer, RadarState, CommandAcks             ││
//! │  │  - ReceiveStatistics, GuardZoneEvaluator            ││
//! │  └─────────────────────────────────────────────────────┘│
//! │        │ rotation ticks                ▲                │
//! │        ▼                               │                │
//! │  ┌────────────┐                  ┌─────┴──────┐         │
//! │  │ guard zone │                  │ command    │         │
//! │  │ monitor    │                  │ sender     │         │
//! │  └────────────┘                  └────────────┘         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: Starting the Receiver
//!
//! ```rust,no_run
//! use br24_server::{config::Config, Session};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//! use tokio_graceful_shutdown::Toplevel;
//!
//! #[tokio::main]
//! async fn main() {
//!     Toplevel::new(|s| async move {
//!         let session = Session::new(Config::default(), Ipv4Addr::UNSPECIFIED);
//!         session.start(&s);
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```

use br24_core::acks::{AckStatus, CommandAcks};
use br24_core::guard_zones::{GuardZoneEvaluator, ZoneReport};
use br24_core::protocol::command::{IdentityMap, TechnicalValueMap};
use br24_core::range::RangeTable;
use br24_core::spoke_buffer::SpokeBuffer;
use br24_core::state::RadarState;
use br24_core::statistics::{ReceiveStatistics, StatisticsSnapshot};
use br24_core::Generation;
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

pub mod command;
pub mod config;
pub mod guard;
pub mod network;
pub mod radar;
pub mod receive;

use command::{CommandSender, KeepAlive};
use config::Config;
use guard::GuardZoneMonitor;
use receive::{command::CommandHandler, data::DataHandler, report::ReportHandler, Listener};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Configuration file, JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface name or IPv4 address to join the radar groups on
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Radar generation, instead of detecting it from report 0x03
    #[arg(short, long)]
    pub generation: Option<Generation>,

    /// Send stay-alive commands to the radar
    #[arg(long, default_value_t = false)]
    pub keep_alive: bool,
}

impl Cli {
    /// Command line arguments take precedence over the file
    pub fn apply(&self, config: &mut Config) {
        if self.interface.is_some() {
            config.interface = self.interface.clone();
        }
        if self.generation.is_some() {
            config.generation = self.generation;
        }
        if self.keep_alive {
            config.keep_alive = true;
        }
    }
}

/// The three multicast channels of a radar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Data,
    Report,
    Command,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Data => write!(f, "data"),
            Channel::Report => write!(f, "report"),
            Channel::Command => write!(f, "command"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ChannelStatus {
    Starting,
    Listening { local: SocketAddr },
    Failed { reason: String },
    /// Loop has exited and its socket is closed
    Stopped,
}

/// Sent once per completed rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationTick {
    pub rotation: u64,
    pub at: u64,
}

/// Milliseconds since the epoch, the time base of the scan buffer
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct SessionInner {
    pub config: Config,
    pub nic_addr: Ipv4Addr,
    pub buffer: SpokeBuffer,
    pub statistics: ReceiveStatistics,
    state: RwLock<RadarState>,
    zones: Mutex<GuardZoneEvaluator>,
    acks: Mutex<CommandAcks>,
    channels: RwLock<BTreeMap<Channel, ChannelStatus>>,
    value_map: Box<dyn TechnicalValueMap>,
    tx_rotation: broadcast::Sender<RotationTick>,
    tx_zone: broadcast::Sender<ZoneReport>,
}

/// Everything a running receiver shares, cheap to clone
#[derive(Clone)]
pub struct Session {
    pub inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(config: Config, nic_addr: Ipv4Addr) -> Self {
        Self::with_value_map(config, nic_addr, Box::new(IdentityMap))
    }

    /// Session whose control commands go through `value_map`
    pub fn with_value_map(
        config: Config,
        nic_addr: Ipv4Addr,
        value_map: Box<dyn TechnicalValueMap>,
    ) -> Self {
        let state = match config.generation {
            Some(generation) => RadarState::with_generation(generation),
            None => RadarState::new(),
        };

        let mut zones = GuardZoneEvaluator::new(config.detection_threshold, config.debounce_ticks);
        if let Err(e) = zones.set_zones(config.guard_zones.clone()) {
            // Config::validate has already rejected these
            log::error!("Guard zones ignored: {}", e);
        }

        let (tx_rotation, _) = broadcast::channel(16);
        let (tx_zone, _) = broadcast::channel(16);

        Session {
            inner: Arc::new(SessionInner {
                buffer: SpokeBuffer::new(config.max_age()),
                statistics: ReceiveStatistics::new(),
                state: RwLock::new(state),
                zones: Mutex::new(zones),
                acks: Mutex::new(CommandAcks::new()),
                channels: RwLock::new(BTreeMap::new()),
                value_map,
                tx_rotation,
                tx_zone,
                config,
                nic_addr,
            }),
        }
    }

    /// Start the three receivers, the guard zone monitor and, when
    /// configured, the keep-alive sender.
    pub fn start(&self, subsystem: &SubsystemHandle) {
        let config = &self.inner.config;

        let data = Listener::new(self.clone(), config.data_addr, DataHandler::new(self.clone()));
        let report = Listener::new(
            self.clone(),
            config.report_addr,
            ReportHandler::new(self.clone()),
        );
        let command = Listener::new(
            self.clone(),
            config.command_addr,
            CommandHandler::new(self.clone()),
        );
        let monitor = GuardZoneMonitor::new(self.clone());

        subsystem.start(SubsystemBuilder::new("Data", |s| data.run(s)));
        subsystem.start(SubsystemBuilder::new("Reports", |s| report.run(s)));
        subsystem.start(SubsystemBuilder::new("Commands", |s| command.run(s)));
        subsystem.start(SubsystemBuilder::new("GuardZones", |s| monitor.run(s)));

        if config.keep_alive {
            let keep_alive = KeepAlive::new(self.clone());
            subsystem.start(SubsystemBuilder::new("KeepAlive", |s| keep_alive.run(s)));
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn nic_addr(&self) -> Ipv4Addr {
        self.inner.nic_addr
    }

    pub fn buffer(&self) -> &SpokeBuffer {
        &self.inner.buffer
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot()
    }

    pub fn value_map(&self) -> &dyn TechnicalValueMap {
        self.inner.value_map.as_ref()
    }

    /// Copy of the radar state
    pub fn state(&self) -> RadarState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut RadarState) -> R) -> R {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn generation(&self) -> Generation {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn heading(&self) -> Option<f64> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .heading
    }

    /// Heading from an outside source, used for spokes without one
    pub fn set_heading(&self, heading: Option<f64>) {
        self.with_state(|state| state.heading = heading.map(|h| h.rem_euclid(360.0)));
    }

    /// Range steps for the current generation in the configured unit
    pub fn range_table(&self) -> RangeTable {
        RangeTable::for_generation(self.generation(), self.inner.config.range_unit)
    }

    pub(crate) fn zones(&self) -> MutexGuard<'_, GuardZoneEvaluator> {
        self.inner
            .zones
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn zone_status(&self) -> Vec<ZoneReport> {
        self.zones().status()
    }

    /// Hide the alarm of a zone until it alarms again
    pub fn acknowledge_alarm(&self, zone: usize) -> bool {
        let acknowledged = self.zones().acknowledge(zone);
        if acknowledged {
            log::info!("Guard zone {} alarm acknowledged", zone + 1);
        }
        acknowledged
    }

    pub(crate) fn acks(&self) -> MutexGuard<'_, CommandAcks> {
        self.inner
            .acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ack_status(&self) -> AckStatus {
        self.acks().status()
    }

    pub fn channel_status(&self, channel: Channel) -> Option<ChannelStatus> {
        self.inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .cloned()
    }

    pub fn channel_statuses(&self) -> BTreeMap<Channel, ChannelStatus> {
        self.inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_channel_status(&self, channel: Channel, status: ChannelStatus) {
        log::debug!("{} channel: {:?}", channel, status);
        self.inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, status);
    }

    pub fn subscribe_rotations(&self) -> broadcast::Receiver<RotationTick> {
        self.inner.tx_rotation.subscribe()
    }

    /// Zone reports, sent whenever a zone changes state
    pub fn subscribe_zones(&self) -> broadcast::Receiver<ZoneReport> {
        self.inner.tx_zone.subscribe()
    }

    pub(crate) fn rotation(&self, tick: RotationTick) {
        // No receiver just means nobody is watching
        let _ = self.inner.tx_rotation.send(tick);
    }

    pub(crate) fn zone_changed(&self, report: ZoneReport) {
        let _ = self.inner.tx_zone.send(report);
    }

    /// Sender for commands to this radar
    pub fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session {{ nic: {} }}", self.inner.nic_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use br24_core::guard_zones::GuardZone;

    #[test]
    fn test_cli_overrides_config() {
        let args = Cli::parse_from(["br24-server", "-i", "eth1", "-g", "4g", "--keep-alive"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.interface.as_deref(), Some("eth1"));
        assert_eq!(config.generation, Some(Generation::Br4g));
        assert!(config.keep_alive);

        let args = Cli::parse_from(["br24-server"]);
        let mut config = Config {
            generation: Some(Generation::Br24),
            ..Config::default()
        };
        args.apply(&mut config);
        assert_eq!(config.generation, Some(Generation::Br24));
        assert!(!config.keep_alive);
    }

    #[test]
    fn test_session_from_config() {
        let config = Config {
            generation: Some(Generation::Br4g),
            guard_zones: vec![GuardZone::new_circle(0, 1000, 5)],
            ..Config::default()
        };
        let session = Session::new(config, Ipv4Addr::UNSPECIFIED);
        assert_eq!(session.generation(), Generation::Br4g);
        assert_eq!(session.zone_status().len(), 1);
        assert_eq!(session.range_table().max(), 66672);
        assert!(session.channel_statuses().is_empty());
    }

    #[test]
    fn test_heading_is_normalized() {
        let session = Session::new(Config::default(), Ipv4Addr::UNSPECIFIED);
        session.set_heading(Some(-10.0));
        assert_eq!(session.heading(), Some(350.0));
        session.set_heading(None);
        assert_eq!(session.heading(), None);
    }

    #[test]
    fn test_channel_status_serializes() {
        let json = serde_json::to_value(ChannelStatus::Failed {
            reason: "busy".to_owned(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "busy");
    }
}
