//! # BR24 Core
//!
//! Platform-independent logic for Navico BR24 and 3G/4G broadband radars.
//!
//! This crate contains pure decoding and bookkeeping with **zero I/O
//! dependencies**. The sockets, the async runtime and the subsystem tree live
//! in `br24-server`, which feeds received datagrams through the functions here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  br24-core (no tokio/async deps)                            │
//! │  ├── protocol/     (spoke frames, reports, commands)        │
//! │  ├── spoke_buffer  (one rotation of scan lines)             │
//! │  ├── statistics    (receive counters)                       │
//! │  ├── guard_zones/  (bogey counting and alarm state)         │
//! │  ├── range         (range steps and units)                  │
//! │  ├── state         (radar session state)                    │
//! │  └── acks          (command echo matching)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  br24-server            │
//!                 │  (multicast receivers)  │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Example: Decoding a Data Datagram
//!
//! ```rust
//! use br24_core::protocol::{spoke, Generation};
//! use br24_core::spoke_buffer::{ScanLine, SpokeBuffer};
//! use std::time::Duration;
//!
//! let header = spoke::SpokeHeader::br4g(2048, 0xffff, 0x0200);
//! let frame = spoke::encode_frame(&[(header, [7u8; 512])]);
//!
//! let buffer = SpokeBuffer::new(Duration::from_secs(5));
//! let decoded = spoke::decode_frame(Generation::Br4g, &frame).unwrap();
//! for spoke in decoded.spokes {
//!     let line = ScanLine::new(
//!         spoke.header.range_decimeters(),
//!         None,
//!         spoke.returns,
//!     );
//!     buffer.insert(spoke.header.angle_index(), line, 1_000);
//! }
//! assert!(buffer.read(2048, 1_000).is_fresh());
//! ```
//!
//! ## Example: Picking a Range
//!
//! ```rust
//! use br24_core::protocol::Generation;
//! use br24_core::range::{RangeTable, RangeUnit};
//!
//! let table = RangeTable::for_generation(Generation::Br24, RangeUnit::NauticalMiles);
//! let range = table.convert(1000);
//! assert_eq!(range.meters, 1156);
//! assert!(!range.clamped);
//! ```

pub mod acks;
pub mod error;
pub mod guard_zones;
pub mod protocol;
pub mod range;
pub mod spoke_buffer;
pub mod state;
pub mod statistics;

// Re-export commonly used types
pub use acks::{AckOutcome, AckStatus, CommandAcks};
pub use error::{ConfigError, DecodeError};
pub use guard_zones::{GuardZone, GuardZoneEvaluator, ZoneKind, ZoneReport, ZoneState};
pub use protocol::command::{ControlId, TechnicalValueMap};
pub use protocol::Generation;
pub use range::{RangeConversion, RangeTable, RangeUnit};
pub use spoke_buffer::{AngleStep, AngleTracker, LineRead, ScanLine, SpokeBuffer};
pub use state::{Liveness, PowerState, RadarState, ReportOutcome};
pub use statistics::{ReceiveStatistics, StatisticsSnapshot};
