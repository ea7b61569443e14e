//! Guard zones
//!
//! Up to two operator defined sectors that are checked against the spoke
//! buffer on every full rotation. A zone whose above-threshold bin count
//! reaches its `threshold_count` is occupied; occupancy has to persist for a
//! number of rotations before the zone alarms.

mod zone;

pub use zone::{
    GuardZone, GuardZoneEvaluator, ZoneKind, ZoneReport, ZoneState, DEFAULT_DETECTION_THRESHOLD,
    MAX_GUARD_ZONES,
};
