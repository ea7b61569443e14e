//! Radar State Tracking
//!
//! The session's view of the radar as built from the report channel: which
//! generation it is, its power state, range and control values, and when it
//! was last heard from.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::protocol::command::ControlId;
use crate::protocol::report::{Installation, ModelInfo, RadarStatus, Report};
use crate::protocol::Generation;

/// Power state of the radar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    Off,
    Standby,
    Transmit,
    Warming,
}

impl From<RadarStatus> for PowerState {
    fn from(status: RadarStatus) -> Self {
        match status {
            RadarStatus::Off => PowerState::Off,
            RadarStatus::Standby => PowerState::Standby,
            RadarStatus::Transmit => PowerState::Transmit,
            RadarStatus::WarmingUp => PowerState::Warming,
        }
    }
}

/// Whether reports are still arriving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Present,
    #[default]
    Absent,
}

/// What applying a report did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied,
    /// Report 0x03 switched the spoke header layout
    GenerationChanged(Generation),
    /// Id not interpreted
    Ignored { id: u8 },
}

/// Complete radar session state
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarState {
    pub generation: Generation,
    /// Generation was set by configuration and is not taken from reports
    #[serde(skip)]
    generation_fixed: bool,
    pub power: PowerState,
    /// Range as reported in report 0x02
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_decimeters: Option<i32>,
    /// Device-native control values
    pub controls: BTreeMap<ControlId, i32>,
    pub gain_auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation: Option<Installation>,
    /// Vessel heading in degrees, supplied from outside
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Milliseconds since epoch of the last report channel datagram
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report_at: Option<u64>,
    pub liveness: Liveness,
}

impl RadarState {
    pub fn new() -> Self {
        RadarState::default()
    }

    /// State for a radar whose generation is known up front
    pub fn with_generation(generation: Generation) -> Self {
        RadarState {
            generation,
            generation_fixed: true,
            ..RadarState::default()
        }
    }

    pub fn generation_fixed(&self) -> bool {
        self.generation_fixed
    }

    pub fn control(&self, control: ControlId) -> Option<i32> {
        self.controls.get(&control).copied()
    }

    /// Note that the radar was heard from, whatever the datagram contained
    pub fn touch(&mut self, now: u64) {
        self.last_report_at = Some(now);
    }

    /// Apply a decoded report
    pub fn apply_report(&mut self, report: &Report, now: u64) -> ReportOutcome {
        self.touch(now);

        for (control, value) in report.control_values() {
            self.controls.insert(control, value);
        }

        match report {
            Report::Status(status) => {
                self.power = (*status).into();
            }
            Report::Controls(controls) => {
                self.range_decimeters = Some(controls.range_decimeters);
                self.gain_auto = controls.gain_auto;
            }
            Report::ModelInfo(info) => {
                self.model = Some(info.clone());
                if !self.generation_fixed {
                    if let Some(generation) = Generation::from_model_byte(info.model_byte) {
                        if generation != self.generation {
                            self.generation = generation;
                            return ReportOutcome::GenerationChanged(generation);
                        }
                    }
                }
            }
            Report::Installation(installation) => {
                self.installation = Some(installation.clone());
            }
            Report::Advanced(_) => {}
            Report::Unknown { id, .. } => {
                return ReportOutcome::Ignored { id: *id };
            }
        }
        ReportOutcome::Applied
    }

    /// Liveness at `now` given the report timeout
    pub fn liveness_at(&self, now: u64, timeout: Duration) -> Liveness {
        match self.last_report_at {
            Some(at) if now.saturating_sub(at) <= timeout.as_millis() as u64 => Liveness::Present,
            _ => Liveness::Absent,
        }
    }

    /// Recompute liveness, returning the new value when it changed
    pub fn update_liveness(&mut self, now: u64, timeout: Duration) -> Option<Liveness> {
        let liveness = self.liveness_at(now, timeout);
        if liveness != self.liveness {
            self.liveness = liveness;
            Some(liveness)
        } else {
            None
        }
    }
}
