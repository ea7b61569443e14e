//! Range steps
//!
//! A radar only accepts a fixed, ordered list of ranges. A requested range is
//! rounded up to the first step that covers it so a target at the requested
//! distance is never cut off; above the largest step the result is clamped
//! and flagged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::protocol::Generation;

/// Nautical range steps in metres, 1/32 NM up to 36 NM
static RANGES_NAUTICAL: &[u32] = &[
    57,    // 1/32 NM
    115,   // 1/16 NM
    231,   // 1/8 NM
    346,   // 3/16 NM
    462,   // 1/4 NM
    693,   // 3/8 NM
    926,   // 1/2 NM
    1156,  // 5/8 NM
    1388,  // 3/4 NM
    1852,  // 1 NM
    2314,  // 1.25 NM
    2778,  // 1.5 NM
    3704,  // 2 NM
    5556,  // 3 NM
    7408,  // 4 NM
    11112, // 6 NM
    14816, // 8 NM
    22224, // 12 NM
    29632, // 16 NM
    44448, // 24 NM
    66672, // 36 NM
];

/// Metric range steps in metres
static RANGES_METRIC: &[u32] = &[
    50, 75, 100, 250, 500, 750, 1000, 1500, 2000, 3000, 4000, 6000, 8000, 12000, 16000, 24000,
    36000,
];

const BR24_MAX_NAUTICAL: u32 = 44448;
const BR24_MAX_METRIC: u32 = 24000;

/// Unit a range is shown in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeUnit {
    #[default]
    NauticalMiles,
    StatuteMiles,
    Kilometers,
    Meters,
}

impl RangeUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            RangeUnit::NauticalMiles => 1852.0,
            RangeUnit::StatuteMiles => 1609.344,
            RangeUnit::Kilometers => 1000.0,
            RangeUnit::Meters => 1.0,
        }
    }

    /// Miles of either kind pick the nautical steps
    pub fn is_nautical(&self) -> bool {
        matches!(self, RangeUnit::NauticalMiles | RangeUnit::StatuteMiles)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RangeUnit::NauticalMiles => "nm",
            RangeUnit::StatuteMiles => "mi",
            RangeUnit::Kilometers => "km",
            RangeUnit::Meters => "m",
        }
    }

    pub fn from_meters(&self, meters: u32) -> f64 {
        meters as f64 / self.meters_per_unit()
    }
}

impl fmt::Display for RangeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for RangeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nm" | "nauticalmiles" => Ok(RangeUnit::NauticalMiles),
            "mi" | "statutemiles" => Ok(RangeUnit::StatuteMiles),
            "km" | "kilometers" => Ok(RangeUnit::Kilometers),
            "m" | "meters" => Ok(RangeUnit::Meters),
            _ => Err(format!("Unknown range unit '{}'", s)),
        }
    }
}

/// Result of mapping a requested range onto a table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeConversion {
    pub meters: u32,
    pub index: usize,
    /// Request exceeded the largest step
    pub clamped: bool,
    /// `meters` expressed in `unit`
    pub display: f64,
    pub unit: RangeUnit,
}

impl RangeConversion {
    /// Value for the range set command
    pub fn decimeters(&self) -> i32 {
        (self.meters as i32).saturating_mul(10)
    }
}

/// Ordered list of ranges a radar accepts
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTable {
    steps: Vec<u32>,
    unit: RangeUnit,
}

impl RangeTable {
    /// Table from arbitrary steps in metres, which must be strictly increasing
    pub fn new(steps: Vec<u32>, unit: RangeUnit) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyRangeTable);
        }
        if steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::UnorderedRangeTable);
        }
        Ok(RangeTable { steps, unit })
    }

    /// Built-in steps for a generation, in the family that suits `unit`
    pub fn for_generation(generation: Generation, unit: RangeUnit) -> Self {
        let (all, br24_max) = if unit.is_nautical() {
            (RANGES_NAUTICAL, BR24_MAX_NAUTICAL)
        } else {
            (RANGES_METRIC, BR24_MAX_METRIC)
        };
        let steps = match generation {
            Generation::Br24 => all.iter().copied().filter(|&m| m <= br24_max).collect(),
            Generation::Br4g => all.to_vec(),
        };
        RangeTable { steps, unit }
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    pub fn unit(&self) -> RangeUnit {
        self.unit
    }

    pub fn min(&self) -> u32 {
        self.steps[0]
    }

    pub fn max(&self) -> u32 {
        self.steps[self.steps.len() - 1]
    }

    fn at(&self, index: usize, clamped: bool) -> RangeConversion {
        let meters = self.steps[index];
        RangeConversion {
            meters,
            index,
            clamped,
            display: self.unit.from_meters(meters),
            unit: self.unit,
        }
    }

    /// Round `requested_m` up to the first step that covers it
    pub fn convert(&self, requested_m: u32) -> RangeConversion {
        match self.steps.iter().position(|&m| m >= requested_m) {
            Some(index) => self.at(index, false),
            None => self.at(self.steps.len() - 1, true),
        }
    }

    /// Same as [`convert`](Self::convert) for a range given in the table's unit
    pub fn convert_display(&self, requested: f64) -> RangeConversion {
        let meters = (requested.max(0.0) * self.unit.meters_per_unit()).ceil();
        self.convert(meters.min(u32::MAX as f64) as u32)
    }

    /// Step closest to a range the radar reported, for showing the current setting
    pub fn nearest(&self, meters: u32) -> RangeConversion {
        let index = self
            .steps
            .iter()
            .enumerate()
            .min_by_key(|(_, &m)| m.abs_diff(meters))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.at(index, false)
    }

    /// Next larger step, staying on the last one
    pub fn step_out(&self, current_m: u32) -> RangeConversion {
        let current = self.nearest(current_m).index;
        self.at((current + 1).min(self.steps.len() - 1), false)
    }

    /// Next smaller step, staying on the first one
    pub fn step_in(&self, current_m: u32) -> RangeConversion {
        let current = self.nearest(current_m).index;
        self.at(current.saturating_sub(1), false)
    }
}
