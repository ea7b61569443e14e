//! Guard Zone Implementation
//!
//! Defines guard zone shapes, the per-zone alarm state machine and the
//! evaluator that scans the spoke buffer once per rotation.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{degrees_to_angle, LINES_PER_ROTATION, RETURNS_PER_LINE};
use crate::spoke_buffer::{ScanLine, SpokeBuffer};

/// Number of independently configurable zones
pub const MAX_GUARD_ZONES: usize = 2;

/// Default return strength a bin must exceed to count
pub const DEFAULT_DETECTION_THRESHOLD: u8 = 128;

/// Guard zone shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ZoneKind {
    /// Full 360 degree annulus
    Circle,
    /// Clockwise from start to end bearing, wrapping through 0
    #[serde(rename_all = "camelCase")]
    Arc {
        /// Degrees (0-360)
        start_bearing: f64,
        /// Degrees (0-360)
        end_bearing: f64,
    },
}

fn default_threshold_count() -> u32 {
    1
}

/// Guard zone definition, ranges in decimeters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardZone {
    pub kind: ZoneKind,
    pub inner_range: u32,
    pub outer_range: u32,
    /// Bins above threshold needed before the zone counts as occupied
    #[serde(default = "default_threshold_count")]
    pub threshold_count: u32,
}

impl GuardZone {
    pub fn new_circle(inner_range: u32, outer_range: u32, threshold_count: u32) -> Self {
        GuardZone {
            kind: ZoneKind::Circle,
            inner_range,
            outer_range,
            threshold_count,
        }
    }

    pub fn new_arc(
        start_bearing: f64,
        end_bearing: f64,
        inner_range: u32,
        outer_range: u32,
        threshold_count: u32,
    ) -> Self {
        GuardZone {
            kind: ZoneKind::Arc {
                start_bearing,
                end_bearing,
            },
            inner_range,
            outer_range,
            threshold_count,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inner_range >= self.outer_range {
            return Err(ConfigError::InvalidZoneRange {
                inner: self.inner_range,
                outer: self.outer_range,
            });
        }
        Ok(())
    }

    /// `threshold_count`, never less than one
    pub fn required_bins(&self) -> u32 {
        self.threshold_count.max(1)
    }

    /// First angle index and number of consecutive angles covered
    pub fn angle_span(&self) -> (usize, usize) {
        match self.kind {
            ZoneKind::Circle => (0, LINES_PER_ROTATION),
            ZoneKind::Arc {
                start_bearing,
                end_bearing,
            } => {
                let mut width = (end_bearing - start_bearing).rem_euclid(360.0);
                if width == 0.0 && end_bearing != start_bearing {
                    // 0 to 360
                    width = 360.0;
                }
                let count = (width * LINES_PER_ROTATION as f64 / 360.0).round() as usize + 1;
                (
                    degrees_to_angle(start_bearing),
                    count.min(LINES_PER_ROTATION),
                )
            }
        }
    }

    /// Whether the bearing (degrees) lies inside the zone's angular extent
    pub fn covers_bearing(&self, bearing: f64) -> bool {
        match self.kind {
            ZoneKind::Circle => true,
            ZoneKind::Arc {
                start_bearing,
                end_bearing,
            } => {
                let bearing = normalize_bearing(bearing);
                let start = normalize_bearing(start_bearing);
                let end = normalize_bearing(end_bearing);
                if start <= end {
                    bearing >= start && bearing <= end
                } else {
                    // Wrap-around case: zone crosses 0 degrees
                    bearing >= start || bearing <= end
                }
            }
        }
    }

    /// Bin indexes of `line` whose distance lies in `[inner, outer]`
    fn bins(&self, line: &ScanLine) -> Option<(usize, usize)> {
        let range = line.range_decimeters as u64;
        if range == 0 {
            return None;
        }
        let bins = RETURNS_PER_LINE as u64;
        // distance of bin i is i * range / bins
        let first = (self.inner_range as u64 * bins).div_ceil(range);
        let last = (self.outer_range as u64 * bins / range).min(bins - 1);
        if first > last {
            return None;
        }
        Some((first as usize, last as usize))
    }

    /// Count bins above `threshold` inside the zone on one line
    pub fn count_line(&self, line: &ScanLine, threshold: u8) -> u32 {
        match self.bins(line) {
            Some((first, last)) => line.returns[first..=last]
                .iter()
                .filter(|&&r| r > threshold)
                .count() as u32,
            None => 0,
        }
    }
}

/// Normalize bearing to 0-360 range
fn normalize_bearing(bearing: f64) -> f64 {
    bearing.rem_euclid(360.0)
}

/// Alarm state of one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ZoneState {
    #[default]
    Clear,
    /// Occupied, but not yet for `debounce_ticks` consecutive rotations
    ArmedSilent,
    Alarming,
}

/// Result of evaluating one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneReport {
    pub zone: usize,
    pub state: ZoneState,
    pub previous: ZoneState,
    pub bogey_count: u32,
    /// Alarming and not acknowledged
    pub alarm_visible: bool,
}

impl ZoneReport {
    pub fn changed(&self) -> bool {
        self.state != self.previous
    }

    /// This tick entered the alarming state
    pub fn alarm_raised(&self) -> bool {
        self.state == ZoneState::Alarming && self.previous != ZoneState::Alarming
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ZoneTracking {
    state: ZoneState,
    consecutive: u32,
    acknowledged: bool,
    bogey_count: u32,
}

/// Evaluates up to two guard zones against the spoke buffer
#[derive(Debug)]
pub struct GuardZoneEvaluator {
    zones: [Option<GuardZone>; MAX_GUARD_ZONES],
    tracking: [ZoneTracking; MAX_GUARD_ZONES],
    detection_threshold: u8,
    debounce_ticks: u32,
}

impl GuardZoneEvaluator {
    pub fn new(detection_threshold: u8, debounce_ticks: u32) -> Self {
        GuardZoneEvaluator {
            zones: [None, None],
            tracking: [ZoneTracking::default(); MAX_GUARD_ZONES],
            detection_threshold,
            debounce_ticks,
        }
    }

    pub fn detection_threshold(&self) -> u8 {
        self.detection_threshold
    }

    pub fn set_detection_threshold(&mut self, threshold: u8) {
        self.detection_threshold = threshold;
    }

    pub fn set_debounce_ticks(&mut self, ticks: u32) {
        self.debounce_ticks = ticks;
    }

    /// Configure or clear one zone; tracking for that zone restarts
    pub fn set_zone(&mut self, index: usize, zone: Option<GuardZone>) -> Result<(), ConfigError> {
        if index >= MAX_GUARD_ZONES {
            return Err(ConfigError::TooManyZones {
                max: MAX_GUARD_ZONES,
                actual: index + 1,
            });
        }
        if let Some(zone) = &zone {
            zone.validate()?;
        }
        self.zones[index] = zone;
        self.tracking[index] = ZoneTracking::default();
        Ok(())
    }

    /// Replace all zones
    pub fn set_zones(&mut self, zones: Vec<GuardZone>) -> Result<(), ConfigError> {
        if zones.len() > MAX_GUARD_ZONES {
            return Err(ConfigError::TooManyZones {
                max: MAX_GUARD_ZONES,
                actual: zones.len(),
            });
        }
        for zone in &zones {
            zone.validate()?;
        }
        let mut zones = zones.into_iter();
        for index in 0..MAX_GUARD_ZONES {
            self.set_zone(index, zones.next())?;
        }
        Ok(())
    }

    pub fn zone(&self, index: usize) -> Option<&GuardZone> {
        self.zones.get(index).and_then(|z| z.as_ref())
    }

    /// Sum of above-threshold bins in the zone over all fresh lines it covers
    pub fn count_bogeys(&self, zone: &GuardZone, buffer: &SpokeBuffer, now: u64) -> u32 {
        let (start, count) = zone.angle_span();
        (0..count)
            .filter_map(|i| {
                let angle = (start + i) % LINES_PER_ROTATION;
                buffer.with_fresh(angle, now, |line| {
                    zone.count_line(line, self.detection_threshold)
                })
            })
            .sum()
    }

    /// Advance the state machine of one zone with this tick's bogey count
    pub fn apply(&mut self, index: usize, bogey_count: u32) -> Option<ZoneReport> {
        let required = self.zone(index)?.required_bins();
        let debounce = self.debounce_ticks.max(1);
        let tracking = &mut self.tracking[index];
        let previous = tracking.state;

        if bogey_count >= required {
            tracking.consecutive = tracking.consecutive.saturating_add(1);
            tracking.state = if tracking.consecutive >= debounce {
                ZoneState::Alarming
            } else {
                ZoneState::ArmedSilent
            };
        } else {
            tracking.consecutive = 0;
            tracking.state = ZoneState::Clear;
        }

        if tracking.state == ZoneState::Alarming && previous != ZoneState::Alarming {
            tracking.acknowledged = false;
        }
        tracking.bogey_count = bogey_count;

        Some(ZoneReport {
            zone: index,
            state: tracking.state,
            previous,
            bogey_count,
            alarm_visible: tracking.state == ZoneState::Alarming && !tracking.acknowledged,
        })
    }

    /// Evaluate every configured zone; called once per rotation
    pub fn evaluate(&mut self, buffer: &SpokeBuffer, now: u64) -> Vec<ZoneReport> {
        let counts: Vec<(usize, u32)> = self
            .zones
            .iter()
            .enumerate()
            .filter_map(|(i, z)| z.as_ref().map(|z| (i, self.count_bogeys(z, buffer, now))))
            .collect();

        counts
            .into_iter()
            .filter_map(|(i, count)| self.apply(i, count))
            .collect()
    }

    /// Hide the alarm of a zone until it next enters the alarming state.
    ///
    /// Returns false when the zone is not alarming.
    pub fn acknowledge(&mut self, index: usize) -> bool {
        match self.tracking.get_mut(index) {
            Some(t) if t.state == ZoneState::Alarming => {
                t.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    /// Current state of every configured zone
    pub fn status(&self) -> Vec<ZoneReport> {
        self.zones
            .iter()
            .enumerate()
            .filter(|(_, z)| z.is_some())
            .map(|(i, _)| {
                let t = &self.tracking[i];
                ZoneReport {
                    zone: i,
                    state: t.state,
                    previous: t.state,
                    bogey_count: t.bogey_count,
                    alarm_visible: t.state == ZoneState::Alarming && !t.acknowledged,
                }
            })
            .collect()
    }
}

impl Default for GuardZoneEvaluator {
    fn default() -> Self {
        GuardZoneEvaluator::new(DEFAULT_DETECTION_THRESHOLD, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NOW: u64 = 10_000;

    fn line_with_bin(range: u32, bin: usize, value: u8) -> ScanLine {
        let mut returns = [0u8; RETURNS_PER_LINE];
        returns[bin] = value;
        ScanLine::new(range, None, returns)
    }

    fn buffer_with_lines(angles: &[usize]) -> SpokeBuffer {
        let buffer = SpokeBuffer::new(Duration::from_secs(5));
        for &angle in angles {
            // range 2000 dm, bin 10 is at 39 dm
            buffer.insert(angle, line_with_bin(2000, 10, 255), NOW);
        }
        buffer
    }

    #[test]
    fn test_circle_occupied_at_threshold() {
        let mut evaluator = GuardZoneEvaluator::new(128, 1);
        evaluator
            .set_zone(0, Some(GuardZone::new_circle(0, 1000, 5)))
            .unwrap();

        let buffer = buffer_with_lines(&[1, 100, 1000, 2000, 4000]);
        let reports = evaluator.evaluate(&buffer, NOW);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].bogey_count, 5);
        assert_eq!(reports[0].state, ZoneState::Alarming);

        let mut evaluator = GuardZoneEvaluator::new(128, 1);
        evaluator
            .set_zone(0, Some(GuardZone::new_circle(0, 1000, 5)))
            .unwrap();
        let buffer = buffer_with_lines(&[1, 100, 1000, 2000]);
        let reports = evaluator.evaluate(&buffer, NOW);
        assert_eq!(reports[0].bogey_count, 4);
        assert_eq!(reports[0].state, ZoneState::Clear);
    }

    #[test]
    fn test_stale_lines_are_skipped() {
        let mut evaluator = GuardZoneEvaluator::new(128, 1);
        evaluator
            .set_zone(0, Some(GuardZone::new_circle(0, 1000, 1)))
            .unwrap();
        let buffer = buffer_with_lines(&[1, 2, 3]);
        let reports = evaluator.evaluate(&buffer, NOW + 60_000);
        assert_eq!(reports[0].bogey_count, 0);
        assert_eq!(reports[0].state, ZoneState::Clear);
    }

    #[test]
    fn test_bins_outside_range_and_threshold_ignored() {
        let zone = GuardZone::new_circle(500, 1000, 1);
        // bin 10 of 2000 dm is at 39 dm, inside 0..1000 but not 500..1000
        assert_eq!(zone.count_line(&line_with_bin(2000, 10, 255), 128), 0);
        // bin 200 is at 781 dm
        assert_eq!(zone.count_line(&line_with_bin(2000, 200, 255), 128), 1);
        assert_eq!(zone.count_line(&line_with_bin(2000, 200, 128), 128), 0);
        // bin 300 is at 1171 dm
        assert_eq!(zone.count_line(&line_with_bin(2000, 300, 255), 128), 0);
        assert_eq!(zone.count_line(&line_with_bin(0, 0, 255), 128), 0);
    }

    #[test]
    fn test_arc_covers_wrapping_bearings() {
        let zone = GuardZone::new_arc(350.0, 10.0, 0, 1000, 1);
        assert!(zone.covers_bearing(355.0));
        assert!(zone.covers_bearing(5.0));
        assert!(!zone.covers_bearing(180.0));

        let (start, count) = zone.angle_span();
        assert_eq!(start, degrees_to_angle(350.0));
        assert_eq!(count, 229);

        let mut evaluator = GuardZoneEvaluator::new(128, 1);
        evaluator.set_zone(1, Some(zone)).unwrap();
        let buffer = buffer_with_lines(&[0, 4090, 2048]);
        let reports = evaluator.evaluate(&buffer, NOW);
        assert_eq!(reports[0].zone, 1);
        assert_eq!(reports[0].bogey_count, 2);
    }

    #[test]
    fn test_full_arc_spans_rotation() {
        let zone = GuardZone::new_arc(0.0, 360.0, 0, 1000, 1);
        assert_eq!(zone.angle_span(), (0, LINES_PER_ROTATION));
    }

    #[test]
    fn test_debounce_and_reset() {
        let mut evaluator = GuardZoneEvaluator::new(128, 3);
        evaluator
            .set_zone(0, Some(GuardZone::new_circle(0, 1000, 5)))
            .unwrap();

        let r = evaluator.apply(0, 6).unwrap();
        assert_eq!(r.state, ZoneState::ArmedSilent);
        let r = evaluator.apply(0, 6).unwrap();
        assert_eq!(r.state, ZoneState::ArmedSilent);
        let r = evaluator.apply(0, 0).unwrap();
        assert_eq!(r.state, ZoneState::Clear);
        assert!(r.changed());

        for _ in 0..2 {
            evaluator.apply(0, 5);
        }
        let r = evaluator.apply(0, 5).unwrap();
        assert_eq!(r.state, ZoneState::Alarming);
        assert!(r.alarm_raised());
        assert!(r.alarm_visible);

        let r = evaluator.apply(0, 4).unwrap();
        assert_eq!(r.state, ZoneState::Clear);
    }

    #[test]
    fn test_acknowledge_suppresses_until_next_alarm() {
        let mut evaluator = GuardZoneEvaluator::new(128, 1);
        evaluator
            .set_zone(0, Some(GuardZone::new_circle(0, 1000, 1)))
            .unwrap();

        assert!(!evaluator.acknowledge(0));
        assert!(evaluator.apply(0, 3).unwrap().alarm_visible);
        assert!(evaluator.acknowledge(0));

        let r = evaluator.apply(0, 3).unwrap();
        assert_eq!(r.state, ZoneState::Alarming);
        assert!(!r.alarm_visible);
        assert!(!evaluator.status()[0].alarm_visible);

        evaluator.apply(0, 0);
        let r = evaluator.apply(0, 3).unwrap();
        assert!(r.alarm_raised());
        assert!(r.alarm_visible);
    }

    #[test]
    fn test_zone_validation() {
        let mut evaluator = GuardZoneEvaluator::default();
        assert_eq!(
            evaluator.set_zone(0, Some(GuardZone::new_circle(100, 100, 1))),
            Err(ConfigError::InvalidZoneRange {
                inner: 100,
                outer: 100
            })
        );
        assert!(evaluator
            .set_zone(2, Some(GuardZone::new_circle(0, 100, 1)))
            .is_err());
        assert!(evaluator
            .set_zones(vec![GuardZone::new_circle(0, 100, 1); 3])
            .is_err());
        assert_eq!(evaluator.apply(0, 10), None);
    }

    #[test]
    fn test_zero_threshold_count_needs_one_bin() {
        let mut evaluator = GuardZoneEvaluator::new(128, 1);
        evaluator
            .set_zone(0, Some(GuardZone::new_circle(0, 1000, 0)))
            .unwrap();
        assert_eq!(evaluator.apply(0, 0).unwrap().state, ZoneState::Clear);
        assert_eq!(evaluator.apply(0, 1).unwrap().state, ZoneState::Alarming);
    }

    #[test]
    fn test_zone_json() {
        let json = r#"{"kind":{"type":"arc","startBearing":300.0,"endBearing":60.0},"innerRange":0,"outerRange":5000}"#;
        let zone: GuardZone = serde_json::from_str(json).unwrap();
        assert_eq!(zone.threshold_count, 1);
        assert!(matches!(zone.kind, ZoneKind::Arc { .. }));
    }
}
