//! Spoke buffer
//!
//! One rotation worth of scan lines, indexed by angle. The buffer is written
//! by the data channel and read concurrently by the guard zone evaluator and
//! any display. Every slot has its own lock; a line is copied in and out as
//! a whole, so a reader never sees the returns of one spoke paired with the
//! range of another.
//!
//! Lines older than `max_age` are reported as [`LineRead::Stale`] and are
//! never handed out as data. The slot keeps its contents until overwritten.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::protocol::{LINES_PER_ROTATION, RETURNS_PER_LINE};

/// Half a rotation, the largest backwards step still taken as a wrap
const WRAP_LIMIT: usize = LINES_PER_ROTATION / 2;

/// Largest backwards step taken as a late packet rather than a restart
pub const LATE_SPOKE_LIMIT: usize = 8;

/// How far [`SpokeBuffer::interpolate_missing`] looks for a neighbour
pub const INTERPOLATE_SPAN: usize = 4;

/// One angular sample of a rotation
#[derive(Debug, Clone, PartialEq)]
pub struct ScanLine {
    /// Range of the last return bin
    pub range_decimeters: u32,
    /// Vessel heading in degrees when the spoke was captured
    pub heading: Option<f64>,
    /// Milliseconds since the epoch; zero when never written
    pub received_at: u64,
    /// Return strength, nearest bin first
    pub returns: [u8; RETURNS_PER_LINE],
}

impl ScanLine {
    pub fn new(
        range_decimeters: u32,
        heading: Option<f64>,
        returns: [u8; RETURNS_PER_LINE],
    ) -> Self {
        ScanLine {
            range_decimeters,
            heading,
            received_at: 0,
            returns,
        }
    }

    fn empty() -> Self {
        ScanLine::new(0, None, [0u8; RETURNS_PER_LINE])
    }

    /// Distance covered by one return bin
    pub fn decimeters_per_bin(&self) -> f64 {
        self.range_decimeters as f64 / RETURNS_PER_LINE as f64
    }
}

/// What a read of one slot produced
#[derive(Debug, Clone, PartialEq)]
pub enum LineRead {
    /// Never written
    Empty,
    /// Older than the configured maximum age
    Stale { age_ms: u64 },
    Line(ScanLine),
}

impl LineRead {
    pub fn fresh(self) -> Option<ScanLine> {
        match self {
            LineRead::Line(line) => Some(line),
            _ => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, LineRead::Line(_))
    }
}

/// Outcome of comparing a newly received angle with the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleStep {
    /// No previous angle
    First,
    Consecutive,
    /// Forward jump, count of angles skipped
    Missing(usize),
    /// Angle wrapped past 4095, a rotation completed
    Wrapped { missing: usize },
    /// Out of order or duplicate
    Broken,
}

/// Classify the step from `previous` to `new`.
///
/// An increase is a gap of `new - previous - 1` spokes. A decrease is a wrap
/// into the next rotation when the forward distance modulo 4096 is under half
/// a rotation, and an out of order spoke otherwise. Equal angles are
/// duplicates.
pub fn detect_gap(previous: Option<usize>, new: usize) -> AngleStep {
    let new = new % LINES_PER_ROTATION;
    let Some(previous) = previous.map(|p| p % LINES_PER_ROTATION) else {
        return AngleStep::First;
    };

    if new > previous {
        return match new - previous - 1 {
            0 => AngleStep::Consecutive,
            n => AngleStep::Missing(n),
        };
    }

    let forward = (new + LINES_PER_ROTATION - previous) % LINES_PER_ROTATION;
    if new < previous && forward < WRAP_LIMIT {
        AngleStep::Wrapped {
            missing: forward - 1,
        }
    } else {
        AngleStep::Broken
    }
}

/// Remembers the last inserted angle for [`detect_gap`].
///
/// A spoke at most [`LATE_SPOKE_LIMIT`] angles behind the reference is a late
/// packet and leaves the reference alone, so it is not followed by a spurious
/// gap. Any other broken step means the radar restarted its sweep somewhere
/// else, and tracking resumes from the new angle.
#[derive(Debug, Default, Clone)]
pub struct AngleTracker {
    previous: Option<usize>,
}

impl AngleTracker {
    pub fn new() -> Self {
        AngleTracker::default()
    }

    pub fn step(&mut self, angle: usize) -> AngleStep {
        let angle = angle % LINES_PER_ROTATION;
        let step = detect_gap(self.previous, angle);
        match (step, self.previous) {
            (AngleStep::Broken, Some(previous)) => {
                let behind = (previous + LINES_PER_ROTATION - angle) % LINES_PER_ROTATION;
                if behind > LATE_SPOKE_LIMIT {
                    self.previous = Some(angle);
                }
            }
            _ => self.previous = Some(angle),
        }
        step
    }

    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Fixed ring of 4096 scan lines
#[derive(Debug)]
pub struct SpokeBuffer {
    lines: Box<[RwLock<ScanLine>]>,
    max_age_ms: AtomicU64,
}

impl SpokeBuffer {
    pub fn new(max_age: Duration) -> Self {
        let lines = (0..LINES_PER_ROTATION)
            .map(|_| RwLock::new(ScanLine::empty()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        SpokeBuffer {
            lines,
            max_age_ms: AtomicU64::new(max_age.as_millis() as u64),
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms.load(Ordering::Relaxed))
    }

    pub fn set_max_age(&self, max_age: Duration) {
        self.max_age_ms.store(max_age.as_millis() as u64, Ordering::Relaxed);
    }

    /// Replace the line at `angle mod 4096`, stamping it with `now`
    pub fn insert(&self, angle: usize, mut line: ScanLine, now: u64) {
        line.received_at = now;
        let slot = &self.lines[angle % LINES_PER_ROTATION];
        *slot.write().unwrap_or_else(PoisonError::into_inner) = line;
    }

    fn classify(&self, line: &ScanLine, now: u64) -> Option<LineRead> {
        if line.received_at == 0 {
            return Some(LineRead::Empty);
        }
        let age_ms = now.saturating_sub(line.received_at);
        if age_ms > self.max_age_ms.load(Ordering::Relaxed) {
            return Some(LineRead::Stale { age_ms });
        }
        None
    }

    /// Copy out the line at `angle mod 4096`
    pub fn read(&self, angle: usize, now: u64) -> LineRead {
        let line = self.lines[angle % LINES_PER_ROTATION]
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match self.classify(&line, now) {
            Some(marker) => marker,
            None => LineRead::Line(line.clone()),
        }
    }

    /// Run `f` on a fresh line while holding its read lock.
    ///
    /// Returns `None` for empty or stale slots. Used by the evaluator to avoid
    /// copying every line of a rotation.
    pub fn with_fresh<R>(
        &self,
        angle: usize,
        now: u64,
        f: impl FnOnce(&ScanLine) -> R,
    ) -> Option<R> {
        let line = self.lines[angle % LINES_PER_ROTATION]
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match self.classify(&line, now) {
            Some(_) => None,
            None => Some(f(&line)),
        }
    }

    /// Number of slots holding fresh data
    pub fn fresh_lines(&self, now: u64) -> usize {
        (0..LINES_PER_ROTATION)
            .filter(|&angle| self.with_fresh(angle, now, |_| ()).is_some())
            .count()
    }

    /// Nearest fresh line within [`INTERPOLATE_SPAN`] angles on one side,
    /// with its distance
    fn nearest_fresh(
        &self,
        angle: usize,
        forward: bool,
        now: u64,
    ) -> Option<(usize, ScanLine)> {
        (1..=INTERPOLATE_SPAN).find_map(|distance| {
            let neighbour = if forward {
                (angle + distance) % LINES_PER_ROTATION
            } else {
                (angle + LINES_PER_ROTATION - distance) % LINES_PER_ROTATION
            };
            self.read(neighbour, now).fresh().map(|line| (distance, line))
        })
    }

    /// Fill in a missing or stale slot from its nearest fresh neighbours.
    ///
    /// Neighbours are searched up to [`INTERPOLATE_SPAN`] angles away on each
    /// side. Each bin takes the stronger of the two; range and heading come
    /// from the nearer neighbour, the preceding one on a tie. Returns `None`
    /// when the slot itself is fresh or a side has no fresh line. The result
    /// is not stored.
    pub fn interpolate_missing(&self, angle: usize, now: u64) -> Option<ScanLine> {
        let angle = angle % LINES_PER_ROTATION;
        if self.read(angle, now).is_fresh() {
            return None;
        }
        let (before_distance, before) = self.nearest_fresh(angle, false, now)?;
        let (after_distance, after) = self.nearest_fresh(angle, true, now)?;

        let mut returns = [0u8; RETURNS_PER_LINE];
        for (i, r) in returns.iter_mut().enumerate() {
            *r = before.returns[i].max(after.returns[i]);
        }

        let nearer = if after_distance < before_distance {
            &after
        } else {
            &before
        };
        Some(ScanLine {
            range_decimeters: nearer.range_decimeters,
            heading: nearer.heading,
            received_at: before.received_at.min(after.received_at),
            returns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::RangeInclusive;

    fn line_with(value: u8) -> ScanLine {
        ScanLine::new(1000, Some(12.5), [value; RETURNS_PER_LINE])
    }

    #[test]
    fn test_insert_then_read() {
        let buffer = SpokeBuffer::new(Duration::from_millis(500));
        buffer.insert(42, line_with(7), 1_000);

        let LineRead::Line(line) = buffer.read(42, 1_000) else {
            panic!("expected a line");
        };
        assert_eq!(line.returns[0], 7);
        assert_eq!(line.received_at, 1_000);
        assert_eq!(line.heading, Some(12.5));
    }

    #[test]
    fn test_angle_wraps_modulo_rotation() {
        let buffer = SpokeBuffer::new(Duration::from_secs(1));
        buffer.insert(LINES_PER_ROTATION + 3, line_with(9), 10);
        assert_eq!(buffer.read(3, 10).fresh().unwrap().returns[1], 9);
    }

    #[test]
    fn test_last_writer_wins() {
        let buffer = SpokeBuffer::new(Duration::from_secs(1));
        buffer.insert(5, line_with(1), 10);
        buffer.insert(5, line_with(2), 11);
        assert_eq!(buffer.read(5, 11).fresh().unwrap().returns[0], 2);
    }

    #[test]
    fn test_empty_and_stale() {
        let buffer = SpokeBuffer::new(Duration::from_millis(100));
        assert_eq!(buffer.read(1, 50), LineRead::Empty);

        buffer.insert(1, line_with(1), 1_000);
        assert!(buffer.read(1, 1_100).is_fresh());
        assert_eq!(buffer.read(1, 1_101), LineRead::Stale { age_ms: 101 });
        assert_eq!(buffer.with_fresh(1, 1_101, |l| l.range_decimeters), None);

        buffer.set_max_age(Duration::from_secs(10));
        assert!(buffer.read(1, 1_101).is_fresh());
        assert_eq!(buffer.fresh_lines(1_101), 1);
    }

    #[test]
    fn test_detect_gap() {
        assert_eq!(detect_gap(None, 10), AngleStep::First);
        assert_eq!(detect_gap(Some(10), 11), AngleStep::Consecutive);
        assert_eq!(detect_gap(Some(10), 15), AngleStep::Missing(4));
        assert_eq!(detect_gap(Some(15), 10), AngleStep::Broken);
        assert_eq!(detect_gap(Some(15), 15), AngleStep::Broken);
        assert_eq!(detect_gap(Some(4095), 0), AngleStep::Wrapped { missing: 0 });
        assert_eq!(detect_gap(Some(4090), 5), AngleStep::Wrapped { missing: 10 });
        assert_eq!(detect_gap(Some(100), 50), AngleStep::Broken);
    }

    #[test]
    fn test_tracker_ignores_late_spokes() {
        let mut tracker = AngleTracker::new();
        assert_eq!(tracker.step(14), AngleStep::First);
        assert_eq!(tracker.step(15), AngleStep::Consecutive);
        assert_eq!(tracker.step(10), AngleStep::Broken);
        assert_eq!(tracker.step(16), AngleStep::Consecutive);
        assert_eq!(tracker.previous(), Some(16));
    }

    #[test]
    fn test_tracker_resyncs_after_restart() {
        fn broken_steps(tracker: &mut AngleTracker, angles: RangeInclusive<usize>) -> usize {
            angles
                .map(|a| tracker.step(a))
                .filter(|s| *s == AngleStep::Broken)
                .count()
        }
        let mut tracker = AngleTracker::new();
        assert_eq!(broken_steps(&mut tracker, 0..=2000), 0);

        // Sweep restarts well behind the last angle
        assert_eq!(tracker.step(10), AngleStep::Broken);
        assert_eq!(tracker.previous(), Some(10));
        assert_eq!(broken_steps(&mut tracker, 11..=2000), 0);
        assert_eq!(tracker.previous(), Some(2000));

        // A late packet within the limit keeps the reference
        assert_eq!(tracker.step(2000 - LATE_SPOKE_LIMIT), AngleStep::Broken);
        assert_eq!(tracker.previous(), Some(2000));
        assert_eq!(tracker.step(2001), AngleStep::Consecutive);
    }

    #[test]
    fn test_interpolate_takes_range_of_nearer_neighbour() {
        let buffer = SpokeBuffer::new(Duration::from_secs(1));
        buffer.insert(8, ScanLine::new(800, Some(1.0), [5; RETURNS_PER_LINE]), 100);
        buffer.insert(11, ScanLine::new(900, Some(2.0), [9; RETURNS_PER_LINE]), 100);

        let line = buffer.interpolate_missing(10, 100).unwrap();
        assert_eq!(line.range_decimeters, 900);
        assert_eq!(line.heading, Some(2.0));
        assert_eq!(line.returns[0], 9);

        let line = buffer.interpolate_missing(9, 100).unwrap();
        assert_eq!(line.range_decimeters, 800);

        // Nothing within reach on the far side
        buffer.insert(20, ScanLine::new(700, None, [1; RETURNS_PER_LINE]), 100);
        assert_eq!(buffer.interpolate_missing(15, 100), None);
    }

    #[test]
    fn test_interpolate_missing() {
        let buffer = SpokeBuffer::new(Duration::from_secs(1));
        let mut a = [0u8; RETURNS_PER_LINE];
        a[0] = 10;
        let mut b = [0u8; RETURNS_PER_LINE];
        b[1] = 20;
        buffer.insert(4095, ScanLine::new(800, None, a), 100);
        buffer.insert(1, ScanLine::new(900, None, b), 101);

        let line = buffer.interpolate_missing(0, 101).unwrap();
        assert_eq!(line.returns[0], 10);
        assert_eq!(line.returns[1], 20);
        assert_eq!(line.range_decimeters, 800);
        // interpolation is not stored
        assert_eq!(buffer.read(0, 101), LineRead::Empty);
        assert_eq!(buffer.interpolate_missing(1, 101), None);
        assert_eq!(buffer.interpolate_missing(2, 101), None);
    }

    #[test]
    fn test_concurrent_readers_see_whole_lines() {
        use std::sync::Arc;

        let buffer = Arc::new(SpokeBuffer::new(Duration::from_secs(60)));
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 1..2000u32 {
                    let value = (i % 250) as u8 + 1;
                    let line = ScanLine::new(value as u32, None, [value; RETURNS_PER_LINE]);
                    buffer.insert(7, line, 1);
                }
            })
        };
        for _ in 0..2000 {
            if let Some(line) = buffer.read(7, 1).fresh() {
                let first = line.returns[0];
                assert!(line.returns.iter().all(|&r| r == first));
                assert_eq!(line.range_decimeters, first as u32);
            }
        }
        writer.join().unwrap();
    }
}
