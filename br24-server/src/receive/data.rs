//! Data channel: spoke frames into the scan buffer

use br24_core::protocol::spoke::{decode_frame, SpokeRecord};
use br24_core::protocol::angle_to_degrees;
use br24_core::spoke_buffer::{AngleTracker, ScanLine};

use super::DatagramHandler;
use crate::{Channel, RotationTick, Session};

pub struct DataHandler {
    session: Session,
    tracker: AngleTracker,
    rotations: u64,
}

impl DataHandler {
    pub fn new(session: Session) -> Self {
        DataHandler {
            session,
            tracker: AngleTracker::new(),
            rotations: 0,
        }
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    fn heading(&self, spoke: &SpokeRecord, fallback: Option<f64>) -> Option<f64> {
        let correction = self.session.config().heading_correction;
        spoke
            .header
            .heading()
            .map(angle_to_degrees)
            .or(fallback)
            .map(|h| (h + correction).rem_euclid(360.0))
    }

    fn calibrated_range(&self, decimeters: u32) -> u32 {
        let calibration = self.session.config().range_calibration;
        (decimeters as f64 * calibration).round() as u32
    }

    fn process_frame(&mut self, data: &[u8], now: u64) {
        let statistics = &self.session.inner.statistics;
        statistics.packet();

        let generation = self.session.generation();
        let frame = match decode_frame(generation, data) {
            Ok(frame) => frame,
            Err(e) => {
                statistics.broken_packet();
                log::warn!("Data frame of {} bytes dropped: {}", data.len(), e);
                return;
            }
        };

        if let Some(e) = &frame.stopped {
            statistics.rejected_spoke();
            log::debug!(
                "Data frame decoding stopped after {} spokes at byte {}: {}",
                frame.spokes.len(),
                frame.consumed,
                e
            );
        }
        log::trace!("Received data frame with {} spokes", frame.spokes.len());

        let external_heading = self.session.heading();
        for spoke in &frame.spokes {
            let angle = spoke.header.angle_index();
            let range = self.calibrated_range(spoke.header.range_decimeters());
            let heading = self.heading(spoke, external_heading);
            log::trace!("angle {} range {} heading {:?}", angle, range, heading);

            self.session
                .buffer()
                .insert(angle, ScanLine::new(range, heading, spoke.returns), now);

            let step = self.tracker.step(angle);
            if statistics.spoke(step) {
                self.rotations += 1;
                self.session.rotation(RotationTick {
                    rotation: self.rotations,
                    at: now,
                });
            }
        }
    }
}

impl DatagramHandler for DataHandler {
    fn channel(&self) -> Channel {
        Channel::Data
    }

    fn process(&mut self, data: &[u8], now: u64) {
        self.process_frame(data, now);
    }
}
