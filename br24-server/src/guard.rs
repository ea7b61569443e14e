//! Guard zone monitor
//!
//! Runs the evaluator once per rotation tick from the data channel and
//! publishes zone state changes.

use br24_core::guard_zones::{ZoneReport, ZoneState};
use tokio::sync::broadcast::error::RecvError;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::radar::RadarError;
use crate::Session;

pub struct GuardZoneMonitor {
    session: Session,
}

impl GuardZoneMonitor {
    pub fn new(session: Session) -> Self {
        GuardZoneMonitor { session }
    }

    /// Evaluate all zones against the buffer as of `now`
    pub fn evaluate(&self, now: u64) -> Vec<ZoneReport> {
        let reports = self.session.zones().evaluate(self.session.buffer(), now);
        for report in &reports {
            log::trace!(
                "Guard zone {}: {} bogeys, {:?}",
                report.zone + 1,
                report.bogey_count,
                report.state
            );
            if !report.changed() {
                continue;
            }
            match report.state {
                ZoneState::Alarming => log::warn!(
                    "Guard zone {} alarm: {} bogeys",
                    report.zone + 1,
                    report.bogey_count
                ),
                ZoneState::ArmedSilent => log::info!(
                    "Guard zone {} occupied: {} bogeys",
                    report.zone + 1,
                    report.bogey_count
                ),
                ZoneState::Clear => log::info!("Guard zone {} clear", report.zone + 1),
            }
            self.session.zone_changed(*report);
        }
        reports
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), RadarError> {
        let mut rx_rotation = self.session.subscribe_rotations();

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::debug!("Guard zones: shutdown");
                    return Ok(());
                },
                r = rx_rotation.recv() => {
                    match r {
                        Ok(tick) => {
                            self.evaluate(tick.at);
                        }
                        Err(RecvError::Lagged(n)) => {
                            log::warn!("Guard zones skipped {} rotations", n);
                        }
                        Err(RecvError::Closed) => {
                            return Ok(());
                        }
                    }
                },
            }
        }
    }
}
