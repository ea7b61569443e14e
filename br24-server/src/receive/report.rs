//! Report channel: radar state and liveness

use anyhow::Error;
use br24_core::protocol::report::decode_report;
use br24_core::state::{Liveness, ReportOutcome};
use std::time::Duration;

use super::DatagramHandler;
use crate::{Channel, Session};

const MIN_LIVENESS_CHECK: Duration = Duration::from_millis(50);

pub struct ReportHandler {
    session: Session,
}

impl ReportHandler {
    pub fn new(session: Session) -> Self {
        ReportHandler { session }
    }

    fn process_report(&mut self, data: &[u8], now: u64) -> Result<(), Error> {
        let statistics = &self.session.inner.statistics;

        let report = match decode_report(data) {
            Ok(report) => report,
            Err(e) => {
                // A report we cannot read still shows the radar is there
                self.session.with_state(|state| state.touch(now));
                statistics.broken_report();
                return Err(anyhow::anyhow!(
                    "Report {:02X?} dropped: {}",
                    &data[..data.len().min(2)],
                    e
                ));
            }
        };
        log::trace!("Report {:?}", report);

        match self.session.with_state(|state| state.apply_report(&report, now)) {
            ReportOutcome::Applied => {
                statistics.report();
            }
            ReportOutcome::GenerationChanged(generation) => {
                statistics.report();
                log::info!("Radar generation is {}", generation);
            }
            ReportOutcome::Ignored { id } => {
                statistics.unknown_report();
                log::debug!("Ignoring report {:#04x} of {} bytes", id, data.len());
            }
        }
        Ok(())
    }

    fn check_liveness(&mut self, now: u64) {
        let timeout = self.session.config().liveness_timeout();
        let change = self
            .session
            .with_state(|state| state.update_liveness(now, timeout));
        match change {
            Some(Liveness::Present) => log::info!("Radar is present"),
            Some(Liveness::Absent) => {
                log::warn!("No reports for {} ms, radar is absent", timeout.as_millis())
            }
            None => {}
        }
    }
}

impl DatagramHandler for ReportHandler {
    fn channel(&self) -> Channel {
        Channel::Report
    }

    fn process(&mut self, data: &[u8], now: u64) {
        if let Err(e) = self.process_report(data, now) {
            log::warn!("{}", e);
        }
        self.check_liveness(now);
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some((self.session.config().liveness_timeout() / 2).max(MIN_LIVENESS_CHECK))
    }

    fn tick(&mut self, now: u64) {
        self.check_liveness(now);
    }
}
