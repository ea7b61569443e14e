//! Receive statistics
//!
//! Counters only ever go up for the life of a session. They are atomics so the
//! three channels can bump them without sharing a lock, and consumers read a
//! [`StatisticsSnapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::spoke_buffer::AngleStep;

#[derive(Debug, Default)]
pub struct ReceiveStatistics {
    packets: AtomicU64,
    broken_packets: AtomicU64,
    spokes: AtomicU64,
    rejected_spokes: AtomicU64,
    broken_spokes: AtomicU64,
    missing_spokes: AtomicU64,
    rotations: AtomicU64,
    reports: AtomicU64,
    unknown_reports: AtomicU64,
    broken_reports: AtomicU64,
    command_acks: AtomicU64,
    broken_commands: AtomicU64,
    socket_errors: AtomicU64,
}

/// Point in time copy of [`ReceiveStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub packets: u64,
    pub broken_packets: u64,
    pub spokes: u64,
    pub rejected_spokes: u64,
    pub broken_spokes: u64,
    pub missing_spokes: u64,
    pub rotations: u64,
    pub reports: u64,
    pub unknown_reports: u64,
    pub broken_reports: u64,
    pub command_acks: u64,
    pub broken_commands: u64,
    pub socket_errors: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl ReceiveStatistics {
    pub fn new() -> Self {
        ReceiveStatistics::default()
    }

    pub fn packet(&self) {
        bump(&self.packets, 1);
    }

    /// A data datagram that yielded no spokes at all
    pub fn broken_packet(&self) {
        bump(&self.broken_packets, 1);
    }

    /// A spoke record that could not be decoded: bad header length, bad
    /// status, or cut off by the end of the datagram
    pub fn rejected_spoke(&self) {
        bump(&self.rejected_spokes, 1);
    }

    /// Account for an accepted spoke and its position relative to the previous one.
    ///
    /// Returns true when the step completed a rotation.
    pub fn spoke(&self, step: AngleStep) -> bool {
        bump(&self.spokes, 1);
        match step {
            AngleStep::First | AngleStep::Consecutive => false,
            AngleStep::Missing(n) => {
                bump(&self.missing_spokes, n as u64);
                false
            }
            AngleStep::Wrapped { missing } => {
                bump(&self.missing_spokes, missing as u64);
                bump(&self.rotations, 1);
                true
            }
            AngleStep::Broken => {
                bump(&self.broken_spokes, 1);
                false
            }
        }
    }

    pub fn report(&self) {
        bump(&self.reports, 1);
    }

    pub fn unknown_report(&self) {
        bump(&self.unknown_reports, 1);
    }

    pub fn broken_report(&self) {
        bump(&self.broken_reports, 1);
    }

    pub fn command_ack(&self) {
        bump(&self.command_acks, 1);
    }

    /// A command channel datagram too short to carry a command
    pub fn broken_command(&self) {
        bump(&self.broken_commands, 1);
    }

    pub fn socket_error(&self) {
        bump(&self.socket_errors, 1);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatisticsSnapshot {
            packets: get(&self.packets),
            broken_packets: get(&self.broken_packets),
            spokes: get(&self.spokes),
            rejected_spokes: get(&self.rejected_spokes),
            broken_spokes: get(&self.broken_spokes),
            missing_spokes: get(&self.missing_spokes),
            rotations: get(&self.rotations),
            reports: get(&self.reports),
            unknown_reports: get(&self.unknown_reports),
            broken_reports: get(&self.broken_reports),
            command_acks: get(&self.command_acks),
            broken_commands: get(&self.broken_commands),
            socket_errors: get(&self.socket_errors),
        }
    }
}
