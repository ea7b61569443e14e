//! Command acknowledgement
//!
//! The radar echoes accepted commands on the command channel. A sent command
//! stays pending until a record with the same [`CommandKey`] comes back or it
//! times out. Echoes of commands sent by other displays on the network show
//! up as unsolicited; they still update the transmit state.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::protocol::command::{decode_transmit, CommandKey};
use crate::protocol::report::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    bytes: Vec<u8>,
    sent_at: u64,
}

/// What a command channel record meant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Matched a command we sent
    Confirmed(CommandKey),
    /// Nothing of ours was waiting for it
    Unsolicited(CommandKey),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckStatus {
    pub pending: Vec<CommandKey>,
    pub transmit: Option<bool>,
    pub confirmed: u64,
    pub expired: u64,
}

#[derive(Debug, Default)]
pub struct CommandAcks {
    pending: HashMap<CommandKey, Pending>,
    transmit: Option<bool>,
    confirmed: u64,
    expired: u64,
}

impl CommandAcks {
    pub fn new() -> Self {
        CommandAcks::default()
    }

    /// Remember a sent command. A newer command for the same key replaces
    /// the older one.
    pub fn register(&mut self, bytes: &[u8], now: u64) -> Option<CommandKey> {
        let key = CommandKey::of(bytes)?;
        self.pending.insert(
            key,
            Pending {
                bytes: bytes.to_vec(),
                sent_at: now,
            },
        );
        Some(key)
    }

    /// Forget a command that was registered but never went out. A newer
    /// command registered under the same key since then is kept.
    pub fn withdraw(&mut self, bytes: &[u8]) -> bool {
        let Some(key) = CommandKey::of(bytes) else {
            return false;
        };
        match self.pending.get(&key) {
            Some(pending) if pending.bytes == bytes => {
                self.pending.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn acknowledge(&mut self, record: &Record) -> Option<AckOutcome> {
        let bytes = record.to_bytes();
        let key = CommandKey::of(&bytes)?;

        if let Some(on) = decode_transmit(&bytes) {
            self.transmit = Some(on);
        }

        match self.pending.remove(&key) {
            Some(_) => {
                self.confirmed += 1;
                Some(AckOutcome::Confirmed(key))
            }
            None => Some(AckOutcome::Unsolicited(key)),
        }
    }

    /// Drop commands that waited longer than `timeout`, returning their keys
    pub fn expire(&mut self, now: u64, timeout: Duration) -> Vec<CommandKey> {
        let limit = timeout.as_millis() as u64;
        let mut expired: Vec<CommandKey> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_sub(p.sent_at) > limit)
            .map(|(k, _)| *k)
            .collect();
        expired.sort();
        for key in &expired {
            self.pending.remove(key);
        }
        self.expired += expired.len() as u64;
        expired
    }

    pub fn is_pending(&self, key: &CommandKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_bytes(&self, key: &CommandKey) -> Option<&[u8]> {
        self.pending.get(key).map(|p| p.bytes.as_slice())
    }

    /// Transmitter state last seen on the command channel
    pub fn transmit(&self) -> Option<bool> {
        self.transmit
    }

    pub fn status(&self) -> AckStatus {
        let mut pending: Vec<CommandKey> = self.pending.keys().copied().collect();
        pending.sort();
        AckStatus {
            pending,
            transmit: self.transmit,
            confirmed: self.confirmed,
            expired: self.expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{encode_control, transmit_commands, ControlId};
    use crate::protocol::report::decode_record;

    #[test]
    fn test_withdraw_only_matching_command() {
        let mut acks = CommandAcks::new();
        let low = encode_control(ControlId::Gain, 10, false);
        let high = encode_control(ControlId::Gain, 90, false);
        let key = acks.register(&low, 100).unwrap();
        acks.register(&high, 110);

        assert!(!acks.withdraw(&low));
        assert!(acks.is_pending(&key));
        assert!(acks.withdraw(&high));
        assert!(!acks.is_pending(&key));
        assert!(!acks.withdraw(&[]));
    }

    #[test]
    fn test_echo_confirms_pending() {
        let mut acks = CommandAcks::new();
        let gain = encode_control(ControlId::Gain, 50, false);
        let key = acks.register(&gain, 100).unwrap();
        assert!(acks.is_pending(&key));

        let echo = decode_record(&gain).unwrap();
        assert_eq!(acks.acknowledge(&echo), Some(AckOutcome::Confirmed(key)));
        assert!(!acks.is_pending(&key));
        assert_eq!(acks.acknowledge(&echo), Some(AckOutcome::Unsolicited(key)));
        assert_eq!(acks.status().confirmed, 1);
    }

    #[test]
    fn test_filter_commands_are_told_apart() {
        let mut acks = CommandAcks::new();
        let gain = acks
            .register(&encode_control(ControlId::Gain, 10, false), 0)
            .unwrap();
        let rain = acks
            .register(&encode_control(ControlId::Rain, 10, false), 0)
            .unwrap();
        assert_ne!(gain, rain);

        let echo = decode_record(&encode_control(ControlId::Rain, 12, false)).unwrap();
        assert_eq!(acks.acknowledge(&echo), Some(AckOutcome::Confirmed(rain)));
        assert!(acks.is_pending(&gain));
    }

    #[test]
    fn test_transmit_state_follows_echo() {
        let mut acks = CommandAcks::new();
        assert_eq!(acks.transmit(), None);
        for bytes in transmit_commands(true) {
            acks.register(&bytes, 0);
        }
        let [prepare, on] = transmit_commands(true);
        acks.acknowledge(&decode_record(&prepare).unwrap());
        assert_eq!(acks.transmit(), None);
        acks.acknowledge(&decode_record(&on).unwrap());
        assert_eq!(acks.transmit(), Some(true));

        let [_, off] = transmit_commands(false);
        assert!(matches!(
            acks.acknowledge(&decode_record(&off).unwrap()),
            Some(AckOutcome::Unsolicited(_))
        ));
        assert_eq!(acks.transmit(), Some(false));
    }

    #[test]
    fn test_expire() {
        let mut acks = CommandAcks::new();
        let old = acks
            .register(&encode_control(ControlId::Gain, 1, false), 0)
            .unwrap();
        let new = acks
            .register(&encode_control(ControlId::Sea, 1, false), 900)
            .unwrap();

        let expired = acks.expire(1_500, Duration::from_secs(1));
        assert_eq!(expired, vec![old]);
        assert!(acks.is_pending(&new));
        assert_eq!(acks.status().expired, 1);
        assert_eq!(acks.status().pending, vec![new]);
    }

    #[test]
    fn test_reregister_replaces() {
        let mut acks = CommandAcks::new();
        acks.register(&encode_control(ControlId::Gain, 1, false), 0);
        let key = acks
            .register(&encode_control(ControlId::Gain, 2, false), 10)
            .unwrap();
        assert_eq!(acks.status().pending.len(), 1);
        assert_eq!(
            acks.pending_bytes(&key),
            Some(encode_control(ControlId::Gain, 2, false).as_slice())
        );
    }

    #[test]
    fn test_short_record_is_ignored() {
        let mut acks = CommandAcks::new();
        let record = decode_record(&[0x01]).unwrap();
        assert_eq!(acks.acknowledge(&record), None);
    }
}
