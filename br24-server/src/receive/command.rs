//! Command channel: echoes of commands sent to the radar

use br24_core::acks::AckOutcome;
use br24_core::protocol::report::decode_record;
use std::time::Duration;

use super::DatagramHandler;
use crate::{Channel, Session};

const MIN_EXPIRY_CHECK: Duration = Duration::from_millis(50);

pub struct CommandHandler {
    session: Session,
}

impl CommandHandler {
    pub fn new(session: Session) -> Self {
        CommandHandler { session }
    }
}

impl DatagramHandler for CommandHandler {
    fn channel(&self) -> Channel {
        Channel::Command
    }

    fn process(&mut self, data: &[u8], _now: u64) {
        let record = match decode_record(data) {
            Ok(record) => record,
            Err(e) => {
                self.session.inner.statistics.broken_command();
                log::debug!("Command record dropped: {}", e);
                return;
            }
        };

        let (outcome, transmit) = {
            let mut acks = self.session.acks();
            let before = acks.transmit();
            let outcome = acks.acknowledge(&record);
            let after = acks.transmit();
            (outcome, (before != after).then_some(after).flatten())
        };

        match outcome {
            Some(AckOutcome::Confirmed(key)) => {
                self.session.inner.statistics.command_ack();
                log::debug!("Command {:02X?} confirmed", key);
            }
            Some(AckOutcome::Unsolicited(key)) => {
                log::trace!("Command {:02X?} seen, not sent by us", key);
            }
            None => {
                self.session.inner.statistics.broken_command();
                log::debug!("Command record {:02X?} too short", data);
            }
        }
        if let Some(on) = transmit {
            log::info!("Radar transmit {}", if on { "on" } else { "off" });
        }
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some((self.session.config().ack_timeout() / 2).max(MIN_EXPIRY_CHECK))
    }

    fn tick(&mut self, now: u64) {
        let timeout = self.session.config().ack_timeout();
        for key in self.session.acks().expire(now, timeout) {
            log::warn!(
                "Command {:02X?} not confirmed within {} ms",
                key,
                timeout.as_millis()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use br24_core::protocol::command::{encode_control, transmit_commands, ControlId};
    use std::net::Ipv4Addr;

    fn handler() -> (Session, CommandHandler) {
        let session = Session::new(Config::default(), Ipv4Addr::UNSPECIFIED);
        (session.clone(), CommandHandler::new(session))
    }

    #[test]
    fn test_echo_confirms_sent_command() {
        let (session, mut handler) = handler();
        let gain = encode_control(ControlId::Gain, 60, true);
        session.acks().register(&gain, 0);

        handler.process(&gain, 10);
        assert_eq!(session.statistics().command_acks, 1);
        assert!(session.ack_status().pending.is_empty());

        // Second echo has nothing to confirm
        handler.process(&gain, 20);
        assert_eq!(session.statistics().command_acks, 1);
    }

    #[test]
    fn test_transmit_echo_updates_state() {
        let (session, mut handler) = handler();
        let [_, on] = transmit_commands(true);
        handler.process(&on, 10);
        assert_eq!(session.ack_status().transmit, Some(true));
        handler.process(&[], 10);
        assert_eq!(session.ack_status().transmit, Some(true));
    }

    #[test]
    fn test_short_datagrams_are_counted() {
        let (session, mut handler) = handler();
        handler.process(&[], 10);
        handler.process(&[0x01], 10);

        let stats = session.statistics();
        assert_eq!(stats.broken_commands, 2);
        assert_eq!(stats.command_acks, 0);
    }

    #[test]
    fn test_unconfirmed_commands_expire() {
        let (session, mut handler) = handler();
        session
            .acks()
            .register(&encode_control(ControlId::Rain, 3, false), 0);

        handler.tick(1_000);
        assert_eq!(session.ack_status().pending.len(), 1);
        handler.tick(2_001);
        assert!(session.ack_status().pending.is_empty());
        assert_eq!(session.ack_status().expired, 1);
    }
}
