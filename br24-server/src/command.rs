//! Commands to the radar
//!
//! [`CommandSender`] opens its socket on first use. Commands that change a
//! setting are registered with the session's acknowledgement tracker; report
//! requests and stay-alives are not echoed and are sent fire and forget.

use br24_core::protocol::command::{
    encode_control, range_command, stay_alive_commands, transmit_commands, ControlId,
};
use br24_core::range::RangeConversion;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::network::create_multicast_send;
use crate::radar::RadarError;
use crate::{now_millis, Session};

pub struct CommandSender {
    session: Session,
    sock: Option<UdpSocket>,
}

impl CommandSender {
    pub fn new(session: Session) -> Self {
        CommandSender {
            session,
            sock: None,
        }
    }

    fn start_socket(&mut self) -> Result<&UdpSocket, RadarError> {
        if self.sock.is_none() {
            let addr = self.session.config().send_addr;
            let nic_addr = self.session.nic_addr();
            match create_multicast_send(&addr, &nic_addr) {
                Ok(sock) => {
                    log::debug!("{} via {}: sending commands", addr, nic_addr);
                    self.sock = Some(sock);
                }
                Err(e) => {
                    log::debug!(
                        "{} via {}: create multicast failed: {}",
                        addr,
                        nic_addr,
                        e
                    );
                    return Err(RadarError::Io(e));
                }
            }
        }
        self.sock.as_ref().ok_or(RadarError::Shutdown)
    }

    async fn send_raw(&mut self, message: &[u8]) -> Result<(), RadarError> {
        let result = self.start_socket()?.send(message).await;
        if let Err(e) = result {
            // Reopen on the next send
            self.sock = None;
            return Err(RadarError::Io(e));
        }
        log::trace!("sent {:02X?}", message);
        Ok(())
    }

    /// Send a command that the radar echoes on the command channel.
    ///
    /// It is pending before it goes out, so an echo can never beat it.
    pub async fn send_command(&mut self, message: &[u8]) -> Result<(), RadarError> {
        self.session.acks().register(message, now_millis());
        let result = self.send_raw(message).await;
        if result.is_err() {
            self.session.acks().withdraw(message);
        }
        result
    }

    /// Send a request that is not echoed
    pub async fn send_request(&mut self, message: &[u8]) -> Result<(), RadarError> {
        self.send_raw(message).await
    }

    pub async fn set_transmit(&mut self, on: bool) -> Result<(), RadarError> {
        log::info!("Switching radar transmit {}", if on { "on" } else { "off" });
        for message in transmit_commands(on) {
            self.send_command(&message).await?;
        }
        Ok(())
    }

    pub async fn stay_alive(&mut self) -> Result<(), RadarError> {
        for message in stay_alive_commands() {
            self.send_request(&message).await?;
        }
        Ok(())
    }

    /// Set the range to the smallest supported step covering `requested_m`
    pub async fn set_range(&mut self, requested_m: u32) -> Result<RangeConversion, RadarError> {
        let range = self.session.range_table().convert(requested_m);
        if range.clamped {
            log::warn!(
                "Requested range {} m exceeds the radar maximum, using {} m",
                requested_m,
                range.meters
            );
        }
        log::debug!(
            "Range {} m -> {} m ({:.3} {})",
            requested_m,
            range.meters,
            range.display,
            range.unit
        );
        self.send_command(&range_command(range.decimeters())).await?;
        Ok(range)
    }

    /// Set a control from an operator value, mapped to the device value
    pub async fn set_control(
        &mut self,
        control: ControlId,
        value: i32,
        auto: bool,
    ) -> Result<(), RadarError> {
        let device_value = self.session.value_map().to_device(control, value);
        log::debug!(
            "Set {} to {} (device {}){}",
            control,
            value,
            device_value,
            if auto { " auto" } else { "" }
        );
        self.send_command(&encode_control(control, device_value, auto))
            .await
    }
}

/// Periodically sends the stay-alive sequence
pub struct KeepAlive {
    session: Session,
}

impl KeepAlive {
    pub fn new(session: Session) -> Self {
        KeepAlive { session }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), RadarError> {
        let mut sender = self.session.command_sender();
        let mut ticker = interval(self.session.config().keep_alive_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::debug!("Keep-alive started");

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::debug!("Keep-alive: shutdown");
                    return Ok(());
                },
                _ = ticker.tick() => {
                    if let Err(e) = sender.stay_alive().await {
                        log::warn!("Keep-alive not sent: {}", e);
                    }
                },
            }
        }
    }
}
