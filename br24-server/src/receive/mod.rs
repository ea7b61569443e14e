//! Multicast receive loops
//!
//! Each channel runs one [`Listener`] in its own subsystem. The listener owns
//! the socket and the receive loop; what a datagram means is up to its
//! [`DatagramHandler`]. Decoding and bookkeeping in the handlers never await.

use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::network::create_udp_listen;
use crate::radar::RadarError;
use crate::{now_millis, Channel, ChannelStatus, Session};

pub mod command;
pub mod data;
pub mod report;

/// Largest UDP payload
const MAX_DATAGRAM_SIZE: usize = 65535;

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365);

pub trait DatagramHandler: Send + 'static {
    fn channel(&self) -> Channel;

    fn process(&mut self, data: &[u8], now: u64);

    /// How often [`tick`](Self::tick) runs while no datagram arrives
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    fn tick(&mut self, _now: u64) {}
}

pub struct Listener<H> {
    session: Session,
    addr: SocketAddrV4,
    handler: H,
}

impl<H: DatagramHandler> Listener<H> {
    pub fn new(session: Session, addr: SocketAddrV4, handler: H) -> Self {
        Listener {
            session,
            addr,
            handler,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn start_socket(&self) -> Result<UdpSocket, RadarError> {
        let channel = self.handler.channel();
        let nic_addr = self.session.nic_addr();
        match create_udp_listen(&self.addr, &nic_addr) {
            Ok(sock) => {
                log::debug!(
                    "{} via {}: listening for {} datagrams",
                    self.addr,
                    nic_addr,
                    channel
                );
                Ok(sock)
            }
            Err(source) => Err(RadarError::Bind {
                channel,
                addr: self.addr,
                source,
            }),
        }
    }

    /// Receive until shutdown is requested.
    ///
    /// A socket that cannot be opened ends this channel only; the status
    /// records why and the other channels keep running.
    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), RadarError> {
        let channel = self.handler.channel();
        self.session
            .set_channel_status(channel, ChannelStatus::Starting);

        let sock = match self.start_socket() {
            Ok(sock) => sock,
            Err(e) => {
                log::error!("{}", e);
                self.session.set_channel_status(
                    channel,
                    ChannelStatus::Failed {
                        reason: e.to_string(),
                    },
                );
                return Ok(());
            }
        };

        match sock.local_addr() {
            Ok(local) => self
                .session
                .set_channel_status(channel, ChannelStatus::Listening { local }),
            Err(e) => {
                log::warn!("{}: cannot read local address: {}", channel, e);
            }
        }

        let result = self.socket_loop(&subsys, &sock).await;
        drop(sock);
        self.session.set_channel_status(channel, ChannelStatus::Stopped);
        result
    }

    async fn socket_loop(
        &mut self,
        subsys: &SubsystemHandle,
        sock: &UdpSocket,
    ) -> Result<(), RadarError> {
        let channel = self.handler.channel();
        let interval = self.handler.tick_interval();
        let mut next_tick = Instant::now() + interval.unwrap_or(FAR_FUTURE);
        let mut buf = Vec::with_capacity(MAX_DATAGRAM_SIZE);
        log::trace!("{}: starting socket loop on {}", channel, self.addr);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::debug!("{}: shutdown", channel);
                    return Ok(());
                },

                _ = sleep_until(next_tick) => {
                    self.handler.tick(now_millis());
                    next_tick = Instant::now() + interval.unwrap_or(FAR_FUTURE);
                },

                r = sock.recv_buf_from(&mut buf) => {
                    match r {
                        Ok((len, addr)) => {
                            log::trace!("{}: {} bytes from {}", channel, len, addr);
                            self.handler.process(&buf, now_millis());
                        }
                        Err(e) => {
                            self.session.inner.statistics.socket_error();
                            log::warn!("{}: receive error: {}", channel, e);
                            sleep(RECEIVE_ERROR_BACKOFF).await;
                        }
                    }
                    buf.clear();
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use br24_core::protocol::command::{encode_control, ControlId};
    use br24_core::protocol::spoke::{encode_frame, SpokeHeader};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::{Arc, Mutex};
    use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

    fn loopback_config() -> Config {
        let any = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
        Config {
            data_addr: any,
            report_addr: any,
            command_addr: any,
            send_addr: any,
            liveness_timeout_ms: 200,
            ..Config::default()
        }
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, f: F) {
        for _ in 0..200 {
            if f() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    fn local_addr(session: &Session, channel: Channel) -> Option<SocketAddr> {
        match session.channel_status(channel) {
            Some(ChannelStatus::Listening { local }) => Some(local),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_channels_stop_on_shutdown() {
        let session = Session::new(loopback_config(), Ipv4Addr::LOCALHOST);
        let s2 = session.clone();
        let bound = Arc::new(Mutex::new(Vec::new()));
        let bound2 = bound.clone();

        let result = Toplevel::new(move |s| async move {
            s.start(SubsystemBuilder::new("Radar", move |s| async move {
                s2.start(&s);
                let s3 = s2.clone();
                wait_for("all channels listening", move || {
                    [Channel::Data, Channel::Report, Channel::Command]
                        .iter()
                        .all(|c| local_addr(&s3, *c).is_some())
                })
                .await;
                bound2.lock().unwrap().extend(
                    [Channel::Data, Channel::Report, Channel::Command]
                        .iter()
                        .filter_map(|c| local_addr(&s2, *c)),
                );
                s.request_shutdown();
                Ok::<(), RadarError>(())
            }));
        })
        .handle_shutdown_requests(Duration::from_millis(2000))
        .await;

        assert!(result.is_ok());
        for channel in [Channel::Data, Channel::Report, Channel::Command] {
            assert_eq!(session.channel_status(channel), Some(ChannelStatus::Stopped));
        }

        // The listeners set SO_REUSEADDR; a plain bind only succeeds once
        // their sockets are closed
        let bound = bound.lock().unwrap();
        assert_eq!(bound.len(), 3);
        for addr in bound.iter() {
            assert!(std::net::UdpSocket::bind(addr).is_ok(), "{} still bound", addr);
        }
    }

    #[tokio::test]
    async fn test_datagrams_reach_the_session() {
        let session = Session::new(loopback_config(), Ipv4Addr::LOCALHOST);
        let s2 = session.clone();

        let result = Toplevel::new(move |s| async move {
            s.start(SubsystemBuilder::new("Radar", move |s| async move {
                s2.start(&s);
                let s3 = s2.clone();
                wait_for("all channels listening", move || {
                    [Channel::Data, Channel::Report, Channel::Command]
                        .iter()
                        .all(|c| local_addr(&s3, *c).is_some())
                })
                .await;

                let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
                let data = local_addr(&s2, Channel::Data).unwrap();
                let report = local_addr(&s2, Channel::Report).unwrap();
                let command = local_addr(&s2, Channel::Command).unwrap();

                let frame = encode_frame(&[
                    (SpokeHeader::br24(10, 0x0100), [200u8; 512]),
                    (SpokeHeader::br24(11, 0x0100), [100u8; 512]),
                ]);
                sender.send_to(&frame, data).await?;

                let mut status = vec![0u8; 18];
                status[..3].copy_from_slice(&[0x01, 0xc4, 0x01]);
                sender.send_to(&status, report).await?;

                let gain = encode_control(ControlId::Gain, 40, false);
                s2.acks().register(&gain, now_millis());
                sender.send_to(&gain, command).await?;

                let s4 = s2.clone();
                wait_for("datagrams processed", move || {
                    let stats = s4.statistics();
                    stats.spokes == 2 && stats.reports == 1 && stats.command_acks == 1
                })
                .await;

                s.request_shutdown();
                Ok::<(), RadarError>(())
            }));
        })
        .handle_shutdown_requests(Duration::from_millis(2000))
        .await;

        assert!(result.is_ok());
        let line = session.buffer().read(10, now_millis()).fresh().unwrap();
        assert_eq!(line.returns[0], 200);
        assert_eq!(line.range_decimeters, 18102);
        assert_eq!(session.state().power, br24_core::PowerState::Standby);
        assert_eq!(session.ack_status().pending, vec![]);
    }

    #[tokio::test]
    async fn test_bind_failure_ends_only_that_channel() {
        let config = Config {
            // Not a local address, binding fails
            data_addr: SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 0),
            ..loopback_config()
        };
        let session = Session::new(config, Ipv4Addr::LOCALHOST);
        let s2 = session.clone();

        let result = Toplevel::new(move |s| async move {
            s.start(SubsystemBuilder::new("Radar", move |s| async move {
                s2.start(&s);
                let s3 = s2.clone();
                wait_for("data channel failed", move || {
                    matches!(
                        s3.channel_status(Channel::Data),
                        Some(ChannelStatus::Failed { .. })
                    ) && local_addr(&s3, Channel::Report).is_some()
                })
                .await;
                s.request_shutdown();
                Ok::<(), RadarError>(())
            }));
        })
        .handle_shutdown_requests(Duration::from_millis(2000))
        .await;

        assert!(result.is_ok());
        assert!(matches!(
            session.channel_status(Channel::Data),
            Some(ChannelStatus::Failed { .. })
        ));
        assert_eq!(
            session.channel_status(Channel::Report),
            Some(ChannelStatus::Stopped)
        );
    }
}
