use br24_core::ConfigError;
use std::net::SocketAddrV4;
use thiserror::Error;

use crate::Channel;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("{channel}: cannot listen on {addr}: {source}")]
    Bind {
        channel: Channel,
        addr: SocketAddrV4,
        source: std::io::Error,
    },
    #[error("Interface '{0}' is not available")]
    InterfaceNotFound(String),
    #[error("Interface '{0}' has no valid IPv4 address")]
    InterfaceNoV4(String),
    #[error("Cannot detect Ethernet devices")]
    EnumerationFailed,
    #[error("{0}")]
    Config(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Shutdown")]
    Shutdown,
}
