//! Error types for protocol decoding and configuration

use thiserror::Error;

/// Errors that can occur when decoding radar datagrams
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Datagram or record is too short to contain required data
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Record has no bytes at all
    #[error("Empty record")]
    Empty,

    /// Spoke header length byte is not 24
    #[error("Invalid spoke header length: {0}")]
    InvalidHeaderLength(u8),

    /// Spoke status byte is neither 0x02 nor 0x12
    #[error("Invalid spoke status: {0:#04x}")]
    InvalidStatus(u8),

    /// Report header doesn't match expected format
    #[error("Invalid header: expected {expected:02X?}, got {actual:02X?}")]
    InvalidHeader { expected: Vec<u8>, actual: Vec<u8> },

    /// Failed to deserialize packet structure
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Invalid packet data
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),
}

impl From<bincode::Error> for DecodeError {
    fn from(e: bincode::Error) -> Self {
        DecodeError::DeserializationFailed(e.to_string())
    }
}

/// Errors for operator supplied settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Guard zone inner range {inner} dm must be less than outer range {outer} dm")]
    InvalidZoneRange { inner: u32, outer: u32 },

    #[error("Only {max} guard zones can be configured, got {actual}")]
    TooManyZones { max: usize, actual: usize },

    #[error("Range table must contain at least one value")]
    EmptyRangeTable,

    #[error("Range table must be strictly increasing")]
    UnorderedRangeTable,
}
