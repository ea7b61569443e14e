//! Outbound commands
//!
//! Commands are short fixed-format byte sequences sent to the radar's command
//! group. The radar (and any other display on the network) sees the same
//! bytes on the command channel, so every encoder here has a decoder that
//! recognises its output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

/// Family byte of commands sent to the radar
pub const COMMAND_FAMILY: u8 = 0xC1;

/// Family byte of report requests
pub const REQUEST_FAMILY: u8 = 0xC2;

/// Request report 0x02 and 0x08
pub const REQUEST_02_08_REPORT: [u8; 2] = [0x03, REQUEST_FAMILY];
/// Request report 0x03
pub const REQUEST_03_REPORT: [u8; 2] = [0x04, REQUEST_FAMILY];
/// Request report 0x04
pub const REQUEST_04_REPORT: [u8; 2] = [0x02, REQUEST_FAMILY];
/// Last datagram of the stay-alive sequence
pub const REQUEST_STAY_ALIVE: [u8; 2] = [0x05, REQUEST_FAMILY];
/// Keep the radar transmitting
pub const COMMAND_STAY_ON: [u8; 2] = [0xa0, COMMAND_FAMILY];

const TRANSMIT_PREPARE: [u8; 3] = [0x00, COMMAND_FAMILY, 0x01];
const TRANSMIT_ID: u8 = 0x01;
const RANGE_ID: u8 = 0x03;
const FILTER_ID: u8 = 0x06;

const FILTER_GAIN: u8 = 0x00;
const FILTER_SEA: u8 = 0x02;
const FILTER_RAIN: u8 = 0x04;

/// Controls that take a single integer value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlId {
    Gain,
    Sea,
    Rain,
    InterferenceRejection,
    TargetExpansion,
    TargetSeparation,
    NoiseRejection,
    TargetBoost,
    ScanSpeed,
}

impl ControlId {
    pub const ALL: [ControlId; 9] = [
        ControlId::Gain,
        ControlId::Sea,
        ControlId::Rain,
        ControlId::InterferenceRejection,
        ControlId::TargetExpansion,
        ControlId::TargetSeparation,
        ControlId::NoiseRejection,
        ControlId::TargetBoost,
        ControlId::ScanSpeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlId::Gain => "gain",
            ControlId::Sea => "sea",
            ControlId::Rain => "rain",
            ControlId::InterferenceRejection => "interferenceRejection",
            ControlId::TargetExpansion => "targetExpansion",
            ControlId::TargetSeparation => "targetSeparation",
            ControlId::NoiseRejection => "noiseRejection",
            ControlId::TargetBoost => "targetBoost",
            ControlId::ScanSpeed => "scanSpeed",
        }
    }

    /// Command id byte of the single byte controls
    fn simple_opcode(&self) -> Option<u8> {
        match self {
            ControlId::InterferenceRejection => Some(0x08),
            ControlId::TargetExpansion => Some(0x09),
            ControlId::TargetBoost => Some(0x0a),
            ControlId::ScanSpeed => Some(0x0f),
            ControlId::NoiseRejection => Some(0x21),
            ControlId::TargetSeparation => Some(0x22),
            ControlId::Gain | ControlId::Sea | ControlId::Rain => None,
        }
    }

    fn from_simple_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x08 => Some(ControlId::InterferenceRejection),
            0x09 => Some(ControlId::TargetExpansion),
            0x0a => Some(ControlId::TargetBoost),
            0x0f => Some(ControlId::ScanSpeed),
            0x21 => Some(ControlId::NoiseRejection),
            0x22 => Some(ControlId::TargetSeparation),
            _ => None,
        }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlId::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown control '{}'", s))
    }
}

/// A control value as carried in a set command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCommand {
    pub control: ControlId,
    /// Device-native value
    pub value: i32,
    /// Only meaningful for gain and sea
    pub auto: bool,
}

fn byte_value(value: i32) -> u8 {
    value.clamp(0, u8::MAX as i32) as u8
}

/// Encode a control set command.
///
/// Single byte controls clamp `value` to 0..=255; sea clutter carries the full
/// 32 bit value.
pub fn encode_control(control: ControlId, value: i32, auto: bool) -> Vec<u8> {
    match control {
        ControlId::Gain => {
            let mut cmd = vec![FILTER_ID, COMMAND_FAMILY, FILTER_GAIN, 0x00, 0x00, 0x00];
            cmd.extend_from_slice(&(auto as u32).to_le_bytes());
            cmd.push(byte_value(value));
            cmd
        }
        ControlId::Sea => {
            let mut cmd = vec![FILTER_ID, COMMAND_FAMILY, FILTER_SEA];
            cmd.extend_from_slice(&(auto as u32).to_be_bytes());
            cmd.extend_from_slice(&value.to_be_bytes());
            cmd
        }
        ControlId::Rain => vec![
            FILTER_ID,
            COMMAND_FAMILY,
            FILTER_RAIN,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            byte_value(value),
        ],
        simple => match simple.simple_opcode() {
            Some(opcode) => vec![opcode, COMMAND_FAMILY, byte_value(value)],
            None => Vec::new(),
        },
    }
}

fn too_short(expected: usize, data: &[u8]) -> DecodeError {
    DecodeError::TooShort {
        expected,
        actual: data.len(),
    }
}

/// Decode a control set command produced by [`encode_control`]
pub fn decode_control(data: &[u8]) -> Result<ControlCommand, DecodeError> {
    if data.len() < 3 {
        return Err(too_short(3, data));
    }
    if data[1] != COMMAND_FAMILY {
        return Err(DecodeError::InvalidHeader {
            expected: vec![data[0], COMMAND_FAMILY],
            actual: data[..2].to_vec(),
        });
    }

    if data[0] == FILTER_ID {
        if data.len() < 11 {
            return Err(too_short(11, data));
        }
        return match data[2] {
            FILTER_GAIN => Ok(ControlCommand {
                control: ControlId::Gain,
                value: data[10] as i32,
                auto: u32::from_le_bytes([data[6], data[7], data[8], data[9]]) != 0,
            }),
            FILTER_SEA => Ok(ControlCommand {
                control: ControlId::Sea,
                value: i32::from_be_bytes([data[7], data[8], data[9], data[10]]),
                auto: u32::from_be_bytes([data[3], data[4], data[5], data[6]]) != 0,
            }),
            FILTER_RAIN => Ok(ControlCommand {
                control: ControlId::Rain,
                value: data[10] as i32,
                auto: false,
            }),
            other => Err(DecodeError::InvalidPacket(format!(
                "Unknown filter command {:#04x}",
                other
            ))),
        };
    }

    match ControlId::from_simple_opcode(data[0]) {
        Some(control) => Ok(ControlCommand {
            control,
            value: data[2] as i32,
            auto: false,
        }),
        None => Err(DecodeError::InvalidPacket(format!(
            "Not a control command: {:02X?}",
            &data[..2]
        ))),
    }
}

/// The two datagrams that switch the transmitter on or off
pub fn transmit_commands(on: bool) -> [Vec<u8>; 2] {
    [
        TRANSMIT_PREPARE.to_vec(),
        vec![TRANSMIT_ID, COMMAND_FAMILY, on as u8],
    ]
}

/// Transmit state carried by a `01 C1 xx` record
pub fn decode_transmit(data: &[u8]) -> Option<bool> {
    match data {
        [TRANSMIT_ID, COMMAND_FAMILY, value, ..] => Some(*value != 0),
        _ => None,
    }
}

/// Datagrams sent periodically to keep the radar transmitting and reporting
pub fn stay_alive_commands() -> [Vec<u8>; 4] {
    [
        COMMAND_STAY_ON.to_vec(),
        REQUEST_02_08_REPORT.to_vec(),
        REQUEST_03_REPORT.to_vec(),
        REQUEST_STAY_ALIVE.to_vec(),
    ]
}

/// Range set command, range in decimeters
pub fn range_command(decimeters: i32) -> Vec<u8> {
    let mut cmd = vec![RANGE_ID, COMMAND_FAMILY];
    cmd.extend_from_slice(&decimeters.to_le_bytes());
    cmd
}

/// Range carried by a range set command
pub fn decode_range(data: &[u8]) -> Option<i32> {
    match data {
        [RANGE_ID, COMMAND_FAMILY, a, b, c, d, ..] => Some(i32::from_le_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Identifies which setting a command changes, so an echo can be matched to
/// the command that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CommandKey {
    pub id: u8,
    pub family: u8,
    /// Filter selector for the `06 C1` family, zero otherwise
    pub sub: u8,
}

impl CommandKey {
    pub fn of(data: &[u8]) -> Option<Self> {
        match data {
            [FILTER_ID, COMMAND_FAMILY, sub, ..] => Some(CommandKey {
                id: FILTER_ID,
                family: COMMAND_FAMILY,
                sub: *sub,
            }),
            [id, family, ..] => Some(CommandKey {
                id: *id,
                family: *family,
                sub: 0,
            }),
            _ => None,
        }
    }
}

/// Maps an operator facing value (usually 0..=100) to the device-native
/// value of a control and back. The mapping differs per generation and is
/// supplied by the caller.
pub trait TechnicalValueMap: Send + Sync {
    fn to_device(&self, control: ControlId, value: i32) -> i32;
    fn from_device(&self, control: ControlId, value: i32) -> i32;
}

/// Passes values through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMap;

impl TechnicalValueMap for IdentityMap {
    fn to_device(&self, _control: ControlId, value: i32) -> i32 {
        value
    }

    fn from_device(&self, _control: ControlId, value: i32) -> i32 {
        value
    }
}
