//! Report channel records
//!
//! Every record on the report and command channels starts with an id byte,
//! followed by a family byte (0xC4 for reports, 0xC1/0xC2 for commands) and a
//! payload whose layout depends on the id. [`decode_record`] is the generic
//! split; [`decode_report`] interprets the report ids we know about and
//! passes everything else through as [`Report::Unknown`].

use serde::{Deserialize, Serialize};

use super::command::ControlId;
use super::wide_string;
use crate::error::DecodeError;

/// Family byte of reports sent by the radar
pub const REPORT_FAMILY: u8 = 0xC4;

/// Generic tag-prefixed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u8,
    pub payload: Vec<u8>,
}

impl Record {
    /// Second byte of the record, if present
    pub fn family(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 1);
        out.push(self.id);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Split a record into id and payload
pub fn decode_record(data: &[u8]) -> Result<Record, DecodeError> {
    match data.split_first() {
        Some((&id, payload)) => Ok(Record {
            id,
            payload: payload.to_vec(),
        }),
        None => Err(DecodeError::Empty),
    }
}

/// Known Navico radar models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    Unknown,
    BR24,
    Gen3,
    Gen4,
    HALO,
}

impl Model {
    /// Parse model from model byte in report 0x03
    pub fn from_byte(model: u8) -> Self {
        match model {
            0x0e | 0x0f => Model::BR24,
            0x08 => Model::Gen3,
            0x01 => Model::Gen4,
            0x00 => Model::HALO,
            _ => Model::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Unknown => "Unknown",
            Model::BR24 => "BR24",
            Model::Gen3 => "3G",
            Model::Gen4 => "4G",
            Model::HALO => "HALO",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state as reported in report 0x01
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RadarStatus {
    Off,
    Standby,
    Transmit,
    WarmingUp,
}

impl RadarStatus {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(RadarStatus::Off),
            1 => Some(RadarStatus::Standby),
            2 => Some(RadarStatus::Transmit),
            5 => Some(RadarStatus::WarmingUp),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report01 {
    what: u8,
    command: u8,
    status: u8,
    _u00: [u8; 15],
}

const REPORT_01_SIZE: usize = 18;

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report02 {
    what: u8,
    command: u8,
    range: [u8; 4],             // 2..6 decimeters
    _u00: u8,                   // 6
    mode: u8,                   // 7
    gain_auto: u8,              // 8
    _u01: [u8; 3],              // 9..12
    gain: u8,                   // 12
    sea_auto: u8,               // 13
    _u02: [u8; 3],              // 14..17
    sea: [u8; 4],               // 17..21
    _u03: u8,                   // 21
    rain: u8,                   // 22
    _u04: [u8; 11],             // 23..34
    interference_rejection: u8, // 34
    _u05: [u8; 3],              // 35..38
    target_expansion: u8,       // 38
    _u06: [u8; 3],              // 39..42
    target_boost: u8,           // 42
    _u07: [u8; 32],             // 43..75
    _u08: [u8; 24],             // 75..99
}

const REPORT_02_SIZE: usize = 99;

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report03 {
    what: u8,
    command: u8,
    model: u8,
    _u00: [u8; 31],              // 3..34
    hours: [u8; 4],              // 34..38
    _u01: [u8; 4],               // 38..42
    transmit_seconds: [u8; 4],   // 42..46
    _u02: [u8; 12],              // 46..58
    firmware_date: [u8; 32],     // 58..90 UTF-16
    firmware_time: [u8; 32],     // 90..122 UTF-16
    _u03: [u8; 7],               // 122..129
}

const REPORT_03_SIZE: usize = 129;

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report04 {
    what: u8,
    command: u8,
    _u00: [u8; 4],              // 2..6
    bearing_alignment: [u8; 2], // 6..8 deci-degrees
    _u01: [u8; 2],              // 8..10
    antenna_height: [u8; 2],    // 10..12 decimeters
    _u02: [u8; 32],             // 12..44
    _u03: [u8; 22],             // 44..66
}

const REPORT_04_SIZE: usize = 66;

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report08 {
    what: u8,
    command: u8,
    sea_state: u8,              // 2
    interference_rejection: u8, // 3
    scan_speed: u8,             // 4
    sls_auto: u8,               // 5
    _u00: [u8; 3],              // 6..9
    side_lobe_suppression: u8,  // 9
    _u01: [u8; 2],              // 10..12
    noise_rejection: u8,        // 12
    target_separation: u8,      // 13
    _u02: [u8; 4],              // 14..18
}

const REPORT_08_SIZE: usize = 18;

/// Report 0x02
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    pub range_decimeters: i32,
    pub mode: u8,
    pub gain: u8,
    pub gain_auto: bool,
    pub sea: i32,
    pub sea_auto: u8,
    pub rain: u8,
    pub interference_rejection: u8,
    pub target_expansion: u8,
    pub target_boost: u8,
}

/// Report 0x03
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model: Model,
    pub model_byte: u8,
    pub operating_hours: u32,
    pub transmit_hours: f64,
    pub firmware_date: Option<String>,
    pub firmware_time: Option<String>,
}

/// Report 0x04
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub bearing_alignment: i16,
    pub antenna_height: u16,
}

/// Report 0x08
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSettings {
    pub sea_state: u8,
    pub local_interference_rejection: u8,
    pub scan_speed: u8,
    pub sidelobe_suppression_auto: bool,
    pub sidelobe_suppression: u8,
    pub noise_rejection: u8,
    pub target_separation: u8,
}

/// A decoded report
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Status(RadarStatus),
    Controls(Controls),
    ModelInfo(ModelInfo),
    Installation(Installation),
    Advanced(AdvancedSettings),
    /// Id we do not interpret; counted and ignored
    Unknown { id: u8, family: u8, len: usize },
}

impl Report {
    /// Control values carried by this report, keyed the same way as commands
    pub fn control_values(&self) -> Vec<(ControlId, i32)> {
        match self {
            Report::Controls(c) => vec![
                (ControlId::Gain, c.gain as i32),
                (ControlId::Sea, c.sea),
                (ControlId::Rain, c.rain as i32),
                (ControlId::InterferenceRejection, c.interference_rejection as i32),
                (ControlId::TargetExpansion, c.target_expansion as i32),
                (ControlId::TargetBoost, c.target_boost as i32),
            ],
            Report::Advanced(a) => vec![
                (ControlId::ScanSpeed, a.scan_speed as i32),
                (ControlId::NoiseRejection, a.noise_rejection as i32),
                (ControlId::TargetSeparation, a.target_separation as i32),
            ],
            _ => Vec::new(),
        }
    }
}

fn check_length(data: &[u8], size: usize) -> Result<(), DecodeError> {
    if data.len() < size {
        return Err(DecodeError::TooShort {
            expected: size,
            actual: data.len(),
        });
    }
    Ok(())
}

fn check_header(what: u8, command: u8, id: u8) -> Result<(), DecodeError> {
    if what != id || command != REPORT_FAMILY {
        return Err(DecodeError::InvalidHeader {
            expected: vec![id, REPORT_FAMILY],
            actual: vec![what, command],
        });
    }
    Ok(())
}

/// Parse report 0x01 (status)
pub fn parse_report_01(data: &[u8]) -> Result<RadarStatus, DecodeError> {
    check_length(data, REPORT_01_SIZE)?;
    let report: Report01 = bincode::deserialize(&data[..REPORT_01_SIZE])?;
    check_header(report.what, report.command, 0x01)?;

    RadarStatus::from_byte(report.status).ok_or(DecodeError::InvalidPacket(format!(
        "Unknown status: {}",
        report.status
    )))
}

/// Parse report 0x02 (controls)
pub fn parse_report_02(data: &[u8]) -> Result<Controls, DecodeError> {
    check_length(data, REPORT_02_SIZE)?;
    let report: Report02 = bincode::deserialize(&data[..REPORT_02_SIZE])?;
    check_header(report.what, report.command, 0x02)?;

    Ok(Controls {
        range_decimeters: i32::from_le_bytes(report.range),
        mode: report.mode,
        gain: report.gain,
        gain_auto: report.gain_auto > 0,
        sea: i32::from_le_bytes(report.sea),
        sea_auto: report.sea_auto,
        rain: report.rain,
        interference_rejection: report.interference_rejection,
        target_expansion: report.target_expansion,
        target_boost: report.target_boost,
    })
}

/// Parse report 0x03 (model info)
pub fn parse_report_03(data: &[u8]) -> Result<ModelInfo, DecodeError> {
    check_length(data, REPORT_03_SIZE)?;
    let report: Report03 = bincode::deserialize(&data[..REPORT_03_SIZE])?;
    check_header(report.what, report.command, 0x03)?;

    let transmit_seconds = u32::from_le_bytes(report.transmit_seconds);

    Ok(ModelInfo {
        model: Model::from_byte(report.model),
        model_byte: report.model,
        operating_hours: u32::from_le_bytes(report.hours),
        transmit_hours: transmit_seconds as f64 / 3600.0,
        firmware_date: wide_string(&report.firmware_date),
        firmware_time: wide_string(&report.firmware_time),
    })
}

/// Parse report 0x04 (installation)
pub fn parse_report_04(data: &[u8]) -> Result<Installation, DecodeError> {
    check_length(data, REPORT_04_SIZE)?;
    let report: Report04 = bincode::deserialize(&data[..REPORT_04_SIZE])?;
    check_header(report.what, report.command, 0x04)?;

    Ok(Installation {
        bearing_alignment: i16::from_le_bytes(report.bearing_alignment),
        antenna_height: u16::from_le_bytes(report.antenna_height),
    })
}

/// Parse report 0x08 (advanced settings), 18 bytes or longer
pub fn parse_report_08(data: &[u8]) -> Result<AdvancedSettings, DecodeError> {
    check_length(data, REPORT_08_SIZE)?;
    let report: Report08 = bincode::deserialize(&data[..REPORT_08_SIZE])?;
    check_header(report.what, report.command, 0x08)?;

    Ok(AdvancedSettings {
        sea_state: report.sea_state,
        local_interference_rejection: report.interference_rejection,
        scan_speed: report.scan_speed,
        sidelobe_suppression_auto: report.sls_auto > 0,
        sidelobe_suppression: report.side_lobe_suppression,
        noise_rejection: report.noise_rejection,
        target_separation: report.target_separation,
    })
}

/// Decode a report channel datagram
pub fn decode_report(data: &[u8]) -> Result<Report, DecodeError> {
    let record = decode_record(data)?;
    let family = record.family().ok_or(DecodeError::TooShort {
        expected: 2,
        actual: data.len(),
    })?;

    if family != REPORT_FAMILY {
        return Ok(Report::Unknown {
            id: record.id,
            family,
            len: data.len(),
        });
    }

    match record.id {
        0x01 => parse_report_01(data).map(Report::Status),
        0x02 => parse_report_02(data).map(Report::Controls),
        0x03 => parse_report_03(data).map(Report::ModelInfo),
        0x04 => parse_report_04(data).map(Report::Installation),
        0x08 => parse_report_08(data).map(Report::Advanced),
        id => Ok(Report::Unknown {
            id,
            family,
            len: data.len(),
        }),
    }
}
