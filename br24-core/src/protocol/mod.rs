//! BR24 / 4G wire protocol.
//!
//! Pure `&[u8]` → `Result<T>` decoding and `T` → `Vec<u8>` encoding for the
//! three multicast channels of a Navico broadband radar. No I/O happens here.
//!
//! # Structure
//!
//! - [`spoke`] - Spoke data frames (data channel)
//! - [`report`] - Status reports (report channel) and the generic record decoder
//! - [`command`] - Outbound commands, also seen echoed on the command channel
//!
//! # Example
//!
//! ```rust
//! use br24_core::protocol::{spoke, Generation};
//!
//! let header = spoke::SpokeHeader::br24(100, 0x0100);
//! let frame = spoke::encode_frame(&[(header, [0u8; 512])]);
//! let decoded = spoke::decode_frame(Generation::Br24, &frame).unwrap();
//! assert_eq!(decoded.spokes.len(), 1);
//! assert_eq!(decoded.spokes[0].header.angle_index(), 100);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod command;
pub mod report;
pub mod spoke;

/// Angular resolution of a rotation, shared by both generations
pub const LINES_PER_ROTATION: usize = 4096;

/// Number of return-strength bins in one spoke
pub const RETURNS_PER_LINE: usize = 512;

/// Frame header in front of the spoke records of a data datagram
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum number of spoke records in one data datagram
pub const SPOKES_PER_FRAME: usize = 120;

/// Radar hardware generation, decides the spoke header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// Original Broadband Radar, 4-byte range field
    #[default]
    Br24,
    /// 3G / 4G, dual 2-byte range fields
    Br4g,
}

impl Generation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Generation::Br24 => "br24",
            Generation::Br4g => "4g",
        }
    }

    /// Generation implied by the model byte of report 0x03
    pub fn from_model_byte(model: u8) -> Option<Self> {
        match report::Model::from_byte(model) {
            report::Model::BR24 => Some(Generation::Br24),
            report::Model::Gen3 | report::Model::Gen4 | report::Model::HALO => {
                Some(Generation::Br4g)
            }
            report::Model::Unknown => None,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "br24" => Ok(Generation::Br24),
            "4g" | "br4g" | "3g" => Ok(Generation::Br4g),
            _ => Err(format!("Unknown radar generation '{}'", s)),
        }
    }
}

const HEADING_TRUE_FLAG: u16 = 0x4000;
const HEADING_MASK: u16 = LINES_PER_ROTATION as u16 - 1;

/// Check if heading value indicates true heading
pub fn is_heading_true(x: u16) -> bool {
    (x & HEADING_TRUE_FLAG) != 0
}

/// Check if heading value is valid
pub fn is_valid_heading(x: u16) -> bool {
    (x & !(HEADING_TRUE_FLAG | HEADING_MASK)) == 0
}

/// Extract heading value (returns None if invalid or not true heading)
pub fn extract_heading(x: u16) -> Option<u16> {
    if is_valid_heading(x) && is_heading_true(x) {
        Some(x & HEADING_MASK)
    } else {
        None
    }
}

/// Convert an angle in 1/4096ths of a revolution to degrees
pub fn angle_to_degrees(angle: u16) -> f64 {
    (angle as usize % LINES_PER_ROTATION) as f64 * 360.0 / LINES_PER_ROTATION as f64
}

/// Convert a bearing in degrees to the nearest angle index
pub fn degrees_to_angle(degrees: f64) -> usize {
    let mut d = degrees % 360.0;
    if d < 0.0 {
        d += 360.0;
    }
    (d * LINES_PER_ROTATION as f64 / 360.0).round() as usize % LINES_PER_ROTATION
}

/// Decode a little-endian UTF-16 string padded with zeros
pub(crate) fn wide_string(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16(&units)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
