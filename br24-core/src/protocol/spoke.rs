//! Spoke data frames
//!
//! A data datagram is an 8 byte frame header followed by up to 120 spoke
//! records. Each record is a 24 byte header plus 512 bytes of returns.
//! The two generations share the record size but lay out the range field
//! differently.

use serde::Deserialize;
use std::f64::consts::SQRT_2;

use super::{
    extract_heading, Generation, FRAME_HEADER_SIZE, LINES_PER_ROTATION, RETURNS_PER_LINE,
    SPOKES_PER_FRAME,
};
use crate::error::DecodeError;

/// Size of a spoke header, both generations
pub const SPOKE_HEADER_SIZE: usize = 24;

/// Full spoke record (header + returns)
pub const SPOKE_LINE_SIZE: usize = SPOKE_HEADER_SIZE + RETURNS_PER_LINE;

const STATUS_VALID: u8 = 0x02;
const STATUS_VALID_ALT: u8 = 0x12;

/// BR24 range unit is 10/sqrt(2) m; expressed in decimeters
const BR24_DM_PER_UNIT: f64 = 100.0 / SQRT_2;

/// 4G range unit is a quarter meter
const BR4G_DM_PER_UNIT_NUM: u32 = 5;
const BR4G_DM_PER_UNIT_DEN: u32 = 2;

const BR24_MARK: [u8; 4] = [0x00, 0x44, 0x0d, 0x0e];
const BR4G_MARK: [u8; 2] = [0x00, 0x44];

/// BR24 spoke header (24 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Br24SpokeHeader {
    header_len: u8,
    status: u8,
    scan_number: [u8; 2],
    _mark: [u8; 4],
    angle: [u8; 2],
    heading: [u8; 2],
    range: [u8; 4],
    _u01: [u8; 2],
    _u02: [u8; 2],
    _u03: [u8; 4],
}

/// 3G/4G spoke header (24 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Br4gSpokeHeader {
    header_len: u8,
    status: u8,
    scan_number: [u8; 2],
    _mark: [u8; 2],
    large_range: [u8; 2], // or -1
    angle: [u8; 2],
    heading: [u8; 2],
    small_range: [u8; 2],
    _rotation: [u8; 2],
    _u01: [u8; 4],
    _u02: [u8; 4],
}

/// Raw range field(s) as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeField {
    /// 4 byte field, lower 24 bits significant
    Br24 { raw: u32 },
    /// `large` of -1 (0xffff) selects `small`
    Br4g { large: u16, small: u16 },
}

impl RangeField {
    /// The raw range value selected by the generation's rules
    pub fn selected(&self) -> u32 {
        match *self {
            RangeField::Br24 { raw } => raw & 0x00ff_ffff,
            RangeField::Br4g { large, small } => {
                if large as i16 == -1 {
                    small as u32
                } else {
                    large as u32
                }
            }
        }
    }

    /// Range to the last return bin in decimeters
    pub fn decimeters(&self) -> u32 {
        match self {
            RangeField::Br24 { .. } => {
                (self.selected() as f64 * BR24_DM_PER_UNIT).round() as u32
            }
            RangeField::Br4g { .. } => {
                let raw = self.selected();
                if raw == 0xffff {
                    // both fields unset
                    0
                } else {
                    raw * BR4G_DM_PER_UNIT_NUM / BR4G_DM_PER_UNIT_DEN
                }
            }
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            RangeField::Br24 { .. } => Generation::Br24,
            RangeField::Br4g { .. } => Generation::Br4g,
        }
    }
}

/// Decoded spoke header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpokeHeader {
    pub status: u8,
    pub scan_number: u16,
    /// Angle as sent, in 1/4096ths of a revolution
    pub angle: u16,
    /// Heading field as sent
    pub heading_raw: u16,
    pub range: RangeField,
}

impl SpokeHeader {
    /// Build a BR24 header, mostly for simulators and tests
    pub fn br24(angle: u16, raw_range: u32) -> Self {
        SpokeHeader {
            status: STATUS_VALID,
            scan_number: angle,
            angle,
            heading_raw: 0,
            range: RangeField::Br24 { raw: raw_range },
        }
    }

    /// Build a 4G header, mostly for simulators and tests
    pub fn br4g(angle: u16, large: u16, small: u16) -> Self {
        SpokeHeader {
            status: STATUS_VALID,
            scan_number: angle,
            angle,
            heading_raw: 0,
            range: RangeField::Br4g { large, small },
        }
    }

    /// Slot in the spoke buffer
    pub fn angle_index(&self) -> usize {
        self.angle as usize % LINES_PER_ROTATION
    }

    /// True heading in 1/4096ths of a revolution, when the radar has one
    pub fn heading(&self) -> Option<u16> {
        extract_heading(self.heading_raw)
    }

    pub fn range_decimeters(&self) -> u32 {
        self.range.decimeters()
    }

    /// Encode back to the 24 byte wire layout
    pub fn encode(&self) -> [u8; SPOKE_HEADER_SIZE] {
        let mut out = [0u8; SPOKE_HEADER_SIZE];
        out[0] = SPOKE_HEADER_SIZE as u8;
        out[1] = self.status;
        out[2..4].copy_from_slice(&self.scan_number.to_le_bytes());
        match self.range {
            RangeField::Br24 { raw } => {
                out[4..8].copy_from_slice(&BR24_MARK);
                out[8..10].copy_from_slice(&self.angle.to_le_bytes());
                out[10..12].copy_from_slice(&self.heading_raw.to_le_bytes());
                out[12..16].copy_from_slice(&raw.to_le_bytes());
            }
            RangeField::Br4g { large, small } => {
                out[4..6].copy_from_slice(&BR4G_MARK);
                out[6..8].copy_from_slice(&large.to_le_bytes());
                out[8..10].copy_from_slice(&self.angle.to_le_bytes());
                out[10..12].copy_from_slice(&self.heading_raw.to_le_bytes());
                out[12..14].copy_from_slice(&small.to_le_bytes());
                out[14..16].copy_from_slice(&0xffffu16.to_le_bytes());
            }
        }
        out
    }
}

/// One decoded spoke record
#[derive(Debug, Clone, PartialEq)]
pub struct SpokeRecord {
    pub header: SpokeHeader,
    pub returns: [u8; RETURNS_PER_LINE],
}

/// Result of decoding a data datagram
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub spokes: Vec<SpokeRecord>,
    /// Bytes consumed, frame header included
    pub consumed: usize,
    /// Why decoding stopped before the end of the datagram, if it did
    pub stopped: Option<DecodeError>,
}

fn validate(header_len: u8, status: u8) -> Result<(), DecodeError> {
    if header_len != SPOKE_HEADER_SIZE as u8 {
        return Err(DecodeError::InvalidHeaderLength(header_len));
    }
    if status != STATUS_VALID && status != STATUS_VALID_ALT {
        return Err(DecodeError::InvalidStatus(status));
    }
    Ok(())
}

/// Decode a spoke header for the given generation
pub fn decode_spoke_header(
    generation: Generation,
    data: &[u8],
) -> Result<SpokeHeader, DecodeError> {
    if data.len() < SPOKE_HEADER_SIZE {
        return Err(DecodeError::TooShort {
            expected: SPOKE_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let data = &data[..SPOKE_HEADER_SIZE];

    match generation {
        Generation::Br24 => {
            let header: Br24SpokeHeader = bincode::deserialize(data)?;
            validate(header.header_len, header.status)?;
            Ok(SpokeHeader {
                status: header.status,
                scan_number: u16::from_le_bytes(header.scan_number),
                angle: u16::from_le_bytes(header.angle),
                heading_raw: u16::from_le_bytes(header.heading),
                range: RangeField::Br24 {
                    raw: u32::from_le_bytes(header.range),
                },
            })
        }
        Generation::Br4g => {
            let header: Br4gSpokeHeader = bincode::deserialize(data)?;
            validate(header.header_len, header.status)?;
            Ok(SpokeHeader {
                status: header.status,
                scan_number: u16::from_le_bytes(header.scan_number),
                angle: u16::from_le_bytes(header.angle),
                heading_raw: u16::from_le_bytes(header.heading),
                range: RangeField::Br4g {
                    large: u16::from_le_bytes(header.large_range),
                    small: u16::from_le_bytes(header.small_range),
                },
            })
        }
    }
}

/// Decode one spoke record (header + returns)
pub fn decode_spoke(generation: Generation, data: &[u8]) -> Result<SpokeRecord, DecodeError> {
    if data.len() < SPOKE_LINE_SIZE {
        return Err(DecodeError::TooShort {
            expected: SPOKE_LINE_SIZE,
            actual: data.len(),
        });
    }
    let header = decode_spoke_header(generation, data)?;
    let mut returns = [0u8; RETURNS_PER_LINE];
    returns.copy_from_slice(&data[SPOKE_HEADER_SIZE..SPOKE_LINE_SIZE]);
    Ok(SpokeRecord { header, returns })
}

/// Decode as many spoke records as the datagram holds.
///
/// Stops at the first truncated or malformed record and returns what was
/// decoded before it. A datagram without a single valid record is an error.
pub fn decode_frame(generation: Generation, data: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(DecodeError::TooShort {
            expected: FRAME_HEADER_SIZE + SPOKE_LINE_SIZE,
            actual: data.len(),
        });
    }

    let mut spokes = Vec::new();
    let mut offset = FRAME_HEADER_SIZE;
    let mut stopped = None;

    while spokes.len() < SPOKES_PER_FRAME && offset < data.len() {
        match decode_spoke(generation, &data[offset..]) {
            Ok(spoke) => {
                spokes.push(spoke);
                offset += SPOKE_LINE_SIZE;
            }
            Err(e) => {
                stopped = Some(e);
                break;
            }
        }
    }

    if spokes.is_empty() {
        return Err(stopped.unwrap_or(DecodeError::TooShort {
            expected: FRAME_HEADER_SIZE + SPOKE_LINE_SIZE,
            actual: data.len(),
        }));
    }

    Ok(DecodedFrame {
        spokes,
        consumed: offset,
        stopped,
    })
}

/// Build a data datagram from headers and returns
pub fn encode_frame(records: &[(SpokeHeader, [u8; RETURNS_PER_LINE])]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + records.len() * SPOKE_LINE_SIZE);
    out.extend_from_slice(&[0u8; FRAME_HEADER_SIZE]);
    for (header, returns) in records {
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(returns);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(header: SpokeHeader) -> Vec<u8> {
        let mut data = header.encode().to_vec();
        data.extend_from_slice(&[0u8; RETURNS_PER_LINE]);
        data
    }

    #[test]
    fn test_br24_header_roundtrip() {
        for (angle, raw) in [(0u16, 0u32), (4095, 0x00ff_ffff), (1234, 0x0000_1a2b)] {
            let header = SpokeHeader::br24(angle, raw);
            let decoded = decode_spoke_header(Generation::Br24, &header.encode()).unwrap();
            assert_eq!(decoded.angle, angle);
            assert_eq!(decoded.range, RangeField::Br24 { raw });
            assert_eq!(decoded.encode(), header.encode());
        }
    }

    #[test]
    fn test_br4g_header_roundtrip() {
        for (angle, large, small) in [
            (7u16, 0x0080u16, 0x1000u16),
            (4000, 0xffff, 0x0200),
            (1, 0x0400, 0xffff),
        ] {
            let header = SpokeHeader::br4g(angle, large, small);
            let decoded = decode_spoke_header(Generation::Br4g, &header.encode()).unwrap();
            assert_eq!(decoded.angle, angle);
            assert_eq!(decoded.range, RangeField::Br4g { large, small });
            assert_eq!(decoded.encode(), header.encode());
        }
    }

    #[test]
    fn test_br24_range_scaling() {
        // 1000 units of 10/sqrt(2) m
        let header = SpokeHeader::br24(0, 1000);
        assert_eq!(header.range_decimeters(), 70711);
        // Upper byte is not part of the range
        let header = SpokeHeader::br24(0, 0xff00_03e8);
        assert_eq!(header.range_decimeters(), 70711);
    }

    #[test]
    fn test_br4g_sentinel_selects_small_range() {
        let header = SpokeHeader::br4g(0, 0xffff, 400);
        assert_eq!(header.range.selected(), 400);
        assert_eq!(header.range_decimeters(), 1000);

        let header = SpokeHeader::br4g(0, 800, 400);
        assert_eq!(header.range.selected(), 800);
        assert_eq!(header.range_decimeters(), 2000);

        let header = SpokeHeader::br4g(0, 0xffff, 0xffff);
        assert_eq!(header.range_decimeters(), 0);
    }

    #[test]
    fn test_truncated_header_fails() {
        let data = SpokeHeader::br24(5, 10).encode();
        for len in 0..SPOKE_HEADER_SIZE {
            for generation in [Generation::Br24, Generation::Br4g] {
                assert_eq!(
                    decode_spoke_header(generation, &data[..len]),
                    Err(DecodeError::TooShort {
                        expected: SPOKE_HEADER_SIZE,
                        actual: len
                    })
                );
            }
        }
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut data = SpokeHeader::br24(5, 10).encode();
        data[1] = 0x07;
        assert_eq!(
            decode_spoke_header(Generation::Br24, &data),
            Err(DecodeError::InvalidStatus(0x07))
        );
        data[1] = 0x12;
        data[0] = 0x20;
        assert_eq!(
            decode_spoke_header(Generation::Br24, &data),
            Err(DecodeError::InvalidHeaderLength(0x20))
        );
    }

    #[test]
    fn test_frame_stops_at_truncated_record() {
        let mut frame = encode_frame(&[
            (SpokeHeader::br24(1, 10), [1u8; RETURNS_PER_LINE]),
            (SpokeHeader::br24(2, 10), [2u8; RETURNS_PER_LINE]),
        ]);
        frame.extend_from_slice(&line(SpokeHeader::br24(3, 10))[..100]);

        let decoded = decode_frame(Generation::Br24, &frame).unwrap();
        assert_eq!(decoded.spokes.len(), 2);
        assert_eq!(decoded.consumed, FRAME_HEADER_SIZE + 2 * SPOKE_LINE_SIZE);
        assert_eq!(decoded.spokes[1].returns[0], 2);
        assert!(matches!(decoded.stopped, Some(DecodeError::TooShort { .. })));
    }

    #[test]
    fn test_frame_stops_at_malformed_record() {
        let mut bad = line(SpokeHeader::br24(2, 10));
        bad[0] = 0;
        let mut frame = encode_frame(&[(SpokeHeader::br24(1, 10), [0u8; RETURNS_PER_LINE])]);
        frame.extend_from_slice(&bad);
        frame.extend_from_slice(&line(SpokeHeader::br24(3, 10)));

        let decoded = decode_frame(Generation::Br24, &frame).unwrap();
        assert_eq!(decoded.spokes.len(), 1);
        assert_eq!(decoded.stopped, Some(DecodeError::InvalidHeaderLength(0)));
    }

    #[test]
    fn test_frame_without_spokes_fails() {
        assert!(decode_frame(Generation::Br24, &[]).is_err());
        assert!(decode_frame(Generation::Br24, &[0u8; 7]).is_err());
        assert!(decode_frame(Generation::Br24, &[0u8; FRAME_HEADER_SIZE]).is_err());
        assert!(decode_frame(Generation::Br4g, &[0u8; 300]).is_err());
    }

    #[test]
    fn test_frame_caps_record_count() {
        let records: Vec<_> = (0..SPOKES_PER_FRAME as u16 + 2)
            .map(|a| (SpokeHeader::br4g(a, 0xffff, 100), [0u8; RETURNS_PER_LINE]))
            .collect();
        let frame = encode_frame(&records);
        let decoded = decode_frame(Generation::Br4g, &frame).unwrap();
        assert_eq!(decoded.spokes.len(), SPOKES_PER_FRAME);
        assert!(decoded.stopped.is_none());
    }
}
