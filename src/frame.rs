//! VITA Radio Link (VRL) frames.
//!
//! A frame is an 8-byte header (`"VRLP"` sync word, then a 12-bit frame
//! count and 20-bit frame length in words), any number of complete VRT
//! packets, and a trailer word holding either a CRC-32 over everything
//! before it or the `"VEND"` sentinel meaning no CRC was computed.
//!
//! ## Usage Example
//!
//! ```rust
//! use vrt_codec::{CodecConfig, DataPacket, VrlFrame};
//!
//! # fn main() -> vrt_codec::Result<()> {
//! let config = CodecConfig::default().with_frame_crc(true);
//! let mut frame = VrlFrame::new(config);
//! let packets = vec![DataPacket::new(config), DataPacket::new(config)];
//! assert_eq!(frame.set_vrt_packets(&packets)?, 2);
//! assert!(frame.is_crc_valid());
//!
//! let parsed = VrlFrame::from_bytes(frame.as_bytes(), config)?;
//! assert_eq!(parsed.packets()?.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::numeric::{get_be, put_be};
use crate::packet::{AnyPacket, VrtPacket, peek_packet_length};
use crate::{CodecConfig, Result, VrtError};
use tracing::{debug, trace};

/// `"VRLP"`
pub const VRL_FAW: u32 = 0x5652_4C50;
/// `"VEND"`: trailer value when no CRC was computed.
pub const NO_CRC: u32 = 0x5645_4E44;
pub const FRAME_HEADER_LENGTH: usize = 8;
pub const FRAME_TRAILER_LENGTH: usize = 4;
/// Largest frame the 20-bit length field can describe.
pub const MAX_FRAME_LENGTH: usize = 0xF_FFFF * 4;
pub const MAX_FRAME_COUNT: u16 = 0x0FFF;

const LENGTH_MASK: u32 = 0x000F_FFFF;
const COUNT_SHIFT: u32 = 20;

/// Total frame size in bytes, read from the header at `offset`.
pub fn peek_frame_length(buf: &[u8], offset: usize) -> Result<usize> {
    if buf.len() < offset + FRAME_HEADER_LENGTH {
        return Err(VrtError::malformed(
            "VRL frame",
            format!("need {FRAME_HEADER_LENGTH} header bytes at offset {offset}, buffer holds {}", buf.len()),
        ));
    }
    let faw: u32 = get_be(buf, offset);
    if faw != VRL_FAW {
        return Err(VrtError::malformed("VRL frame", format!("bad sync word {faw:#010x}")));
    }
    let word: u32 = get_be(buf, offset + 4);
    Ok((word & LENGTH_MASK) as usize * 4)
}

/// One VRL frame, owning its wire bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct VrlFrame {
    bytes: Vec<u8>,
    config: CodecConfig,
}

impl std::fmt::Debug for VrlFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrlFrame")
            .field("frame_count", &self.frame_count())
            .field("frame_length", &self.bytes.len())
            .field("crc", &format_args!("{:#010x}", self.crc()))
            .finish()
    }
}

impl VrlFrame {
    /// Empty frame: header and trailer only.
    pub fn new(config: CodecConfig) -> Self {
        let mut frame = Self { bytes: vec![0; FRAME_HEADER_LENGTH + FRAME_TRAILER_LENGTH], config };
        put_be(&mut frame.bytes, 0, VRL_FAW);
        frame.finish();
        frame
    }

    /// Copy a frame out of `buf`. Bytes past the declared length are ignored.
    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        let declared = peek_frame_length(buf, 0)?;
        if declared < FRAME_HEADER_LENGTH + FRAME_TRAILER_LENGTH {
            return Err(VrtError::malformed("VRL frame", format!("frame length {declared} is below the minimum")));
        }
        if buf.len() < declared {
            return Err(VrtError::malformed(
                "VRL frame",
                format!("header declares {declared} bytes, buffer holds {}", buf.len()),
            ));
        }
        trace!("Parsed VRL frame header: {} bytes", declared);
        Ok(Self { bytes: buf[..declared].to_vec(), config })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Frame length in bytes as stored in the header.
    pub fn frame_length(&self) -> usize {
        (self.length_word() & LENGTH_MASK) as usize * 4
    }

    fn length_word(&self) -> u32 {
        get_be(&self.bytes, 4)
    }

    pub fn frame_count(&self) -> u16 {
        (self.length_word() >> COUNT_SHIFT) as u16
    }

    /// Set the 12-bit frame counter. Any CRC is recomputed.
    pub fn set_frame_count(&mut self, count: u16) -> Result<()> {
        if count > MAX_FRAME_COUNT {
            return Err(VrtError::invalid_value("frame count", format!("{count} exceeds {MAX_FRAME_COUNT}")));
        }
        let word = (self.length_word() & LENGTH_MASK) | (u32::from(count) << COUNT_SHIFT);
        put_be(&mut self.bytes, 4, word);
        self.refresh_crc();
        Ok(())
    }

    /// Replace the frame contents with `packets`. Returns how many were added.
    pub fn set_vrt_packets<P: VrtPacket>(&mut self, packets: &[P]) -> Result<usize> {
        let total: usize = packets.iter().map(|p| p.as_bytes().len()).sum();
        let length = FRAME_HEADER_LENGTH + total + FRAME_TRAILER_LENGTH;
        if length > MAX_FRAME_LENGTH {
            return Err(VrtError::invalid_value(
                "frame length",
                format!("{length} bytes exceeds the {MAX_FRAME_LENGTH}-byte frame limit"),
            ));
        }
        self.fill(packets.iter().map(|p| p.as_bytes()));
        Ok(packets.len())
    }

    /// Like [`set_vrt_packets`](Self::set_vrt_packets), but stops before the
    /// first packet that would push the frame past `max_frame_length` bytes.
    pub fn set_vrt_packets_limited<P: VrtPacket>(&mut self, max_frame_length: usize, packets: &[P]) -> Result<usize> {
        let limit = max_frame_length.min(MAX_FRAME_LENGTH);
        if limit < FRAME_HEADER_LENGTH + FRAME_TRAILER_LENGTH {
            return Err(VrtError::invalid_value(
                "maximum frame length",
                format!("{max_frame_length} bytes cannot hold a frame header and trailer"),
            ));
        }
        let mut length = FRAME_HEADER_LENGTH + FRAME_TRAILER_LENGTH;
        let fitting = packets
            .iter()
            .take_while(|p| {
                length += p.as_bytes().len();
                length <= limit
            })
            .count();
        self.fill(packets[..fitting].iter().map(|p| p.as_bytes()));
        if fitting < packets.len() {
            debug!("VRL frame full after {} of {} packets ({} bytes)", fitting, packets.len(), self.bytes.len());
        }
        Ok(fitting)
    }

    fn fill<'a>(&mut self, packets: impl Iterator<Item = &'a [u8]>) {
        self.bytes.truncate(FRAME_HEADER_LENGTH);
        for packet in packets {
            self.bytes.extend_from_slice(packet);
        }
        self.bytes.extend_from_slice(&[0; FRAME_TRAILER_LENGTH]);
        self.finish();
    }

    /// Rewrite the length field, then the trailer.
    fn finish(&mut self) {
        let word = (self.length_word() & !LENGTH_MASK) | (self.bytes.len() / 4) as u32;
        put_be(&mut self.bytes, 4, word);
        if self.config.frame_crc {
            self.update_crc();
        } else {
            self.clear_crc();
        }
    }

    fn refresh_crc(&mut self) {
        if self.crc() != NO_CRC {
            self.update_crc();
        }
    }

    fn trailer_offset(&self) -> usize {
        self.bytes.len() - FRAME_TRAILER_LENGTH
    }

    fn packet_region(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_LENGTH..self.trailer_offset()]
    }

    /// Trailer word: a CRC or [`NO_CRC`].
    pub fn crc(&self) -> u32 {
        get_be(&self.bytes, self.trailer_offset())
    }

    /// CRC-32 over the header and packets: the IEEE 802.3 polynomial
    /// `0x04C11DB7`, reflected, initial value and final XOR `0xFFFFFFFF`.
    pub fn compute_crc(&self) -> u32 {
        crc32fast::hash(&self.bytes[..self.trailer_offset()])
    }

    pub fn update_crc(&mut self) {
        let crc = self.compute_crc();
        let offset = self.trailer_offset();
        put_be(&mut self.bytes, offset, crc);
    }

    pub fn clear_crc(&mut self) {
        let offset = self.trailer_offset();
        put_be(&mut self.bytes, offset, NO_CRC);
    }

    /// True for the `"VEND"` sentinel or a trailer equal to
    /// [`compute_crc`](Self::compute_crc) (IEEE CRC-32).
    pub fn is_crc_valid(&self) -> bool {
        let crc = self.crc();
        crc == NO_CRC || crc == self.compute_crc()
    }

    /// Byte ranges of the contained packets, in order.
    fn packet_spans(&self) -> Result<Vec<(usize, usize)>> {
        let region = self.packet_region();
        let mut spans = Vec::new();
        let mut offset = 0;
        while offset < region.len() {
            let length = peek_packet_length(region, offset)?;
            if length == 0 || offset + length > region.len() {
                return Err(VrtError::malformed(
                    "VRL frame",
                    format!("packet at frame offset {} overruns the frame", offset + FRAME_HEADER_LENGTH),
                ));
            }
            spans.push((offset, offset + length));
            offset += length;
        }
        Ok(spans)
    }

    /// Number of well-formed packets before the trailer.
    pub fn packet_count(&self) -> usize {
        let region = self.packet_region();
        let mut count = 0;
        let mut offset = 0;
        while let Ok(length) = peek_packet_length(region, offset) {
            if length == 0 || offset + length > region.len() {
                break;
            }
            offset += length;
            count += 1;
        }
        count
    }

    /// Decode every contained packet.
    pub fn packets(&self) -> Result<Vec<AnyPacket>> {
        let region = self.packet_region();
        self.packet_spans()?
            .into_iter()
            .map(|(from, to)| AnyPacket::from_bytes(&region[from..to], self.config))
            .collect()
    }

    /// Structural check. Lenient mode only checks the sync word, the minimum
    /// size and `known_length`; strict mode also checks the length field,
    /// packet boundaries, every packet and the CRC.
    pub fn validate(&self, strict: bool, known_length: Option<usize>) -> Result<()> {
        let subject = "VRL frame";
        if self.bytes.len() < FRAME_HEADER_LENGTH + FRAME_TRAILER_LENGTH {
            return Err(VrtError::validation(subject, format!("{} bytes is below the minimum", self.bytes.len())));
        }
        let faw: u32 = get_be(&self.bytes, 0);
        if faw != VRL_FAW {
            return Err(VrtError::validation(subject, format!("bad sync word {faw:#010x}")));
        }
        if let Some(known) = known_length {
            if known != self.bytes.len() {
                return Err(VrtError::validation(
                    subject,
                    format!("expected {known} bytes, frame is {}", self.bytes.len()),
                ));
            }
        }
        if !strict {
            return Ok(());
        }
        if self.frame_length() != self.bytes.len() {
            return Err(VrtError::validation(
                subject,
                format!("length field says {} bytes, frame is {}", self.frame_length(), self.bytes.len()),
            ));
        }
        let region = self.packet_region();
        for (from, to) in self.packet_spans().map_err(|e| VrtError::validation(subject, e.to_string()))? {
            let packet = AnyPacket::from_bytes(&region[from..to], self.config)
                .map_err(|e| VrtError::validation(subject, e.to_string()))?;
            packet.validate(true, Some(to - from))?;
        }
        if !self.is_crc_valid() {
            return Err(VrtError::validation(
                subject,
                format!("CRC {:#010x} does not match computed {:#010x}", self.crc(), self.compute_crc()),
            ));
        }
        Ok(())
    }

    pub fn is_frame_valid(&self, known_length: Option<usize>) -> bool {
        self.validate(true, known_length).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ContextPacket, DataPacket};
    use crate::CifAccess;
    use anyhow::Result;

    fn data_packets(count: usize) -> Result<Vec<DataPacket>> {
        (0..count)
            .map(|i| -> Result<DataPacket> {
                let mut p = DataPacket::new(CodecConfig::default());
                p.set_payload(&vec![i as u8; 4 * (i + 1)])?;
                Ok(p)
            })
            .collect()
    }

    #[test]
    fn empty_frame_layout() {
        let frame = VrlFrame::new(CodecConfig::default());
        assert_eq!(frame.as_bytes(), &[0x56, 0x52, 0x4C, 0x50, 0, 0, 0, 3, 0x56, 0x45, 0x4E, 0x44]);
        assert_eq!(frame.frame_length(), 12);
        assert_eq!(frame.packet_count(), 0);
        assert!(frame.is_frame_valid(Some(12)));
        assert!(!frame.is_frame_valid(Some(16)));
    }

    #[test]
    fn crc_uses_the_ieee_polynomial() {
        // CRC-32 check value for "123456789"
        assert_eq!(crc32fast::hash(b"123456789"), 0xCBF4_3926);

        let frame = VrlFrame::new(CodecConfig::default().with_frame_crc(true));
        assert_eq!(frame.compute_crc(), 0x9BA1_89D0);
        assert_eq!(frame.crc(), 0x9BA1_89D0);
        assert_eq!(&frame.as_bytes()[8..], &[0x9B, 0xA1, 0x89, 0xD0]);
        assert!(frame.is_crc_valid());
    }

    #[test]
    fn packets_round_trip_through_a_frame() -> Result<()> {
        let packets = data_packets(3)?;
        let mut frame = VrlFrame::new(CodecConfig::default());
        assert_eq!(frame.set_vrt_packets(&packets)?, 3);
        let expected: usize = 12 + packets.iter().map(|p| p.packet_length()).sum::<usize>();
        assert_eq!(frame.frame_length(), expected);
        assert_eq!(peek_frame_length(frame.as_bytes(), 0)?, expected);
        assert_eq!(frame.packet_count(), 3);

        let decoded = frame.packets()?;
        for (original, decoded) in packets.iter().zip(&decoded) {
            assert_eq!(decoded.as_bytes(), original.as_bytes());
        }
        Ok(())
    }

    #[test]
    fn mixed_packet_classes_decode_by_type() -> Result<()> {
        let mut context = ContextPacket::new(CodecConfig::default());
        context.set_sample_rate(Some(5.0e6))?;
        let packets = vec![AnyPacket::from(DataPacket::new(CodecConfig::default())), AnyPacket::from(context)];
        let mut frame = VrlFrame::new(CodecConfig::default());
        frame.set_vrt_packets(&packets)?;
        let decoded = frame.packets()?;
        assert!(decoded[0].as_data().is_some());
        assert_eq!(decoded[1].as_context().and_then(|c| c.sample_rate()), Some(5.0e6));
        Ok(())
    }

    #[test]
    fn limited_fill_stops_at_the_budget() -> Result<()> {
        let packets = data_packets(4)?;
        let sizes: Vec<usize> = packets.iter().map(|p| p.packet_length()).collect();
        let budget = 12 + sizes[0] + sizes[1] + sizes[2] - 1;
        let mut frame = VrlFrame::new(CodecConfig::default());
        assert_eq!(frame.set_vrt_packets_limited(budget, &packets)?, 2);
        assert_eq!(frame.frame_length(), 12 + sizes[0] + sizes[1]);
        assert!(frame.set_vrt_packets_limited(8, &packets).is_err());
        Ok(())
    }

    #[test]
    fn crc_tracks_mutation() -> Result<()> {
        let config = CodecConfig::default().with_frame_crc(true);
        let mut frame = VrlFrame::new(config);
        frame.set_vrt_packets(&data_packets(2)?)?;
        assert_ne!(frame.crc(), NO_CRC);
        assert!(frame.is_crc_valid());
        frame.set_frame_count(7)?;
        assert!(frame.is_crc_valid());

        let mut bytes = frame.clone().into_bytes();
        bytes[FRAME_HEADER_LENGTH + 5] ^= 0x01;
        let corrupted = VrlFrame::from_bytes(&bytes, config)?;
        assert!(!corrupted.is_crc_valid());
        assert!(corrupted.validate(false, None).is_ok());
        assert!(corrupted.validate(true, None).is_err());

        frame.clear_crc();
        assert!(frame.is_crc_valid());
        Ok(())
    }

    #[test]
    fn frame_count_is_twelve_bits() -> Result<()> {
        let mut frame = VrlFrame::new(CodecConfig::default());
        frame.set_frame_count(MAX_FRAME_COUNT)?;
        assert_eq!(frame.frame_count(), MAX_FRAME_COUNT);
        assert_eq!(frame.frame_length(), 12);
        assert!(frame.set_frame_count(MAX_FRAME_COUNT + 1).is_err());
        Ok(())
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let config = CodecConfig::default();
        assert!(VrlFrame::from_bytes(&[0x56, 0x52, 0x4C], config).is_err());
        assert!(VrlFrame::from_bytes(b"VRLX\0\0\0\x03VEND", config).is_err());
        assert!(VrlFrame::from_bytes(b"VRLP\0\0\0\x04VEND", config).is_err());
        assert!(peek_frame_length(b"VRLP\0\0\0\x03", 0).is_ok());
    }
}
