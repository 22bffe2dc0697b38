//! Byte-buffer backed VRT packet header.
//!
//! A packet is one contiguous big-endian buffer: header, payload, optional
//! trailer. Nothing about the layout is cached. Every accessor recomputes the
//! offsets from the flag bits of the header word, so the buffer is always the
//! single source of truth.
//!
//! ## Header word
//!
//! | bits   | meaning                                                       |
//! |--------|---------------------------------------------------------------|
//! | 31..28 | packet type                                                   |
//! | 27     | class identifier present                                      |
//! | 26     | trailer present (data) / acknowledge (command)                |
//! | 25     | not a V49.0 packet (data, context)                            |
//! | 24     | spectrum (data) / timestamp mode (context) / cancel (command) |
//! | 23..22 | integer timestamp mode                                        |
//! | 21..20 | fractional timestamp mode                                     |
//! | 19..16 | packet count                                                  |
//! | 15..0  | packet size in 32-bit words                                   |
//!
//! Optional sections follow in a fixed order: stream identifier (4 bytes),
//! class identifier (8 bytes), integer timestamp (4 bytes), fractional
//! timestamp (8 bytes). The pad-bit count occupies the top five bits of the
//! first class-identifier word.
//!
//! Adding or removing a section splices bytes in place and rewrites the packet
//! size, so `packet_length == header_length + payload_length + trailer_length`
//! holds after every call.

use crate::numeric::{get_be, put_be, try_unpack, ByteOrder};
use crate::types::{ClassId, FractionalMode, IntegerMode, PacketType, TimeStamp, ONE_SECOND_PICOS};
use crate::{CodecConfig, Result, VrtError};
use std::fmt;
use tracing::trace;

/// Largest packet the 16-bit size field can describe, in bytes.
pub const MAX_PACKET_LENGTH: usize = 0xFFFF * 4;

/// Length of the mandatory header word.
pub const HEADER_WORD_LENGTH: usize = 4;

const TYPE_SHIFT: u32 = 28;
pub(crate) const CLASS_ID_BIT: u32 = 1 << 27;
pub(crate) const BIT_26: u32 = 1 << 26;
pub(crate) const BIT_25: u32 = 1 << 25;
pub(crate) const BIT_24: u32 = 1 << 24;
const TSI_SHIFT: u32 = 22;
const TSF_SHIFT: u32 = 20;
const COUNT_SHIFT: u32 = 16;
const SIZE_MASK: u32 = 0xFFFF;

const STREAM_ID_LENGTH: usize = 4;
const CLASS_ID_LENGTH: usize = 8;
const TSI_LENGTH: usize = 4;
const TSF_LENGTH: usize = 8;
const TRAILER_LENGTH: usize = 4;

const PAD_BITS_SHIFT: u32 = 3;

/// Read the packet size, in bytes, from a header word at `offset` without
/// building a packet.
pub fn peek_packet_length(buf: &[u8], offset: usize) -> Result<usize> {
    let word: u32 = try_unpack(buf, offset, ByteOrder::BigEndian)?;
    Ok((word & SIZE_MASK) as usize * 4)
}

/// Owned packet bytes plus the configuration governing writes.
#[derive(Clone)]
pub struct PacketBuffer {
    bytes: Vec<u8>,
    config: CodecConfig,
}

impl PacketBuffer {
    /// Empty packet of `packet_type`: header word, plus a zero stream identifier
    /// when the type carries one.
    pub fn new(packet_type: PacketType, config: CodecConfig) -> Self {
        let length = HEADER_WORD_LENGTH + if packet_type.has_stream_id() { STREAM_ID_LENGTH } else { 0 };
        let mut bytes = vec![0u8; length];
        let word = (u32::from(packet_type.code()) << TYPE_SHIFT) | (length / 4) as u32;
        put_be(&mut bytes, 0, word);
        Self { bytes, config }
    }

    /// Like [`new`](Self::new), followed by the given payload words.
    pub(crate) fn with_payload_words(packet_type: PacketType, config: CodecConfig, words: &[u32]) -> Self {
        let mut buffer = Self::new(packet_type, config);
        for word in words {
            buffer.bytes.extend_from_slice(&word.to_be_bytes());
        }
        buffer.update_packet_length();
        buffer
    }

    /// Copy a packet out of `buf`. Bytes past the declared packet size are ignored.
    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        let declared = peek_packet_length(buf, 0)?;
        if declared < HEADER_WORD_LENGTH {
            return Err(VrtError::malformed("VRT packet", "packet size field is zero"));
        }
        if buf.len() < declared {
            return Err(VrtError::malformed(
                "VRT packet",
                format!("header declares {declared} bytes, buffer holds {}", buf.len()),
            ));
        }
        let word: u32 = get_be(buf, 0);
        PacketType::from_code((word >> TYPE_SHIFT) as u8)
            .map_err(|e| VrtError::malformed("VRT packet", e.to_string()))?;

        let packet = Self { bytes: buf[..declared].to_vec(), config };
        let needed = packet.header_length() + packet.trailer_length();
        if needed > declared {
            return Err(VrtError::malformed(
                "VRT packet",
                format!("header and trailer need {needed} bytes, packet size is {declared}"),
            ));
        }
        trace!(
            "Parsed {:?} packet header: {} bytes, header {} bytes",
            packet.packet_type(),
            declared,
            packet.header_length()
        );
        Ok(packet)
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

    pub fn set_config(&mut self, config: CodecConfig) {
        self.config = config;
    }

    pub(crate) fn header_word(&self) -> u32 {
        get_be(&self.bytes, 0)
    }

    fn set_header_word(&mut self, word: u32) {
        put_be(&mut self.bytes, 0, word);
    }

    pub(crate) fn header_bit(&self, mask: u32) -> bool {
        self.header_word() & mask != 0
    }

    pub(crate) fn set_header_bit(&mut self, mask: u32, on: bool) {
        let word = self.header_word();
        self.set_header_word(if on { word | mask } else { word & !mask });
    }

    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        get_be(&self.bytes, offset)
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) {
        put_be(&mut self.bytes, offset, value);
    }

    pub(crate) fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }

    pub(crate) fn write_slice(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    // Splicing

    pub(crate) fn check_growth(&self, growth: usize) -> Result<()> {
        let new_length = self.bytes.len() + growth;
        if new_length > MAX_PACKET_LENGTH {
            return Err(VrtError::unsupported(
                "packet resize",
                format!("{new_length} bytes exceeds the {MAX_PACKET_LENGTH} byte packet limit"),
            ));
        }
        Ok(())
    }

    fn update_packet_length(&mut self) {
        let words = (self.bytes.len() / 4) as u32;
        let word = self.header_word();
        self.set_header_word((word & !SIZE_MASK) | (words & SIZE_MASK));
    }

    /// Insert `data` at `offset`, shifting the rest of the packet right.
    pub(crate) fn insert_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len() % 4, 0);
        self.check_growth(data.len())?;
        self.bytes.splice(offset..offset, data.iter().copied());
        self.update_packet_length();
        trace!("Inserted {} bytes at offset {}", data.len(), offset);
        Ok(())
    }

    /// Insert `count` zero bytes at `offset`.
    pub(crate) fn insert_zeros(&mut self, offset: usize, count: usize) -> Result<()> {
        self.insert_bytes(offset, &vec![0u8; count])
    }

    /// Remove `count` bytes at `offset`, shifting the rest of the packet left.
    pub(crate) fn remove_bytes(&mut self, offset: usize, count: usize) {
        debug_assert_eq!(count % 4, 0);
        self.bytes.drain(offset..offset + count);
        self.update_packet_length();
        trace!("Removed {} bytes at offset {}", count, offset);
    }

    /// Replace `old_len` bytes at `offset` with `data`, checking growth first.
    pub(crate) fn replace_bytes(&mut self, offset: usize, old_len: usize, data: &[u8]) -> Result<()> {
        if data.len() > old_len {
            self.check_growth(data.len() - old_len)?;
        }
        self.bytes.splice(offset..offset + old_len, data.iter().copied());
        self.update_packet_length();
        Ok(())
    }

    // Packet type

    pub fn packet_type(&self) -> PacketType {
        PacketType::from_code((self.header_word() >> TYPE_SHIFT) as u8).unwrap_or(PacketType::Data)
    }

    /// Change the type code, inserting or removing the stream identifier when
    /// its presence changes.
    pub fn set_packet_type(&mut self, packet_type: PacketType) -> Result<()> {
        let had_stream_id = self.packet_type().has_stream_id();
        if packet_type.has_stream_id() && !had_stream_id {
            self.insert_zeros(HEADER_WORD_LENGTH, STREAM_ID_LENGTH)?;
        } else if !packet_type.has_stream_id() && had_stream_id {
            self.remove_bytes(HEADER_WORD_LENGTH, STREAM_ID_LENGTH);
        }
        let word = self.header_word() & !(0xF << TYPE_SHIFT);
        self.set_header_word(word | (u32::from(packet_type.code()) << TYPE_SHIFT));
        Ok(())
    }

    // Section offsets

    fn stream_id_length(&self) -> usize {
        if self.packet_type().has_stream_id() { STREAM_ID_LENGTH } else { 0 }
    }

    fn class_id_offset(&self) -> usize {
        HEADER_WORD_LENGTH + self.stream_id_length()
    }

    fn class_id_length(&self) -> usize {
        if self.header_bit(CLASS_ID_BIT) { CLASS_ID_LENGTH } else { 0 }
    }

    fn tsi_offset(&self) -> usize {
        self.class_id_offset() + self.class_id_length()
    }

    fn tsi_length(&self) -> usize {
        if self.integer_mode() == IntegerMode::None { 0 } else { TSI_LENGTH }
    }

    fn tsf_offset(&self) -> usize {
        self.tsi_offset() + self.tsi_length()
    }

    fn tsf_length(&self) -> usize {
        if self.fractional_mode() == FractionalMode::None { 0 } else { TSF_LENGTH }
    }

    // Lengths

    /// Header length derived from the flag bits.
    pub fn header_length(&self) -> usize {
        self.tsf_offset() + self.tsf_length()
    }

    /// Trailer length: four bytes when a data packet has its trailer bit set.
    pub fn trailer_length(&self) -> usize {
        if self.packet_type().is_data() && self.header_bit(BIT_26) { TRAILER_LENGTH } else { 0 }
    }

    /// Packet size as declared in the header, in bytes.
    pub fn packet_length(&self) -> usize {
        (self.header_word() & SIZE_MASK) as usize * 4
    }

    pub fn payload_offset(&self) -> usize {
        self.header_length()
    }

    pub fn payload_length(&self) -> usize {
        self.bytes.len().saturating_sub(self.header_length() + self.trailer_length())
    }

    pub fn payload(&self) -> &[u8] {
        let start = self.payload_offset();
        &self.bytes[start..start + self.payload_length()]
    }

    /// Resize the payload to `len` bytes rounded up to a whole word. New bytes are zero.
    pub fn set_payload_length(&mut self, len: usize) -> Result<()> {
        let len = len.div_ceil(4) * 4;
        let current = self.payload_length();
        let end = self.payload_offset() + current;
        if len > current {
            self.insert_zeros(end, len - current)?;
        } else if len < current {
            self.remove_bytes(end - (current - len), current - len);
        }
        Ok(())
    }

    /// Replace the payload, zero-padding to a whole word.
    pub fn set_payload(&mut self, data: &[u8]) -> Result<()> {
        self.set_payload_length(data.len())?;
        let start = self.payload_offset();
        let padded = self.payload_length();
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self.bytes[start + data.len()..start + padded].fill(0);
        Ok(())
    }

    // Trailer

    pub(crate) fn set_trailer_present(&mut self, present: bool) -> Result<()> {
        if present == self.header_bit(BIT_26) {
            return Ok(());
        }
        if present {
            let end = self.bytes.len();
            self.insert_zeros(end, TRAILER_LENGTH)?;
        } else {
            let offset = self.bytes.len() - TRAILER_LENGTH;
            self.remove_bytes(offset, TRAILER_LENGTH);
        }
        self.set_header_bit(BIT_26, present);
        Ok(())
    }

    pub(crate) fn trailer_offset(&self) -> usize {
        self.bytes.len() - self.trailer_length()
    }

    // Stream identifier

    pub fn stream_identifier(&self) -> Option<u32> {
        self.packet_type().has_stream_id().then(|| self.read_u32(HEADER_WORD_LENGTH))
    }

    /// Set or clear the stream identifier. Clearing is only possible for data
    /// packets, which become the unidentified variant of their type.
    pub fn set_stream_identifier(&mut self, stream_id: Option<u32>) -> Result<()> {
        let current = self.packet_type();
        match stream_id {
            Some(id) => {
                if !current.has_stream_id() {
                    self.set_packet_type(current.with_stream_id(true))?;
                }
                self.write_u32(HEADER_WORD_LENGTH, id);
            }
            None if !current.has_stream_id() => {}
            None if current.is_data() => self.set_packet_type(current.with_stream_id(false))?,
            None => {
                return Err(VrtError::unsupported(
                    "set_stream_identifier",
                    format!("{current:?} packets always carry a stream identifier"),
                ));
            }
        }
        Ok(())
    }

    // Class identifier

    pub fn class_id(&self) -> Option<ClassId> {
        self.class_identifier_bits().map(ClassId::from_bits)
    }

    /// 56 significant bits of the class identifier (OUI, ICC, PCC).
    pub fn class_identifier_bits(&self) -> Option<i64> {
        if !self.header_bit(CLASS_ID_BIT) {
            return None;
        }
        let offset = self.class_id_offset();
        let high = u64::from(self.read_u32(offset) & 0x00FF_FFFF);
        let low = u64::from(self.read_u32(offset + 4));
        Some(((high << 32) | low) as i64)
    }

    /// Set or remove the class-identifier section. Removing it also drops the
    /// pad-bit count stored in its first word.
    pub fn set_class_id(&mut self, class_id: Option<ClassId>) -> Result<()> {
        let offset = self.class_id_offset();
        let present = self.header_bit(CLASS_ID_BIT);
        match class_id {
            Some(id) => {
                if !present {
                    self.insert_zeros(offset, CLASS_ID_LENGTH)?;
                    self.set_header_bit(CLASS_ID_BIT, true);
                }
                let pad = self.read_u32(offset) & 0xFF00_0000;
                self.write_u32(offset, pad | (id.oui & 0x00FF_FFFF));
                self.write_u32(offset + 4, (u32::from(id.icc) << 16) | u32::from(id.pcc));
            }
            None if present => {
                self.remove_bytes(offset, CLASS_ID_LENGTH);
                self.set_header_bit(CLASS_ID_BIT, false);
            }
            None => {}
        }
        Ok(())
    }

    /// Text form of [`set_class_id`](Self::set_class_id); an empty string removes the section.
    pub fn set_class_id_str(&mut self, class_id: &str) -> Result<()> {
        if class_id.trim().is_empty() {
            self.set_class_id(None)
        } else {
            self.set_class_id(Some(class_id.parse()?))
        }
    }

    // Pad bits

    /// Pad-bit count as stored, regardless of the configured version.
    pub fn pad_bit_count(&self) -> u8 {
        if !self.header_bit(CLASS_ID_BIT) {
            return 0;
        }
        self.bytes[self.class_id_offset()] >> PAD_BITS_SHIFT
    }

    /// Store the pad-bit count in the class-identifier word.
    ///
    /// A non-zero count needs V49b and adds an all-zero class identifier when
    /// none is present. Zero clears a stored count; if that leaves the class
    /// identifier entirely zero it is dropped. An all-zero class identifier
    /// with no count stored is kept.
    pub fn set_pad_bit_count(&mut self, bits: u8) -> Result<()> {
        if bits > 31 {
            return Err(VrtError::invalid_value("pad bit count", format!("{bits} exceeds 31")));
        }
        if bits == 0 {
            if self.clear_pad_bits() {
                let offset = self.class_id_offset();
                if self.slice(offset, CLASS_ID_LENGTH).iter().all(|b| *b == 0) {
                    self.set_class_id(None)?;
                }
            }
            return Ok(());
        }
        if !self.config.version.supports_pad_bits() {
            return Err(VrtError::unsupported(
                "set_pad_bit_count",
                format!("pad bits require V49b, configured version is {}", self.config.version),
            ));
        }
        if !self.header_bit(CLASS_ID_BIT) {
            self.set_class_id(Some(ClassId::default()))?;
        }
        let offset = self.class_id_offset();
        self.bytes[offset] = (self.bytes[offset] & 0x07) | (bits << PAD_BITS_SHIFT);
        Ok(())
    }

    /// Zero the stored count, leaving the class identifier in place. Returns
    /// whether a non-zero count was cleared.
    pub(crate) fn clear_pad_bits(&mut self) -> bool {
        if self.pad_bit_count() == 0 {
            return false;
        }
        let offset = self.class_id_offset();
        self.bytes[offset] &= 0x07;
        true
    }

    // Timestamp

    pub fn integer_mode(&self) -> IntegerMode {
        IntegerMode::from_bits(self.header_word() >> TSI_SHIFT)
    }

    pub fn fractional_mode(&self) -> FractionalMode {
        FractionalMode::from_bits(self.header_word() >> TSF_SHIFT)
    }

    pub fn time_stamp(&self) -> TimeStamp {
        let seconds = if self.tsi_length() > 0 { self.read_u32(self.tsi_offset()) } else { 0 };
        let fractional = if self.tsf_length() > 0 { get_be::<u64>(&self.bytes, self.tsf_offset()) } else { 0 };
        TimeStamp::from_raw(self.integer_mode(), self.fractional_mode(), seconds, fractional)
    }

    /// Write both timestamp halves, resizing each section independently.
    pub fn set_time_stamp(&mut self, ts: &TimeStamp) -> Result<()> {
        let tsi_needed = ts.integer_mode() != IntegerMode::None;
        let tsf_needed = ts.fractional_mode() != FractionalMode::None;
        let growth = usize::from(tsi_needed && self.tsi_length() == 0) * TSI_LENGTH
            + usize::from(tsf_needed && self.tsf_length() == 0) * TSF_LENGTH;
        self.check_growth(growth)?;

        match (tsi_needed, self.tsi_length() > 0) {
            (true, false) => self.insert_zeros(self.tsi_offset(), TSI_LENGTH)?,
            (false, true) => self.remove_bytes(self.tsi_offset(), TSI_LENGTH),
            _ => {}
        }
        let word = self.header_word() & !(0x3 << TSI_SHIFT);
        self.set_header_word(word | (ts.integer_mode().bits() << TSI_SHIFT));

        match (tsf_needed, self.tsf_length() > 0) {
            (true, false) => self.insert_zeros(self.tsf_offset(), TSF_LENGTH)?,
            (false, true) => self.remove_bytes(self.tsf_offset(), TSF_LENGTH),
            _ => {}
        }
        let word = self.header_word() & !(0x3 << TSF_SHIFT);
        self.set_header_word(word | (ts.fractional_mode().bits() << TSF_SHIFT));

        if tsi_needed {
            let offset = self.tsi_offset();
            self.write_u32(offset, ts.raw_seconds());
        }
        if tsf_needed {
            let offset = self.tsf_offset();
            put_be(&mut self.bytes, offset, ts.raw_fractional());
        }
        Ok(())
    }

    // Packet count

    pub fn packet_count(&self) -> u8 {
        ((self.header_word() >> COUNT_SHIFT) & 0xF) as u8
    }

    pub fn set_packet_count(&mut self, count: u8) -> Result<()> {
        if count > 15 {
            return Err(VrtError::invalid_value("packet count", format!("{count} exceeds 15")));
        }
        let word = self.header_word() & !(0xF << COUNT_SHIFT);
        self.set_header_word(word | (u32::from(count) << COUNT_SHIFT));
        Ok(())
    }

    // Validation

    /// Structural header check.
    ///
    /// Both modes reject length mismatches (buffer, size field, `known_length`)
    /// and headers that do not fit. Strict mode also rejects reserved bits,
    /// V49.2 indicators and pad bits under V49, and real-time fractions of one
    /// second or more.
    pub fn validate_header(&self, strict: bool, known_length: Option<usize>) -> Result<()> {
        let fail = |reason: String| Err(VrtError::validation("VRT packet header", reason));
        let length = self.bytes.len();
        if length < HEADER_WORD_LENGTH || length % 4 != 0 {
            return fail(format!("buffer length {length} is not a whole number of words"));
        }
        if self.packet_length() != length {
            return fail(format!(
                "packet size field says {} bytes, buffer holds {length}",
                self.packet_length()
            ));
        }
        if let Some(known) = known_length {
            if known != length {
                return fail(format!("expected {known} bytes, packet is {length}"));
            }
        }
        let word = self.header_word();
        if PacketType::from_code((word >> TYPE_SHIFT) as u8).is_err() {
            return fail(format!("reserved packet type {}", word >> TYPE_SHIFT));
        }
        let needed = self.header_length() + self.trailer_length();
        if needed > length {
            return fail(format!("header and trailer need {needed} bytes, packet is {length}"));
        }
        if !strict {
            return Ok(());
        }

        let packet_type = self.packet_type();
        if packet_type.is_context() && self.header_bit(BIT_26) {
            return fail("reserved bit 26 set in a context packet header".to_string());
        }
        if packet_type.is_command() && self.header_bit(BIT_25) {
            return fail("reserved bit 25 set in a command packet header".to_string());
        }
        if !self.config.version.supports_pad_bits() {
            if self.header_bit(BIT_25) {
                return fail("not-V49.0 indicator set under V49".to_string());
            }
            if self.pad_bit_count() != 0 {
                return fail(format!("pad bit count {} set under V49", self.pad_bit_count()));
            }
        }
        if self.header_bit(CLASS_ID_BIT) && self.bytes[self.class_id_offset()] & 0x07 != 0 {
            return fail("reserved class identifier bits set".to_string());
        }
        let ts = self.time_stamp();
        if ts.fractional_mode() == FractionalMode::RealTime && ts.raw_fractional() >= ONE_SECOND_PICOS {
            return fail(format!("real-time fraction {} ps is not below one second", ts.raw_fractional()));
        }
        Ok(())
    }
}

impl PartialEq for PacketBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PacketBuffer {}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("packet_type", &self.packet_type())
            .field("packet_length", &self.packet_length())
            .field("header_length", &self.header_length())
            .field("stream_id", &self.stream_identifier())
            .field("class_id", &self.class_id().map(|c| c.to_string()))
            .field("time_stamp", &self.time_stamp())
            .finish()
    }
}
