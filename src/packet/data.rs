//! Signal data packets.

use super::buffer::{BIT_24, BIT_25, BIT_26};
use super::payload::SampleCodec;
use super::{PacketBuffer, VrtPacket};
use crate::numeric::ByteOrder;
use crate::types::{Indicator, PacketType, PayloadFormat, StateEventIndicators};
use crate::{CodecConfig, Result, VrtError};
use tracing::debug;

/// Data packet: samples plus an optional state/event trailer.
///
/// The payload format is not carried on the wire; attach it with
/// [`with_payload_format`](Self::with_payload_format) (usually taken from the
/// paired context packet) to use the typed sample accessors.
#[derive(Debug, Clone)]
pub struct DataPacket {
    buffer: PacketBuffer,
    payload_format: Option<PayloadFormat>,
}

/// Packets compare by wire bytes; the attached format is not part of them.
impl PartialEq for DataPacket {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer
    }
}

impl Eq for DataPacket {}

impl DataPacket {
    /// Empty `Data` packet with a zero stream identifier.
    pub fn new(config: CodecConfig) -> Self {
        Self { buffer: PacketBuffer::new(PacketType::Data, config), payload_format: None }
    }

    pub fn with_type(packet_type: PacketType, config: CodecConfig) -> Result<Self> {
        if !packet_type.is_data() {
            return Err(VrtError::unsupported(
                "DataPacket::with_type",
                format!("packet type {packet_type:?} not supported by this class"),
            ));
        }
        Ok(Self { buffer: PacketBuffer::new(packet_type, config), payload_format: None })
    }

    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        Self::from_buffer(PacketBuffer::from_bytes(buf, config)?)
    }

    pub(crate) fn from_buffer(buffer: PacketBuffer) -> Result<Self> {
        if !buffer.packet_type().is_data() {
            return Err(VrtError::malformed(
                "data packet",
                format!("packet type {:?} is not a data packet", buffer.packet_type()),
            ));
        }
        Ok(Self { buffer, payload_format: None })
    }

    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = Some(format);
        self
    }

    pub fn payload_format(&self) -> Option<PayloadFormat> {
        self.payload_format
    }

    pub fn set_payload_format(&mut self, format: Option<PayloadFormat>) {
        self.payload_format = format;
    }

    // Header flags

    pub fn is_spectrum_mode(&self) -> bool {
        self.buffer.header_bit(BIT_24)
    }

    pub fn set_spectrum_mode(&mut self, spectrum: bool) {
        self.buffer.set_header_bit(BIT_24, spectrum);
    }

    /// Not-V49.0 indicator; only writable under V49b.
    pub fn is_not_v49d0(&self) -> bool {
        self.buffer.header_bit(BIT_25)
    }

    pub fn set_not_v49d0(&mut self, flag: bool) -> Result<()> {
        if flag && !self.buffer.config().version.supports_pad_bits() {
            return Err(VrtError::unsupported("set_not_v49d0", "requires V49b"));
        }
        self.buffer.set_header_bit(BIT_25, flag);
        Ok(())
    }

    // Trailer

    pub fn trailer(&self) -> Option<StateEventIndicators> {
        self.buffer
            .header_bit(BIT_26)
            .then(|| StateEventIndicators(self.buffer.read_u32(self.buffer.trailer_offset())))
    }

    /// Set or remove the trailer word.
    pub fn set_trailer(&mut self, trailer: Option<StateEventIndicators>) -> Result<()> {
        self.buffer.set_trailer_present(trailer.is_some())?;
        if let Some(word) = trailer {
            let offset = self.buffer.trailer_offset();
            self.buffer.write_u32(offset, word.value());
        }
        Ok(())
    }

    pub fn indicator(&self, indicator: Indicator) -> Option<bool> {
        self.trailer().and_then(|t| t.get(indicator))
    }

    /// Set one indicator, adding the trailer if needed.
    pub fn set_indicator(&mut self, indicator: Indicator, value: Option<bool>) -> Result<()> {
        if value.is_none() && self.trailer().is_none() {
            return Ok(());
        }
        let mut trailer = self.trailer().unwrap_or_default();
        trailer.set(indicator, value);
        self.set_trailer(Some(trailer))
    }

    pub fn associated_context_packets(&self) -> Option<u8> {
        self.trailer().and_then(|t| t.associated_context_packets())
    }

    pub fn set_associated_context_packets(&mut self, count: Option<u8>) -> Result<()> {
        let mut trailer = self.trailer().unwrap_or_default();
        trailer.set_associated_context_packets(count)?;
        if count.is_none() && self.trailer().is_none() {
            return Ok(());
        }
        self.set_trailer(Some(trailer))
    }

    // Raw payload

    /// Replace the payload bytes and clear any pad-bit count. The class
    /// identifier section is left in place.
    pub fn set_payload(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.set_payload(data)?;
        self.buffer.clear_pad_bits();
        Ok(())
    }

    // Samples

    fn codec(&self) -> Result<SampleCodec> {
        let format = self.payload_format.ok_or_else(|| {
            VrtError::unsupported("sample access", "no payload format attached to the data packet")
        })?;
        SampleCodec::new(format)
    }

    /// Number of scalars in the payload, honoring the pad-bit count.
    pub fn scalar_data_length(&self) -> Result<usize> {
        let codec = self.codec()?;
        Ok(codec.scalar_count(self.buffer.payload_length(), self.buffer.pad_bit_count()))
    }

    /// Number of samples; a complex pair counts once.
    pub fn data_length(&self) -> Result<usize> {
        let scalars = self.scalar_data_length()?;
        Ok(if self.codec()?.format().is_complex() { scalars / 2 } else { scalars })
    }

    /// Size the payload for `scalars` items.
    ///
    /// A pad-bit count is stored only when the payload length alone would
    /// imply a different count; under V49 that case is rejected.
    pub fn set_scalar_data_length(&mut self, scalars: usize) -> Result<()> {
        let codec = self.codec()?;
        let format = codec.format();
        let (bytes, pad) = format.encoded_length(scalars);
        let needs_pad = codec.scalar_count(bytes, 0) != scalars;
        if needs_pad && !self.buffer.config().version.supports_pad_bits() {
            return Err(VrtError::unsupported(
                "set_scalar_data_length",
                format!("{scalars} scalars need {pad} pad bits, which require V49b"),
            ));
        }
        let class_id_growth = if needs_pad && self.buffer.class_id().is_none() { 8 } else { 0 };
        self.buffer
            .check_growth(bytes.saturating_sub(self.buffer.payload_length()) + class_id_growth)?;
        self.buffer.set_payload_length(bytes)?;
        let pad = if needs_pad { pad as u8 } else { 0 };
        if needs_pad {
            self.buffer.set_pad_bit_count(pad)?;
        } else {
            self.buffer.clear_pad_bits();
        }
        debug!("Sized data payload for {} scalars: {} bytes, {} pad bits", scalars, bytes, pad);
        Ok(())
    }

    pub fn set_data_length(&mut self, samples: usize) -> Result<()> {
        let per_sample = if self.codec()?.format().is_complex() { 2 } else { 1 };
        self.set_scalar_data_length(samples * per_sample)
    }

    fn payload_range(&self) -> (usize, usize) {
        (self.buffer.payload_offset(), self.buffer.payload_length())
    }

    /// Read one scalar in the given byte order.
    pub fn sample_f64(&self, index: usize, order: ByteOrder) -> Result<f64> {
        self.codec()?.read_f64(self.buffer.payload(), index, order)
    }

    /// Write one scalar in place; the payload is not resized.
    pub fn set_sample_f64(&mut self, index: usize, value: f64, order: ByteOrder) -> Result<()> {
        let codec = self.codec()?;
        let (start, len) = self.payload_range();
        let mut payload = self.buffer.slice(start, len).to_vec();
        codec.write_f64(&mut payload, index, value, order)?;
        self.buffer.write_slice(start, &payload);
        Ok(())
    }

    pub fn sample_i64(&self, index: usize, order: ByteOrder) -> Result<i64> {
        self.codec()?.read_i64(self.buffer.payload(), index, order)
    }

    pub fn set_sample_i64(&mut self, index: usize, value: i64, order: ByteOrder) -> Result<()> {
        let codec = self.codec()?;
        let (start, len) = self.payload_range();
        let mut payload = self.buffer.slice(start, len).to_vec();
        codec.write_i64(&mut payload, index, value, order)?;
        self.buffer.write_slice(start, &payload);
        Ok(())
    }

    pub fn data_f64(&self) -> Result<Vec<f64>> {
        let codec = self.codec()?;
        let payload = self.buffer.payload();
        (0..self.scalar_data_length()?)
            .map(|i| codec.read_f64(payload, i, ByteOrder::BigEndian))
            .collect()
    }

    /// Replace the payload with `values`, resizing it to fit.
    pub fn set_data_f64(&mut self, values: &[f64]) -> Result<()> {
        let codec = self.codec()?;
        let payload = self.resized_payload(values.len())?;
        self.write_payload(payload, |buf| {
            values
                .iter()
                .enumerate()
                .try_for_each(|(i, v)| codec.write_f64(buf, i, *v, ByteOrder::BigEndian))
        })
    }

    pub fn data_f32(&self) -> Result<Vec<f32>> {
        Ok(self.data_f64()?.into_iter().map(|v| v as f32).collect())
    }

    pub fn set_data_f32(&mut self, values: &[f32]) -> Result<()> {
        let widened: Vec<f64> = values.iter().map(|v| f64::from(*v)).collect();
        self.set_data_f64(&widened)
    }

    pub fn data_i64(&self) -> Result<Vec<i64>> {
        let codec = self.codec()?;
        let payload = self.buffer.payload();
        (0..self.scalar_data_length()?)
            .map(|i| codec.read_i64(payload, i, ByteOrder::BigEndian))
            .collect()
    }

    pub fn set_data_i64(&mut self, values: &[i64]) -> Result<()> {
        let codec = self.codec()?;
        let payload = self.resized_payload(values.len())?;
        self.write_payload(payload, |buf| {
            values
                .iter()
                .enumerate()
                .try_for_each(|(i, v)| codec.write_i64(buf, i, *v, ByteOrder::BigEndian))
        })
    }

    /// Values outside the `i32` range saturate.
    pub fn data_i32(&self) -> Result<Vec<i32>> {
        Ok(self
            .data_i64()?
            .into_iter()
            .map(|v| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
            .collect())
    }

    pub fn set_data_i32(&mut self, values: &[i32]) -> Result<()> {
        let widened: Vec<i64> = values.iter().map(|v| i64::from(*v)).collect();
        self.set_data_i64(&widened)
    }

    /// Resize for `scalars` items and return a zeroed copy of the new payload.
    fn resized_payload(&mut self, scalars: usize) -> Result<Vec<u8>> {
        self.set_scalar_data_length(scalars)?;
        Ok(vec![0u8; self.buffer.payload_length()])
    }

    fn write_payload<F>(&mut self, mut payload: Vec<u8>, fill: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        fill(&mut payload)?;
        let start = self.buffer.payload_offset();
        self.buffer.write_slice(start, &payload);
        Ok(())
    }
}

impl VrtPacket for DataPacket {
    fn buffer(&self) -> &PacketBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut PacketBuffer {
        &mut self.buffer
    }

    fn supports_packet_type(&self, packet_type: PacketType) -> bool {
        packet_type.is_data()
    }

    fn validate_payload(&self, strict: bool) -> Result<()> {
        if let Some(format) = self.payload_format {
            if strict {
                format.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassId, DataType, RealComplexType, TimeStamp};
    use crate::VrtVersion;
    use anyhow::Result;

    fn packet(data_type: DataType, version: VrtVersion) -> DataPacket {
        DataPacket::new(CodecConfig::new(version)).with_payload_format(PayloadFormat::from_data_type(data_type))
    }

    #[test]
    fn samples_round_trip_through_the_payload() -> Result<()> {
        let mut p = packet(DataType::Int16, VrtVersion::V49);
        p.set_data_i32(&[1, -2, 300, -400])?;
        assert_eq!(p.payload_length(), 8);
        assert_eq!(p.payload(), [0x00, 0x01, 0xFF, 0xFE, 0x01, 0x2C, 0xFE, 0x70]);
        assert_eq!(p.data_i32()?, vec![1, -2, 300, -400]);
        assert_eq!(p.data_f64()?, vec![1.0, -2.0, 300.0, -400.0]);

        let mut f = packet(DataType::Float, VrtVersion::V49);
        f.set_data_f32(&[0.5, -1.25])?;
        assert_eq!(f.data_f32()?, vec![0.5, -1.25]);
        Ok(())
    }

    #[test]
    fn complex_samples_count_pairs() -> Result<()> {
        let mut format = PayloadFormat::from_data_type(DataType::Int16);
        format.set_real_complex_type(RealComplexType::ComplexCartesian);
        let mut p = DataPacket::new(CodecConfig::default()).with_payload_format(format);
        p.set_data_length(3)?;
        assert_eq!(p.scalar_data_length()?, 6);
        assert_eq!(p.data_length()?, 3);
        assert_eq!(p.payload_length(), 12);
        Ok(())
    }

    #[test]
    fn odd_scalar_counts_need_pad_bits() -> Result<()> {
        // 16-bit items in 32-bit words: an odd count leaves a half-empty word
        let mut strict = packet(DataType::Int16, VrtVersion::V49);
        let before = strict.as_bytes().to_vec();
        assert!(matches!(strict.set_scalar_data_length(3), Err(VrtError::UnsupportedOperation { .. })));
        assert_eq!(strict.as_bytes(), &before[..]);
        strict.set_scalar_data_length(4)?;
        assert_eq!(strict.scalar_data_length()?, 4);

        let mut relaxed = packet(DataType::Int16, VrtVersion::V49b);
        relaxed.set_scalar_data_length(3)?;
        assert_eq!(relaxed.pad_bit_count(), 16);
        assert_eq!(relaxed.scalar_data_length()?, 3);
        relaxed.set_scalar_data_length(2)?;
        assert_eq!(relaxed.pad_bit_count(), 0);
        assert_eq!(relaxed.scalar_data_length()?, 2);
        // resizing never removes header sections
        assert_eq!(relaxed.class_id(), Some(ClassId::default()));
        Ok(())
    }

    #[test]
    fn payload_writes_keep_an_all_zero_class_id() -> Result<()> {
        let mut p = packet(DataType::Int16, VrtVersion::V49b);
        p.set_class_id(Some(ClassId::new(0, 0, 0)?))?;
        p.set_payload(&[1, 2, 3, 4])?;
        assert_eq!(p.class_id(), Some(ClassId::default()));
        p.set_data_i32(&[5, 6])?;
        assert_eq!(p.class_id(), Some(ClassId::default()));
        assert_eq!(p.data_i32()?, vec![5, 6]);

        p.set_data_i32(&[7])?;
        assert_eq!(p.pad_bit_count(), 16);
        p.set_payload(&[0; 4])?;
        assert_eq!(p.pad_bit_count(), 0);
        assert_eq!(p.class_id(), Some(ClassId::default()));
        Ok(())
    }

    #[test]
    fn byte_swapped_access() -> Result<()> {
        let mut p = packet(DataType::Int32, VrtVersion::V49);
        p.set_data_i32(&[0, 0])?;
        p.set_sample_i64(1, 0x0102_0304, ByteOrder::LittleEndian)?;
        assert_eq!(&p.payload()[4..], [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(p.sample_i64(1, ByteOrder::BigEndian)?, 0x0403_0201);
        assert_eq!(p.sample_i64(1, ByteOrder::LittleEndian)?, 0x0102_0304);
        Ok(())
    }

    #[test]
    fn trailer_indicators() -> Result<()> {
        let mut p = DataPacket::new(CodecConfig::default());
        p.set_payload(&[1, 2, 3, 4])?;
        assert_eq!(p.trailer_length(), 0);
        p.set_indicator(Indicator::ValidData, Some(true))?;
        assert_eq!(p.trailer_length(), 4);
        assert_eq!(p.indicator(Indicator::ValidData), Some(true));
        assert_eq!(p.payload(), [1, 2, 3, 4]);
        p.set_associated_context_packets(Some(3))?;
        assert_eq!(p.associated_context_packets(), Some(3));
        p.set_trailer(None)?;
        assert_eq!(p.trailer_length(), 0);
        assert_eq!(p.payload(), [1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn sample_access_requires_a_format() {
        let p = DataPacket::new(CodecConfig::default());
        assert!(matches!(p.data_f64(), Err(VrtError::UnsupportedOperation { .. })));
    }

    #[test]
    fn timestamp_edit_keeps_samples() -> Result<()> {
        let mut p = packet(DataType::Int8, VrtVersion::V49);
        p.set_data_i32(&[1, 2, 3, 4, 5, 6, 7, 8])?;
        p.set_time_stamp(&TimeStamp::utc(1, 2)?)?;
        assert_eq!(p.data_i32()?, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(p.is_packet_valid());
        Ok(())
    }

    #[test]
    fn not_v49d0_flag_is_gated() -> Result<()> {
        let mut strict = DataPacket::new(CodecConfig::new(VrtVersion::V49));
        assert!(strict.set_not_v49d0(true).is_err());
        let mut relaxed = DataPacket::new(CodecConfig::new(VrtVersion::V49b));
        relaxed.set_not_v49d0(true)?;
        assert!(relaxed.is_not_v49d0());
        Ok(())
    }
}
