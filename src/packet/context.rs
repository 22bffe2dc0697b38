//! Context packets and the typed CIF field accessors they share with command
//! packets.

use super::buffer::{BIT_24, BIT_25};
use super::cif::{Attribute, CifField, IndicatorWord};
use super::indicator::{self, CHANGE_INDICATOR, SlotSizing};
use super::records::{ContextAssociationLists, DeviceId, Ephemeris, Gain, Geolocation, GpsAscii};
use super::{PacketBuffer, VrtPacket};
use crate::numeric::fixed::{from_fixed16, from_fixed64, to_fixed16, to_fixed64};
use crate::numeric::get_be;
use crate::types::{PacketType, PayloadFormat, StateEventIndicators, TimeStamp};
use crate::{CodecConfig, Result, VrtError};
use uuid::Uuid;

const FREQUENCY_RADIX: u32 = 20;
const REFERENCE_LEVEL_RADIX: u32 = 7;
const TEMPERATURE_RADIX: u32 = 6;

fn map_bytes<const N: usize>(value: Option<[u8; N]>) -> Option<Vec<u8>> {
    value.map(|bytes| bytes.to_vec())
}

/// Typed access to CIF-indexed fields.
///
/// Implementors supply raw current-value access; every typed getter returns
/// `None` when the field is absent and every setter removes the field when
/// given `None`.
pub trait CifAccess {
    /// Current-value bytes of `field`.
    fn field_bytes(&self, field: CifField) -> Option<&[u8]>;

    /// Insert, overwrite or (with `None`) remove a field.
    fn set_field_bytes(&mut self, field: CifField, value: Option<&[u8]>) -> Result<()>;

    fn has_field(&self, field: CifField) -> bool {
        self.field_bytes(field).is_some()
    }

    // Generic widths

    fn field_u32(&self, field: CifField) -> Option<u32> {
        self.field_bytes(field).filter(|b| b.len() == 4).map(|b| get_be(b, 0))
    }

    fn set_field_u32(&mut self, field: CifField, value: Option<u32>) -> Result<()> {
        self.set_field_bytes(field, map_bytes(value.map(u32::to_be_bytes)).as_deref())
    }

    fn field_u64(&self, field: CifField) -> Option<u64> {
        self.field_bytes(field).filter(|b| b.len() == 8).map(|b| get_be(b, 0))
    }

    fn set_field_u64(&mut self, field: CifField, value: Option<u64>) -> Result<()> {
        self.set_field_bytes(field, map_bytes(value.map(u64::to_be_bytes)).as_deref())
    }

    fn field_uuid(&self, field: CifField) -> Option<Uuid> {
        self.field_bytes(field).and_then(|b| Uuid::from_slice(b).ok())
    }

    fn set_field_uuid(&mut self, field: CifField, value: Option<Uuid>) -> Result<()> {
        self.set_field_bytes(field, value.as_ref().map(|u| &u.as_bytes()[..]))
    }

    /// 64-bit fixed point with a 20-bit fraction, in Hz.
    fn frequency_field(&self, field: CifField) -> Option<f64> {
        self.field_u64(field).map(|bits| from_fixed64(bits as i64, FREQUENCY_RADIX))
    }

    fn set_frequency_field(&mut self, field: CifField, hz: Option<f64>) -> Result<()> {
        self.set_field_u64(field, hz.map(|v| to_fixed64(v, FREQUENCY_RADIX) as u64))
    }

    // CIF0

    fn reference_point_identifier(&self) -> Option<u32> {
        self.field_u32(CifField::ReferencePointId)
    }

    fn set_reference_point_identifier(&mut self, id: Option<u32>) -> Result<()> {
        self.set_field_u32(CifField::ReferencePointId, id)
    }

    fn bandwidth(&self) -> Option<f64> {
        self.frequency_field(CifField::Bandwidth)
    }

    fn set_bandwidth(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::Bandwidth, hz)
    }

    fn if_reference_frequency(&self) -> Option<f64> {
        self.frequency_field(CifField::IfReferenceFrequency)
    }

    fn set_if_reference_frequency(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::IfReferenceFrequency, hz)
    }

    fn rf_reference_frequency(&self) -> Option<f64> {
        self.frequency_field(CifField::RfReferenceFrequency)
    }

    fn set_rf_reference_frequency(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::RfReferenceFrequency, hz)
    }

    fn rf_reference_frequency_offset(&self) -> Option<f64> {
        self.frequency_field(CifField::RfReferenceFrequencyOffset)
    }

    fn set_rf_reference_frequency_offset(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::RfReferenceFrequencyOffset, hz)
    }

    fn if_band_offset(&self) -> Option<f64> {
        self.frequency_field(CifField::IfBandOffset)
    }

    fn set_if_band_offset(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::IfBandOffset, hz)
    }

    /// dBm, Q9.7 in the low half of the word.
    fn reference_level(&self) -> Option<f64> {
        self.field_u32(CifField::ReferenceLevel)
            .map(|w| from_fixed16(w as u16 as i16, REFERENCE_LEVEL_RADIX))
    }

    fn set_reference_level(&mut self, dbm: Option<f64>) -> Result<()> {
        let word = dbm.map(|v| u32::from(to_fixed16(v, REFERENCE_LEVEL_RADIX) as u16));
        self.set_field_u32(CifField::ReferenceLevel, word)
    }

    fn gain(&self) -> Option<Gain> {
        self.field_u32(CifField::Gain).map(Gain::from_word)
    }

    fn set_gain(&mut self, gain: Option<Gain>) -> Result<()> {
        self.set_field_u32(CifField::Gain, gain.map(|g| g.to_word()))
    }

    fn over_range_count(&self) -> Option<u32> {
        self.field_u32(CifField::OverRangeCount)
    }

    fn set_over_range_count(&mut self, count: Option<u32>) -> Result<()> {
        self.set_field_u32(CifField::OverRangeCount, count)
    }

    fn sample_rate(&self) -> Option<f64> {
        self.frequency_field(CifField::SampleRate)
    }

    fn set_sample_rate(&mut self, hz: Option<f64>) -> Result<()> {
        if hz.is_some_and(|v| v < 0.0) {
            return Err(VrtError::invalid_value("sample rate", "must not be negative"));
        }
        self.set_frequency_field(CifField::SampleRate, hz)
    }

    /// Picoseconds.
    fn time_stamp_adjustment(&self) -> Option<i64> {
        self.field_u64(CifField::TimeStampAdjustment).map(|v| v as i64)
    }

    fn set_time_stamp_adjustment(&mut self, picoseconds: Option<i64>) -> Result<()> {
        self.set_field_u64(CifField::TimeStampAdjustment, picoseconds.map(|v| v as u64))
    }

    /// Integer seconds of the last timestamp calibration.
    fn time_stamp_calibration(&self) -> Option<u32> {
        self.field_u32(CifField::TimeStampCalibration)
    }

    fn set_time_stamp_calibration(&mut self, seconds: Option<u32>) -> Result<()> {
        self.set_field_u32(CifField::TimeStampCalibration, seconds)
    }

    /// Degrees Celsius, Q10.6 in the low half of the word.
    fn temperature(&self) -> Option<f64> {
        self.field_u32(CifField::Temperature)
            .map(|w| from_fixed16(w as u16 as i16, TEMPERATURE_RADIX))
    }

    fn set_temperature(&mut self, celsius: Option<f64>) -> Result<()> {
        if celsius.is_some_and(|v| v < -273.15) {
            return Err(VrtError::invalid_value("temperature", "below absolute zero"));
        }
        let word = celsius.map(|v| u32::from(to_fixed16(v, TEMPERATURE_RADIX) as u16));
        self.set_field_u32(CifField::Temperature, word)
    }

    fn device_identifier(&self) -> Option<DeviceId> {
        self.field_bytes(CifField::DeviceIdentifier).and_then(|b| DeviceId::from_bytes(b).ok())
    }

    fn set_device_identifier(&mut self, id: Option<DeviceId>) -> Result<()> {
        let bytes = id.map(|d| d.to_bytes()).transpose()?;
        self.set_field_bytes(CifField::DeviceIdentifier, bytes.as_deref())
    }

    fn state_event_indicators(&self) -> Option<StateEventIndicators> {
        self.field_u32(CifField::StateEventIndicators).map(StateEventIndicators)
    }

    fn set_state_event_indicators(&mut self, indicators: Option<StateEventIndicators>) -> Result<()> {
        self.set_field_u32(CifField::StateEventIndicators, indicators.map(|i| i.value()))
    }

    fn data_payload_format(&self) -> Option<PayloadFormat> {
        self.field_u64(CifField::DataPayloadFormat).map(PayloadFormat::from_bits)
    }

    fn set_data_payload_format(&mut self, format: Option<PayloadFormat>) -> Result<()> {
        if let Some(f) = &format {
            f.validate()?;
        }
        self.set_field_u64(CifField::DataPayloadFormat, format.map(|f| f.bits()))
    }

    fn formatted_gps(&self) -> Option<Geolocation> {
        self.field_bytes(CifField::FormattedGps).and_then(|b| Geolocation::from_bytes(b).ok())
    }

    fn set_formatted_gps(&mut self, geolocation: Option<Geolocation>) -> Result<()> {
        let bytes = geolocation.map(|g| g.to_bytes()).transpose()?;
        self.set_field_bytes(CifField::FormattedGps, bytes.as_deref())
    }

    fn formatted_ins(&self) -> Option<Geolocation> {
        self.field_bytes(CifField::FormattedIns).and_then(|b| Geolocation::from_bytes(b).ok())
    }

    fn set_formatted_ins(&mut self, geolocation: Option<Geolocation>) -> Result<()> {
        let bytes = geolocation.map(|g| g.to_bytes()).transpose()?;
        self.set_field_bytes(CifField::FormattedIns, bytes.as_deref())
    }

    fn ecef_ephemeris(&self) -> Option<Ephemeris> {
        self.field_bytes(CifField::EcefEphemeris).and_then(|b| Ephemeris::from_bytes(b).ok())
    }

    fn set_ecef_ephemeris(&mut self, ephemeris: Option<Ephemeris>) -> Result<()> {
        let bytes = ephemeris.map(|e| e.to_bytes()).transpose()?;
        self.set_field_bytes(CifField::EcefEphemeris, bytes.as_deref())
    }

    fn relative_ephemeris(&self) -> Option<Ephemeris> {
        self.field_bytes(CifField::RelativeEphemeris).and_then(|b| Ephemeris::from_bytes(b).ok())
    }

    fn set_relative_ephemeris(&mut self, ephemeris: Option<Ephemeris>) -> Result<()> {
        let bytes = ephemeris.map(|e| e.to_bytes()).transpose()?;
        self.set_field_bytes(CifField::RelativeEphemeris, bytes.as_deref())
    }

    fn ephemeris_reference_identifier(&self) -> Option<u32> {
        self.field_u32(CifField::EphemerisReferenceId)
    }

    fn set_ephemeris_reference_identifier(&mut self, id: Option<u32>) -> Result<()> {
        self.set_field_u32(CifField::EphemerisReferenceId, id)
    }

    fn gps_ascii(&self) -> Option<GpsAscii> {
        self.field_bytes(CifField::GpsAscii).and_then(|b| GpsAscii::from_bytes(b).ok())
    }

    fn set_gps_ascii(&mut self, gps: Option<&GpsAscii>) -> Result<()> {
        let bytes = gps.map(GpsAscii::to_bytes).transpose()?;
        self.set_field_bytes(CifField::GpsAscii, bytes.as_deref())
    }

    fn context_association_lists(&self) -> Option<ContextAssociationLists> {
        self.field_bytes(CifField::ContextAssociationLists)
            .and_then(|b| ContextAssociationLists::from_bytes(b).ok())
    }

    fn set_context_association_lists(&mut self, lists: Option<&ContextAssociationLists>) -> Result<()> {
        let bytes = lists.map(ContextAssociationLists::to_bytes).transpose()?;
        self.set_field_bytes(CifField::ContextAssociationLists, bytes.as_deref())
    }

    // CIF1

    fn aux_frequency(&self) -> Option<f64> {
        self.frequency_field(CifField::AuxFrequency)
    }

    fn set_aux_frequency(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::AuxFrequency, hz)
    }

    fn aux_bandwidth(&self) -> Option<f64> {
        self.frequency_field(CifField::AuxBandwidth)
    }

    fn set_aux_bandwidth(&mut self, hz: Option<f64>) -> Result<()> {
        self.set_frequency_field(CifField::AuxBandwidth, hz)
    }

    fn aux_gain(&self) -> Option<Gain> {
        self.field_u32(CifField::AuxGain).map(Gain::from_word)
    }

    fn set_aux_gain(&mut self, gain: Option<Gain>) -> Result<()> {
        self.set_field_u32(CifField::AuxGain, gain.map(|g| g.to_word()))
    }
}

/// IF context packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPacket {
    buffer: PacketBuffer,
}

impl ContextPacket {
    /// Empty `Context` packet: zero stream identifier, CIF0 with no fields.
    pub fn new(config: CodecConfig) -> Self {
        Self { buffer: PacketBuffer::with_payload_words(PacketType::Context, config, &[0]) }
    }

    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        Self::from_buffer(PacketBuffer::from_bytes(buf, config)?)
    }

    pub(crate) fn from_buffer(buffer: PacketBuffer) -> Result<Self> {
        if !buffer.packet_type().is_context() {
            return Err(VrtError::malformed(
                "context packet",
                format!("packet type {:?} is not a context packet", buffer.packet_type()),
            ));
        }
        indicator::scan(buffer.as_bytes(), buffer.payload_offset(), SlotSizing::FieldWidth)
            .map_err(|e| VrtError::malformed("context packet", e.to_string()))?;
        Ok(Self { buffer })
    }

    fn start(&self) -> usize {
        self.buffer.payload_offset()
    }

    // Header flags and CIF0 control bits

    /// Timestamp mode: `true` when the timestamp is general rather than precise.
    pub fn is_tsm(&self) -> bool {
        self.buffer.header_bit(BIT_24)
    }

    pub fn set_tsm(&mut self, general: bool) {
        self.buffer.set_header_bit(BIT_24, general);
    }

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

    /// CIF0 change indicator: some field differs from the previous packet.
    pub fn change_indicator(&self) -> bool {
        self.buffer.read_u32(self.start()) & CHANGE_INDICATOR != 0
    }

    pub fn set_change_indicator(&mut self, changed: bool) {
        let start = self.start();
        let word = self.buffer.read_u32(start);
        let word = if changed { word | CHANGE_INDICATOR } else { word & !CHANGE_INDICATOR };
        self.buffer.write_u32(start, word);
    }

    /// Fields present, in wire order.
    pub fn fields(&self) -> Vec<CifField> {
        indicator::scan(self.buffer.as_bytes(), self.start(), SlotSizing::FieldWidth)
            .map(|layout| layout.fields)
            .unwrap_or_default()
    }

    // CIF7

    pub fn attribute_bytes(&self, field: CifField, attribute: Attribute) -> Option<&[u8]> {
        indicator::slot_bytes(self.buffer.as_bytes(), self.start(), SlotSizing::FieldWidth, field, attribute)
    }

    /// Overwrite one attribute value of a present field.
    pub fn set_attribute_bytes(&mut self, field: CifField, attribute: Attribute, value: &[u8]) -> Result<()> {
        let start = self.start();
        indicator::set_slot(&mut self.buffer, start, SlotSizing::FieldWidth, field, attribute, value)
    }

    /// Enabled attributes, or `None` when there is no CIF7 word.
    pub fn cif7_attributes(&self) -> Option<Vec<Attribute>> {
        indicator::scan(self.buffer.as_bytes(), self.start(), SlotSizing::FieldWidth)
            .ok()
            .and_then(|layout| layout.word(IndicatorWord::Cif7))
            .map(Attribute::from_word)
    }

    pub fn add_cif7(&mut self) -> Result<()> {
        let start = self.start();
        indicator::add_cif7(&mut self.buffer, start, SlotSizing::FieldWidth)
    }

    pub fn remove_cif7(&mut self) -> Result<()> {
        let start = self.start();
        indicator::remove_cif7(&mut self.buffer, start, SlotSizing::FieldWidth)
    }

    pub fn set_cif7_attribute(&mut self, attribute: Attribute, enabled: bool) -> Result<()> {
        let start = self.start();
        indicator::set_attribute(&mut self.buffer, start, SlotSizing::FieldWidth, attribute, enabled)
    }
}

impl CifAccess for ContextPacket {
    fn field_bytes(&self, field: CifField) -> Option<&[u8]> {
        self.attribute_bytes(field, Attribute::CurrentValue)
    }

    fn set_field_bytes(&mut self, field: CifField, value: Option<&[u8]>) -> Result<()> {
        let start = self.start();
        indicator::set_field(&mut self.buffer, start, SlotSizing::FieldWidth, field, value)
    }
}

impl VrtPacket for ContextPacket {
    fn buffer(&self) -> &PacketBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut PacketBuffer {
        &mut self.buffer
    }

    fn supports_packet_type(&self, packet_type: PacketType) -> bool {
        packet_type.is_context()
    }

    fn validate_payload(&self, strict: bool) -> Result<()> {
        validate_block(&self.buffer, self.start(), strict, "context packet")
    }

    /// Restamps and clears the change indicator.
    fn reset_for_resend(&mut self, ts: &TimeStamp) -> Result<bool> {
        self.set_time_stamp(ts)?;
        self.set_change_indicator(false);
        Ok(true)
    }
}

/// Shared check for a CIF block that must run to the end of the packet.
pub(crate) fn validate_block(buffer: &PacketBuffer, start: usize, strict: bool, subject: &str) -> Result<()> {
    let layout = indicator::scan(buffer.as_bytes(), start, SlotSizing::FieldWidth)
        .map_err(|e| VrtError::validation(subject, e.to_string()))?;
    if layout.end != buffer.as_bytes().len() {
        return Err(VrtError::validation(
            subject,
            format!("fields end at byte {}, packet is {} bytes", layout.end, buffer.as_bytes().len()),
        ));
    }
    if strict {
        if let Some((word, bits)) = layout.reserved_bits() {
            return Err(VrtError::validation(subject, format!("reserved {word:?} bits {bits:#010x} set")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use crate::VrtVersion;
    use anyhow::Result;

    #[test]
    fn frequencies_use_a_20_bit_fraction() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::default());
        p.set_rf_reference_frequency(Some(2.4e9))?;
        p.set_bandwidth(Some(20.0e6 + 0.5))?;
        assert_eq!(p.field_u64(CifField::RfReferenceFrequency), Some(2_400_000_000u64 << 20));
        assert_eq!(p.rf_reference_frequency(), Some(2.4e9));
        assert_eq!(p.bandwidth(), Some(20.0e6 + 0.5));
        assert_eq!(p.fields(), vec![CifField::Bandwidth, CifField::RfReferenceFrequency]);
        assert!(p.is_packet_valid());
        Ok(())
    }

    #[test]
    fn absent_fields_read_as_none() {
        let p = ContextPacket::new(CodecConfig::default());
        assert_eq!(p.sample_rate(), None);
        assert_eq!(p.gain(), None);
        assert_eq!(p.formatted_gps(), None);
        assert_eq!(p.cif7_attributes(), None);
        assert_eq!(p.payload_length(), 4);
    }

    #[test]
    fn small_fixed_point_fields() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::default());
        p.set_reference_level(Some(-10.5))?;
        p.set_temperature(Some(25.25))?;
        p.set_gain(Some(Gain { stage1: 3.0, stage2: -0.5 }))?;
        assert_eq!(p.field_u32(CifField::ReferenceLevel), Some(0xFAC0));
        assert_eq!(p.reference_level(), Some(-10.5));
        assert_eq!(p.temperature(), Some(25.25));
        assert_eq!(p.gain(), Some(Gain { stage1: 3.0, stage2: -0.5 }));
        assert!(p.set_temperature(Some(-300.0)).is_err());
        Ok(())
    }

    #[test]
    fn payload_format_field() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::default());
        let format = PayloadFormat::from_data_type(DataType::Int16);
        p.set_data_payload_format(Some(format))?;
        assert_eq!(p.data_payload_format(), Some(format));
        let mut bad = format;
        bad.set_data_item_size(32).ok();
        assert!(p.set_data_payload_format(Some(bad)).is_err());
        p.set_data_payload_format(None)?;
        assert_eq!(p.payload_length(), 4);
        Ok(())
    }

    #[test]
    fn variable_length_fields_resize_in_place() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::default());
        p.set_context_association_lists(Some(&ContextAssociationLists {
            source: vec![7],
            ..Default::default()
        }))?;
        p.set_gps_ascii(Some(&GpsAscii { oui: 1, text: "abc".into() }))?;
        p.set_sample_rate(Some(1.0e6))?;
        let short = p.payload_length();
        p.set_gps_ascii(Some(&GpsAscii { oui: 1, text: "a much longer sentence".into() }))?;
        assert_eq!(p.payload_length(), short + 20);
        assert_eq!(p.sample_rate(), Some(1.0e6));
        assert_eq!(p.context_association_lists().map(|l| l.source), Some(vec![7]));
        assert!(p.is_packet_valid());
        Ok(())
    }

    #[test]
    fn uuid_fields_live_in_cif2() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::default());
        let id = Uuid::from_u128(0x0123_4567_89AB_CDEF_0123_4567_89AB_CDEF);
        p.set_field_uuid(CifField::ControllerUuid, Some(id))?;
        assert_eq!(p.field_uuid(CifField::ControllerUuid), Some(id));
        assert_eq!(p.payload_length(), 4 + 4 + 16);
        p.set_field_uuid(CifField::ControllerUuid, None)?;
        assert_eq!(p.payload_length(), 4);
        Ok(())
    }

    #[test]
    fn cif7_attributes_are_per_field() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::new(VrtVersion::V49b));
        p.set_bandwidth(Some(1.0e6))?;
        p.set_cif7_attribute(Attribute::Average, true)?;
        assert_eq!(p.cif7_attributes(), Some(vec![Attribute::CurrentValue, Attribute::Average]));
        assert_eq!(p.attribute_bytes(CifField::Bandwidth, Attribute::Average), Some(&[0u8; 8][..]));
        p.set_attribute_bytes(CifField::Bandwidth, Attribute::Average, &(5u64 << 20).to_be_bytes())?;
        assert_eq!(p.bandwidth(), Some(1.0e6));
        p.remove_cif7()?;
        assert_eq!(p.cif7_attributes(), None);
        assert_eq!(p.bandwidth(), Some(1.0e6));
        assert_eq!(p.payload_length(), 12);
        Ok(())
    }

    #[test]
    fn strict_validation_flags_reserved_cif_bits() -> Result<()> {
        let mut p = ContextPacket::new(CodecConfig::default());
        assert!(p.validate(true, None).is_ok());
        let start = p.buffer().payload_offset();
        p.buffer_mut().write_u32(start, 1 << 4);
        assert!(p.validate(false, None).is_ok());
        assert!(p.validate(true, None).is_err());
        Ok(())
    }
}
