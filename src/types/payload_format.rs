//! Data packet payload format descriptor.
//!
//! The descriptor is a single 64-bit word, identical to the "data packet payload
//! format" context field:
//!
//! | bits   | field                                   |
//! |--------|-----------------------------------------|
//! | 63     | packing method (1 = link efficient)     |
//! | 62..61 | real / complex type                     |
//! | 60..56 | data item format                        |
//! | 55     | sample-component repeat indicator       |
//! | 54..52 | event-tag size                          |
//! | 51..48 | channel-tag size                        |
//! | 47..44 | data item fraction size                 |
//! | 43..38 | item packing field size - 1             |
//! | 37..32 | data item size - 1                      |
//! | 31..16 | repeat count - 1                        |
//! | 15..0  | vector size - 1                         |
//!
//! Every accessor masks the word on each call; nothing is cached.

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};
use std::fmt;

const LINK_EFFICIENT_BIT: u64 = 1 << 63;
const REAL_COMPLEX_SHIFT: u32 = 61;
const ITEM_FORMAT_SHIFT: u32 = 56;
const REPEATING_BIT: u64 = 1 << 55;
const EVENT_TAG_SHIFT: u32 = 52;
const CHANNEL_TAG_SHIFT: u32 = 48;
const FRACTION_SHIFT: u32 = 44;
const PACKING_SHIFT: u32 = 38;
const ITEM_SIZE_SHIFT: u32 = 32;
const REPEAT_COUNT_SHIFT: u32 = 16;

/// Real or complex sample layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealComplexType {
    Real = 0,
    ComplexCartesian = 1,
    ComplexPolar = 2,
}

impl RealComplexType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(RealComplexType::Real),
            1 => Ok(RealComplexType::ComplexCartesian),
            2 => Ok(RealComplexType::ComplexPolar),
            _ => Err(VrtError::invalid_value("real/complex type", format!("reserved code {code}"))),
        }
    }

    pub const fn is_complex(self) -> bool {
        !matches!(self, RealComplexType::Real)
    }
}

/// Encoding of each data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataItemFormat {
    SignedInt = 0x00,
    SignedVrt1 = 0x01,
    SignedVrt2 = 0x02,
    SignedVrt3 = 0x03,
    SignedVrt4 = 0x04,
    SignedVrt5 = 0x05,
    SignedVrt6 = 0x06,
    /// Signed fixed point with an explicit fraction size
    SignedIntNN = 0x07,
    Float = 0x0E,
    Double = 0x0F,
    UnsignedInt = 0x10,
    UnsignedVrt1 = 0x11,
    UnsignedVrt2 = 0x12,
    UnsignedVrt3 = 0x13,
    UnsignedVrt4 = 0x14,
    UnsignedVrt5 = 0x15,
    UnsignedVrt6 = 0x16,
    /// Unsigned fixed point with an explicit fraction size
    UnsignedIntNN = 0x17,
}

impl DataItemFormat {
    /// Decode a 5-bit format code. Reserved codes are rejected.
    pub fn from_code(code: u8) -> Result<Self> {
        use DataItemFormat::*;
        Ok(match code {
            0x00 => SignedInt,
            0x01 => SignedVrt1,
            0x02 => SignedVrt2,
            0x03 => SignedVrt3,
            0x04 => SignedVrt4,
            0x05 => SignedVrt5,
            0x06 => SignedVrt6,
            0x07 => SignedIntNN,
            0x0E => Float,
            0x0F => Double,
            0x10 => UnsignedInt,
            0x11 => UnsignedVrt1,
            0x12 => UnsignedVrt2,
            0x13 => UnsignedVrt3,
            0x14 => UnsignedVrt4,
            0x15 => UnsignedVrt5,
            0x16 => UnsignedVrt6,
            0x17 => UnsignedIntNN,
            _ => {
                return Err(VrtError::invalid_value(
                    "data item format",
                    format!("reserved format code {code:#04x}"),
                ));
            }
        })
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn is_signed(self) -> bool {
        (self as u8) < 0x10
    }

    /// Exponent width of a VRT floating format.
    pub const fn vrt_exponent_bits(self) -> Option<u32> {
        let code = self as u8 & 0x0F;
        if code >= 1 && code <= 6 { Some(code as u32) } else { None }
    }

    pub const fn is_fixed_point_nn(self) -> bool {
        matches!(self, DataItemFormat::SignedIntNN | DataItemFormat::UnsignedIntNN)
    }

    pub const fn is_ieee(self) -> bool {
        matches!(self, DataItemFormat::Float | DataItemFormat::Double)
    }
}

/// Named sample types with a canonical payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int4,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    UInt1,
    UInt4,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
}

impl DataType {
    pub const ALL: [DataType; 13] = [
        DataType::Int4,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::Float,
        DataType::Double,
        DataType::UInt1,
        DataType::UInt4,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
    ];

    /// Item width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            DataType::UInt1 => 1,
            DataType::Int4 | DataType::UInt4 => 4,
            DataType::Int8 | DataType::UInt8 => 8,
            DataType::Int16 | DataType::UInt16 => 16,
            DataType::Int32 | DataType::UInt32 | DataType::Float => 32,
            DataType::Int64 | DataType::UInt64 | DataType::Double => 64,
        }
    }

    pub const fn item_format(self) -> DataItemFormat {
        match self {
            DataType::Float => DataItemFormat::Float,
            DataType::Double => DataItemFormat::Double,
            DataType::Int4 | DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                DataItemFormat::SignedInt
            }
            _ => DataItemFormat::UnsignedInt,
        }
    }
}

/// Packed payload format descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadFormat(u64);

impl PayloadFormat {
    /// Canonical processing-efficient, real, scalar format for `data_type`.
    pub const fn from_data_type(data_type: DataType) -> Self {
        let size = data_type.bits() as u64 - 1;
        Self(
            ((data_type.item_format() as u64) << ITEM_FORMAT_SHIFT)
                | (size << PACKING_SHIFT)
                | (size << ITEM_SIZE_SHIFT),
        )
    }

    /// Build a descriptor from its fields, rejecting inconsistent combinations.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        processing_efficient: bool,
        real_complex: RealComplexType,
        item_format: DataItemFormat,
        repeating: bool,
        event_tag_size: u32,
        channel_tag_size: u32,
        data_item_size: u32,
        item_packing_field_size: u32,
        repeat_count: u32,
        vector_size: u32,
    ) -> Result<Self> {
        let mut format = Self(0);
        format.set_processing_efficient(processing_efficient);
        format.set_real_complex_type(real_complex);
        format.set_data_item_format(item_format);
        format.set_repeating(repeating);
        format.set_event_tag_size(event_tag_size)?;
        format.set_channel_tag_size(channel_tag_size)?;
        format.set_item_packing_field_size(item_packing_field_size)?;
        format.set_data_item_size(data_item_size)?;
        format.set_repeat_count(repeat_count)?;
        format.set_vector_size(vector_size)?;
        format.validate()?;
        Ok(format)
    }

    /// Wrap raw bits without checking them.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub fn set_bits(&mut self, bits: u64) {
        self.0 = bits;
    }

    fn field(&self, shift: u32, width: u32) -> u32 {
        ((self.0 >> shift) & ((1u64 << width) - 1)) as u32
    }

    fn set_field(&mut self, shift: u32, width: u32, value: u32) {
        let mask = ((1u64 << width) - 1) << shift;
        self.0 = (self.0 & !mask) | ((u64::from(value) << shift) & mask);
    }

    fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
        if value < min || value > max {
            return Err(VrtError::invalid_format(format!("{name} {value} outside {min}..={max}")));
        }
        Ok(())
    }

    pub fn is_processing_efficient(&self) -> bool {
        self.0 & LINK_EFFICIENT_BIT == 0
    }

    pub fn set_processing_efficient(&mut self, processing_efficient: bool) {
        if processing_efficient {
            self.0 &= !LINK_EFFICIENT_BIT;
        } else {
            self.0 |= LINK_EFFICIENT_BIT;
        }
    }

    pub fn real_complex_type(&self) -> Result<RealComplexType> {
        RealComplexType::from_code(self.field(REAL_COMPLEX_SHIFT, 2) as u8)
    }

    pub fn set_real_complex_type(&mut self, value: RealComplexType) {
        self.set_field(REAL_COMPLEX_SHIFT, 2, value as u32);
    }

    pub fn is_complex(&self) -> bool {
        self.field(REAL_COMPLEX_SHIFT, 2) != 0
    }

    pub fn data_item_format(&self) -> Result<DataItemFormat> {
        DataItemFormat::from_code(self.field(ITEM_FORMAT_SHIFT, 5) as u8)
    }

    pub fn set_data_item_format(&mut self, value: DataItemFormat) {
        self.set_field(ITEM_FORMAT_SHIFT, 5, u32::from(value.code()));
    }

    /// Set the item format from a raw 5-bit code.
    pub fn set_data_item_format_code(&mut self, code: u8) -> Result<()> {
        let format = DataItemFormat::from_code(code).map_err(|e| VrtError::invalid_format(e.to_string()))?;
        self.set_data_item_format(format);
        Ok(())
    }

    pub fn is_repeating(&self) -> bool {
        self.0 & REPEATING_BIT != 0
    }

    pub fn set_repeating(&mut self, repeating: bool) {
        if repeating {
            self.0 |= REPEATING_BIT;
        } else {
            self.0 &= !REPEATING_BIT;
        }
    }

    pub fn event_tag_size(&self) -> u32 {
        self.field(EVENT_TAG_SHIFT, 3)
    }

    pub fn set_event_tag_size(&mut self, size: u32) -> Result<()> {
        Self::check_range("event tag size", size, 0, 7)?;
        self.set_field(EVENT_TAG_SHIFT, 3, size);
        Ok(())
    }

    pub fn channel_tag_size(&self) -> u32 {
        self.field(CHANNEL_TAG_SHIFT, 4)
    }

    pub fn set_channel_tag_size(&mut self, size: u32) -> Result<()> {
        Self::check_range("channel tag size", size, 0, 15)?;
        self.set_field(CHANNEL_TAG_SHIFT, 4, size);
        Ok(())
    }

    /// Fraction bits of the NN fixed-point formats.
    pub fn data_item_fraction_size(&self) -> u32 {
        self.field(FRACTION_SHIFT, 4)
    }

    pub fn set_data_item_fraction_size(&mut self, size: u32) -> Result<()> {
        Self::check_range("data item fraction size", size, 0, 15)?;
        self.set_field(FRACTION_SHIFT, 4, size);
        Ok(())
    }

    pub fn item_packing_field_size(&self) -> u32 {
        self.field(PACKING_SHIFT, 6) + 1
    }

    pub fn set_item_packing_field_size(&mut self, size: u32) -> Result<()> {
        Self::check_range("item packing field size", size, 1, 64)?;
        self.set_field(PACKING_SHIFT, 6, size - 1);
        Ok(())
    }

    pub fn data_item_size(&self) -> u32 {
        self.field(ITEM_SIZE_SHIFT, 6) + 1
    }

    pub fn set_data_item_size(&mut self, size: u32) -> Result<()> {
        Self::check_range("data item size", size, 1, 64)?;
        self.set_field(ITEM_SIZE_SHIFT, 6, size - 1);
        Ok(())
    }

    pub fn repeat_count(&self) -> u32 {
        self.field(REPEAT_COUNT_SHIFT, 16) + 1
    }

    pub fn set_repeat_count(&mut self, count: u32) -> Result<()> {
        Self::check_range("repeat count", count, 1, 65536)?;
        self.set_field(REPEAT_COUNT_SHIFT, 16, count - 1);
        Ok(())
    }

    pub fn vector_size(&self) -> u32 {
        self.field(0, 16) + 1
    }

    pub fn set_vector_size(&mut self, size: u32) -> Result<()> {
        Self::check_range("vector size", size, 1, 65536)?;
        self.set_field(0, 16, size - 1);
        Ok(())
    }

    /// Check the field combination. Returns `InvalidFormat` naming the first
    /// violated rule.
    pub fn validate(&self) -> Result<()> {
        let item = self.data_item_size();
        let packing = self.item_packing_field_size();
        let format = self.data_item_format().map_err(|e| VrtError::invalid_format(e.to_string()))?;
        self.real_complex_type().map_err(|e| VrtError::invalid_format(e.to_string()))?;

        if item > packing {
            return Err(VrtError::invalid_format(format!(
                "data item size {item} exceeds item packing field size {packing}"
            )));
        }
        let tags = self.event_tag_size() + self.channel_tag_size();
        if item + tags > packing {
            return Err(VrtError::invalid_format(format!(
                "data item size {item} plus {tags} tag bits exceeds item packing field size {packing}"
            )));
        }
        match format {
            DataItemFormat::Float if item != 32 => {
                return Err(VrtError::invalid_format(format!("float items must be 32 bits, found {item}")));
            }
            DataItemFormat::Double if item != 64 => {
                return Err(VrtError::invalid_format(format!("double items must be 64 bits, found {item}")));
            }
            _ => {}
        }
        if let Some(exp) = format.vrt_exponent_bits() {
            if item < exp + 2 {
                return Err(VrtError::invalid_format(format!(
                    "{format:?} needs at least {} bits per item, found {item}",
                    exp + 2
                )));
            }
        }
        if format.is_fixed_point_nn() && self.data_item_fraction_size() > item {
            return Err(VrtError::invalid_format(format!(
                "fraction size {} exceeds data item size {item}",
                self.data_item_fraction_size()
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// `DataType` whose canonical format equals this one, if any.
    pub fn data_type(&self) -> Option<DataType> {
        DataType::ALL.into_iter().find(|dt| Self::from_data_type(*dt) == *self)
    }

    /// Number of scalars a payload of `payload_len` bytes holds.
    pub fn scalar_data_length(&self, payload_len: usize) -> usize {
        self.scalar_data_length_with_pad(payload_len, 0)
    }

    /// Number of scalars held once `pad_bits` trailing bits are discounted.
    pub fn scalar_data_length_with_pad(&self, payload_len: usize, pad_bits: u32) -> usize {
        let packing = self.item_packing_field_size() as usize;
        let pad = pad_bits as usize;
        if self.is_processing_efficient() {
            if packing <= 32 {
                let words = payload_len / 4;
                (words * (32 / packing)).saturating_sub(pad / packing)
            } else {
                payload_len / 8
            }
        } else {
            (payload_len * 8).saturating_sub(pad) / packing
        }
    }

    /// Number of samples, counting a complex pair as one sample.
    pub fn data_length(&self, payload_len: usize) -> usize {
        let scalars = self.scalar_data_length(payload_len);
        if self.is_complex() { scalars / 2 } else { scalars }
    }

    /// Offset in bits of the packing field holding scalar `index`.
    pub fn item_bit_offset(&self, index: usize) -> usize {
        let packing = self.item_packing_field_size() as usize;
        if !self.is_processing_efficient() {
            index * packing
        } else if packing <= 32 {
            let per_word = 32 / packing;
            (index / per_word) * 32 + (index % per_word) * packing
        } else {
            index * 64
        }
    }

    /// Payload bytes needed for `scalars` items and the trailing pad bits that
    /// leaves in the last word.
    pub fn encoded_length(&self, scalars: usize) -> (usize, u32) {
        let packing = self.item_packing_field_size() as usize;
        if self.is_processing_efficient() {
            if packing <= 32 {
                let per_word = 32 / packing;
                let words = scalars.div_ceil(per_word);
                (words * 4, ((words * per_word - scalars) * packing) as u32)
            } else {
                (scalars * 8, 0)
            }
        } else {
            let bits = scalars * packing;
            let bytes = bits.div_ceil(32) * 4;
            (bytes, (bytes * 8 - bits) as u32)
        }
    }
}

impl From<DataType> for PayloadFormat {
    fn from(data_type: DataType) -> Self {
        Self::from_data_type(data_type)
    }
}

impl fmt::Debug for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadFormat")
            .field("bits", &format_args!("{:#018x}", self.0))
            .field("processing_efficient", &self.is_processing_efficient())
            .field("real_complex", &self.real_complex_type().ok())
            .field("item_format", &self.data_item_format().ok())
            .field("data_item_size", &self.data_item_size())
            .field("item_packing_field_size", &self.item_packing_field_size())
            .field("repeat_count", &self.repeat_count())
            .field("vector_size", &self.vector_size())
            .finish()
    }
}
