//! Sample packing for data packet payloads.
//!
//! Each scalar sits in the most significant bits of its item packing field.
//! Processing-efficient payloads never split a packing field across a word
//! boundary (fields wider than 32 bits get a 64-bit slot each); link-efficient
//! payloads pack fields back to back. Event and channel tag bits below the data
//! item are left untouched on write.

use crate::numeric::fixed::{from_vrt_float, to_vrt_float};
use crate::numeric::{low_mask, pack_bits, sign_extend, unpack_bits, ByteOrder};
use crate::types::{DataItemFormat, PayloadFormat};
use crate::{Result, VrtError};

/// Validated view of a [`PayloadFormat`] used to read and write scalars.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleCodec {
    format: PayloadFormat,
    item_format: DataItemFormat,
    item_size: u32,
    fraction_size: u32,
}

impl SampleCodec {
    pub(crate) fn new(format: PayloadFormat) -> Result<Self> {
        format.validate()?;
        let item_format = format.data_item_format()?;
        Ok(Self {
            format,
            item_format,
            item_size: format.data_item_size(),
            fraction_size: format.data_item_fraction_size(),
        })
    }

    pub(crate) fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Scalars held by `payload_len` bytes once `pad_bits` are discounted.
    pub(crate) fn scalar_count(&self, payload_len: usize, pad_bits: u8) -> usize {
        self.format.scalar_data_length_with_pad(payload_len, u32::from(pad_bits))
    }

    fn item_offset(&self, index: usize) -> usize {
        self.format.item_bit_offset(index)
    }

    fn check_order(&self, index: usize, order: ByteOrder) -> Result<()> {
        if order == ByteOrder::BigEndian {
            return Ok(());
        }
        let packing = self.format.item_packing_field_size();
        let aligned = matches!(self.item_size, 8 | 16 | 32 | 64)
            && self.item_size == packing
            && self.item_offset(index) % 8 == 0;
        if aligned {
            Ok(())
        } else {
            Err(VrtError::unsupported(
                "byte-swapped sample access",
                format!("{}-bit items in {packing}-bit fields are not byte aligned", self.item_size),
            ))
        }
    }

    fn swap(&self, raw: u64) -> u64 {
        raw.swap_bytes() >> (64 - self.item_size)
    }

    fn read_raw(&self, payload: &[u8], index: usize, order: ByteOrder) -> Result<u64> {
        self.check_order(index, order)?;
        let offset = self.item_offset(index);
        if offset + self.item_size as usize > payload.len() * 8 {
            return Err(VrtError::invalid_value(
                "sample index",
                format!("item {index} lies past the end of a {}-byte payload", payload.len()),
            ));
        }
        let raw = unpack_bits(payload, offset, self.item_size);
        Ok(if order == ByteOrder::LittleEndian { self.swap(raw) } else { raw })
    }

    fn write_raw(&self, payload: &mut [u8], index: usize, raw: u64, order: ByteOrder) -> Result<()> {
        self.check_order(index, order)?;
        let offset = self.item_offset(index);
        if offset + self.item_size as usize > payload.len() * 8 {
            return Err(VrtError::invalid_value(
                "sample index",
                format!("item {index} lies past the end of a {}-byte payload", payload.len()),
            ));
        }
        let raw = raw & low_mask(self.item_size);
        let raw = if order == ByteOrder::LittleEndian { self.swap(raw) } else { raw };
        pack_bits(payload, offset, self.item_size, raw);
        Ok(())
    }

    fn fraction_scale(&self) -> f64 {
        2f64.powi(self.fraction_size as i32)
    }

    fn decode_f64(&self, raw: u64) -> f64 {
        let size = self.item_size;
        match self.item_format {
            DataItemFormat::SignedInt => sign_extend(raw, size) as f64,
            DataItemFormat::UnsignedInt => raw as f64,
            DataItemFormat::SignedIntNN => sign_extend(raw, size) as f64 / self.fraction_scale(),
            DataItemFormat::UnsignedIntNN => raw as f64 / self.fraction_scale(),
            DataItemFormat::Float => f64::from(f32::from_bits(raw as u32)),
            DataItemFormat::Double => f64::from_bits(raw),
            format => {
                let exp = format.vrt_exponent_bits().unwrap_or(1);
                from_vrt_float(raw, format.is_signed(), exp, size)
            }
        }
    }

    fn encode_f64(&self, value: f64) -> u64 {
        let size = self.item_size;
        match self.item_format {
            DataItemFormat::SignedInt => clamp_signed(value.round(), size),
            DataItemFormat::UnsignedInt => clamp_unsigned(value.round(), size),
            DataItemFormat::SignedIntNN => clamp_signed((value * self.fraction_scale()).round(), size),
            DataItemFormat::UnsignedIntNN => clamp_unsigned((value * self.fraction_scale()).round(), size),
            DataItemFormat::Float => u64::from((value as f32).to_bits()),
            DataItemFormat::Double => value.to_bits(),
            format => {
                let exp = format.vrt_exponent_bits().unwrap_or(1);
                to_vrt_float(value, format.is_signed(), exp, size)
            }
        }
    }

    fn is_integer(&self) -> bool {
        matches!(self.item_format, DataItemFormat::SignedInt | DataItemFormat::UnsignedInt)
    }

    pub(crate) fn read_f64(&self, payload: &[u8], index: usize, order: ByteOrder) -> Result<f64> {
        Ok(self.decode_f64(self.read_raw(payload, index, order)?))
    }

    pub(crate) fn write_f64(&self, payload: &mut [u8], index: usize, value: f64, order: ByteOrder) -> Result<()> {
        self.write_raw(payload, index, self.encode_f64(value), order)
    }

    /// Integer items are read exactly; other formats go through `f64` and truncate.
    pub(crate) fn read_i64(&self, payload: &[u8], index: usize, order: ByteOrder) -> Result<i64> {
        let raw = self.read_raw(payload, index, order)?;
        Ok(match self.item_format {
            DataItemFormat::SignedInt => sign_extend(raw, self.item_size),
            DataItemFormat::UnsignedInt => i64::try_from(raw).unwrap_or(i64::MAX),
            _ => self.decode_f64(raw) as i64,
        })
    }

    pub(crate) fn write_i64(&self, payload: &mut [u8], index: usize, value: i64, order: ByteOrder) -> Result<()> {
        let raw = if self.is_integer() {
            let size = self.item_size;
            if self.item_format.is_signed() {
                let (min, max) = signed_range(size);
                value.clamp(min, max) as u64
            } else {
                (value.max(0) as u64).min(low_mask(size))
            }
        } else {
            self.encode_f64(value as f64)
        };
        self.write_raw(payload, index, raw, order)
    }
}

fn signed_range(width: u32) -> (i64, i64) {
    if width >= 64 {
        (i64::MIN, i64::MAX)
    } else {
        (-(1i64 << (width - 1)), (1i64 << (width - 1)) - 1)
    }
}

fn clamp_signed(value: f64, width: u32) -> u64 {
    let (min, max) = signed_range(width);
    let clamped = (value as i128).clamp(i128::from(min), i128::from(max));
    (clamped as i64 as u64) & low_mask(width)
}

fn clamp_unsigned(value: f64, width: u32) -> u64 {
    let clamped = (value as i128).clamp(0, i128::from(low_mask(width)));
    clamped as u64
}
