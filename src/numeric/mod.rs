//! Scalar packing over byte buffers.
//!
//! Whole-byte scalars go through the [`Scalar`] trait; sub-byte items used by
//! payload packing go through [`pack_bits`] / [`unpack_bits`], which address the
//! buffer as an MSB-first bit stream. Big-endian is the wire order; little-endian
//! is available for byte-swapped sample access.
//!
//! [`pack`] and [`unpack`] index the buffer directly and panic when the caller
//! hands them an offset past the end. Parsers working on untrusted input use
//! [`try_unpack`], which reports a short buffer as [`VrtError::MalformedInput`].

pub mod fixed;

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};

/// Byte order used when packing multi-byte scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Fixed-width values that can be packed into a byte buffer.
pub trait Scalar: Copy + Sized {
    /// Encoded width in bytes.
    const SIZE: usize;

    fn write_to(self, buf: &mut [u8], order: ByteOrder);

    fn read_from(buf: &[u8], order: ByteOrder) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_to(self, buf: &mut [u8], order: ByteOrder) {
                    let bytes = match order {
                        ByteOrder::BigEndian => self.to_be_bytes(),
                        ByteOrder::LittleEndian => self.to_le_bytes(),
                    };
                    buf[..Self::SIZE].copy_from_slice(&bytes);
                }

                fn read_from(buf: &[u8], order: ByteOrder) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&buf[..Self::SIZE]);
                    match order {
                        ByteOrder::BigEndian => <$t>::from_be_bytes(raw),
                        ByteOrder::LittleEndian => <$t>::from_le_bytes(raw),
                    }
                }
            }
        )*
    };
}

impl_scalar!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Write `value` at `offset`.
///
/// # Panics
///
/// Panics if `offset + T::SIZE` exceeds the buffer length.
pub fn pack<T: Scalar>(buf: &mut [u8], offset: usize, value: T, order: ByteOrder) {
    value.write_to(&mut buf[offset..offset + T::SIZE], order);
}

/// Read a value from `offset`.
///
/// # Panics
///
/// Panics if `offset + T::SIZE` exceeds the buffer length.
pub fn unpack<T: Scalar>(buf: &[u8], offset: usize, order: ByteOrder) -> T {
    T::read_from(&buf[offset..offset + T::SIZE], order)
}

/// Bounds-checked [`unpack`].
pub fn try_unpack<T: Scalar>(buf: &[u8], offset: usize, order: ByteOrder) -> Result<T> {
    let bytes = offset
        .checked_add(T::SIZE)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| {
            VrtError::malformed(
                "scalar read",
                format!(
                    "need {} bytes at offset {}, buffer holds {}",
                    T::SIZE,
                    offset,
                    buf.len()
                ),
            )
        })?;
    Ok(T::read_from(bytes, order))
}

/// Big-endian [`pack`].
pub fn put_be<T: Scalar>(buf: &mut [u8], offset: usize, value: T) {
    pack(buf, offset, value, ByteOrder::BigEndian);
}

/// Big-endian [`unpack`].
pub fn get_be<T: Scalar>(buf: &[u8], offset: usize) -> T {
    unpack(buf, offset, ByteOrder::BigEndian)
}

/// Mask with the low `width` bits set.
pub const fn low_mask(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

/// Write the low `width` bits of `value` at `bit_offset`, most significant bit first.
///
/// # Panics
///
/// Panics if the bit range runs past the end of the buffer.
pub fn pack_bits(buf: &mut [u8], bit_offset: usize, width: u32, value: u64) {
    debug_assert!((1..=64).contains(&width));
    let width = width as usize;
    for i in 0..width {
        let bit = (value >> (width - 1 - i)) & 1;
        let pos = bit_offset + i;
        let mask = 0x80u8 >> (pos % 8);
        if bit == 1 {
            buf[pos / 8] |= mask;
        } else {
            buf[pos / 8] &= !mask;
        }
    }
}

/// Read `width` bits starting at `bit_offset`, most significant bit first.
///
/// # Panics
///
/// Panics if the bit range runs past the end of the buffer.
pub fn unpack_bits(buf: &[u8], bit_offset: usize, width: u32) -> u64 {
    debug_assert!((1..=64).contains(&width));
    let mut value = 0u64;
    for i in 0..width as usize {
        let pos = bit_offset + i;
        let bit = (buf[pos / 8] >> (7 - pos % 8)) & 1;
        value = (value << 1) | u64::from(bit);
    }
    value
}

/// Interpret the low `width` bits of `value` as two's complement.
pub const fn sign_extend(value: u64, width: u32) -> i64 {
    if width >= 64 {
        return value as i64;
    }
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip<T: Scalar + PartialEq + std::fmt::Debug>(value: T, offset: usize, order: ByteOrder) {
        let mut buf = vec![0u8; offset + T::SIZE + 3];
        pack(&mut buf, offset, value, order);
        assert_eq!(unpack::<T>(&buf, offset, order), value);
    }

    proptest! {
        #[test]
        fn integers_round_trip(a in any::<i8>(), b in any::<i16>(), c in any::<i32>(), d in any::<i64>(),
                               e in any::<u64>(), offset in 0usize..9) {
            for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
                round_trip(a, offset, order);
                round_trip(b, offset, order);
                round_trip(c, offset, order);
                round_trip(d, offset, order);
                round_trip(e, offset, order);
            }
        }

        #[test]
        fn floats_round_trip_bit_exact(f in any::<f32>(), d in any::<f64>(), offset in 0usize..9) {
            let mut buf = [0u8; 24];
            pack(&mut buf, offset, f, ByteOrder::BigEndian);
            prop_assert_eq!(unpack::<f32>(&buf, offset, ByteOrder::BigEndian).to_bits(), f.to_bits());
            pack(&mut buf, offset, d, ByteOrder::LittleEndian);
            prop_assert_eq!(unpack::<f64>(&buf, offset, ByteOrder::LittleEndian).to_bits(), d.to_bits());
        }

        #[test]
        fn bit_fields_round_trip(width in 1u32..=64, value in any::<u64>(), bit_offset in 0usize..40) {
            let mut buf = [0xA5u8; 16];
            let value = value & low_mask(width);
            pack_bits(&mut buf, bit_offset, width, value);
            prop_assert_eq!(unpack_bits(&buf, bit_offset, width), value);
        }

        #[test]
        fn neighbouring_bits_are_untouched(value in 0u64..16, slot in 0usize..8) {
            let mut buf = [0xFFu8; 4];
            pack_bits(&mut buf, slot * 4, 4, value);
            for other in (0..8).filter(|s| *s != slot) {
                prop_assert_eq!(unpack_bits(&buf, other * 4, 4), 0xF);
            }
        }
    }

    #[test]
    fn big_endian_is_the_wire_order() {
        let mut buf = [0u8; 4];
        put_be(&mut buf, 0, 0x1234_5678u32);
        assert_eq!(buf, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(get_be::<u16>(&buf, 2), 0x5678);
        assert_eq!(unpack::<u16>(&buf, 0, ByteOrder::LittleEndian), 0x3412);
    }

    #[test]
    fn single_bits_pack_msb_first() {
        let mut buf = [0u8; 1];
        pack_bits(&mut buf, 0, 1, 1);
        pack_bits(&mut buf, 7, 1, 1);
        assert_eq!(buf[0], 0x81);
        assert_eq!(unpack_bits(&buf, 1, 1), 0);
    }

    #[test]
    fn try_unpack_rejects_short_buffers() {
        let buf = [0u8; 6];
        assert!(try_unpack::<u32>(&buf, 2, ByteOrder::BigEndian).is_ok());
        assert!(matches!(
            try_unpack::<u32>(&buf, 3, ByteOrder::BigEndian),
            Err(VrtError::MalformedInput { .. })
        ));
        assert!(try_unpack::<u64>(&buf, usize::MAX, ByteOrder::BigEndian).is_err());
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0xF, 4), -1);
        assert_eq!(sign_extend(0x7, 4), 7);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }
}
