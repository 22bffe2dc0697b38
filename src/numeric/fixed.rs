//! Fixed-point and VRT floating-point conversions.
//!
//! Context fields store engineering values as two's complement fixed point with
//! a per-field radix (Q44.20 for frequencies, Q9.7 for gain, ...). Conversions
//! round to nearest and saturate at the integer range.
//!
//! The VRT floating formats pack a mantissa in the upper bits of an item and an
//! unsigned exponent of 1 to 6 bits in the lower bits. The mantissa is a
//! fraction (`[-1, 1)` when signed, `[0, 1)` when unsigned) and the value is
//! `mantissa * 2^exponent`.

use super::{low_mask, sign_extend};

fn scale(radix: u32) -> f64 {
    2f64.powi(radix as i32)
}

pub fn to_fixed64(value: f64, radix: u32) -> i64 {
    (value * scale(radix)).round() as i64
}

pub fn from_fixed64(bits: i64, radix: u32) -> f64 {
    bits as f64 / scale(radix)
}

pub fn to_fixed32(value: f64, radix: u32) -> i32 {
    (value * scale(radix)).round() as i32
}

pub fn from_fixed32(bits: i32, radix: u32) -> f64 {
    f64::from(bits) / scale(radix)
}

pub fn to_fixed16(value: f64, radix: u32) -> i16 {
    (value * scale(radix)).round() as i16
}

pub fn from_fixed16(bits: i16, radix: u32) -> f64 {
    f64::from(bits) / scale(radix)
}

/// Decode a `size`-bit VRT float with `exp_bits` exponent bits.
pub fn from_vrt_float(bits: u64, signed: bool, exp_bits: u32, size: u32) -> f64 {
    let man_bits = size - exp_bits;
    let exponent = (bits & low_mask(exp_bits)) as i32;
    let raw = (bits >> exp_bits) & low_mask(man_bits);
    let (mantissa, frac_bits) = if signed {
        (sign_extend(raw, man_bits) as f64, man_bits - 1)
    } else {
        (raw as f64, man_bits)
    };
    mantissa * 2f64.powi(exponent - frac_bits as i32)
}

/// Encode `value` as a `size`-bit VRT float, choosing the smallest exponent
/// that keeps the mantissa below one. Out-of-range values saturate.
pub fn to_vrt_float(value: f64, signed: bool, exp_bits: u32, size: u32) -> u64 {
    let man_bits = size - exp_bits;
    let frac_bits = if signed { man_bits - 1 } else { man_bits };
    let max_exp = (1i32 << exp_bits) - 1;
    let value = if value.is_nan() || (!signed && value < 0.0) { 0.0 } else { value };

    let mut exponent = 0;
    while exponent < max_exp && value.abs() >= 2f64.powi(exponent) {
        exponent += 1;
    }

    let (min_m, max_m) = if signed {
        (-(1i64 << (man_bits - 1)), (1i64 << (man_bits - 1)) - 1)
    } else {
        (0, low_mask(man_bits).min(i64::MAX as u64) as i64)
    };
    let mantissa = (value * 2f64.powi(frac_bits as i32 - exponent)).round() as i64;
    let mantissa = mantissa.clamp(min_m, max_m) as u64 & low_mask(man_bits);
    (mantissa << exp_bits) | exponent as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn frequency_radix_is_exact_for_hertz() {
        let bits = to_fixed64(100.0e6, 20);
        assert_eq!(bits, 100_000_000i64 << 20);
        assert_eq!(from_fixed64(bits, 20), 100.0e6);
    }

    #[test]
    fn gain_quarter_steps() {
        assert_eq!(to_fixed16(-1.5, 7), -192);
        assert_eq!(from_fixed16(-192, 7), -1.5);
        assert_eq!(from_fixed32(to_fixed32(37.25, 22), 22), 37.25);
    }

    #[test]
    fn fixed_point_saturates() {
        assert_eq!(to_fixed16(1.0e6, 7), i16::MAX);
        assert_eq!(to_fixed16(-1.0e6, 7), i16::MIN);
    }

    #[test]
    fn vrt_float_known_values() {
        let encoded = to_vrt_float(0.5, true, 1, 16);
        assert_eq!(encoded & 1, 0);
        assert_eq!(from_vrt_float(encoded, true, 1, 16), 0.5);

        let encoded = to_vrt_float(1.5, true, 1, 16);
        assert_eq!(encoded & 1, 1);
        assert_eq!(from_vrt_float(encoded, true, 1, 16), 1.5);

        let encoded = to_vrt_float(-0.75, true, 3, 12);
        assert_eq!(from_vrt_float(encoded, true, 3, 12), -0.75);
    }

    #[test]
    fn unsigned_vrt_float_clamps_negative_input() {
        assert_eq!(from_vrt_float(to_vrt_float(-3.0, false, 2, 8), false, 2, 8), 0.0);
    }

    proptest! {
        #[test]
        fn vrt_float_round_trips_representable_values(
            exp_bits in 1u32..=6,
            size_extra in 2u32..=26,
            mantissa in -1000i64..1000,
            signed in any::<bool>(),
        ) {
            let size = exp_bits + size_extra;
            let man_bits = size - exp_bits;
            // a value on the coarsest grid the encoder may pick is always representable
            let max_exp = (1i32 << exp_bits) - 1;
            let frac_bits = if signed { man_bits - 1 } else { man_bits } as i32;
            let limit = if signed { 1i64 << (man_bits - 1) } else { 1i64 << man_bits };
            let m = if signed { mantissa % limit } else { mantissa.abs() % limit };
            let value = m as f64 * 2f64.powi(max_exp - frac_bits);
            let decoded = from_vrt_float(to_vrt_float(value, signed, exp_bits, size), signed, exp_bits, size);
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn fixed64_round_trips_on_grid(raw in -(1i64 << 50)..(1i64 << 50), radix in 0u32..=20) {
            prop_assert_eq!(to_fixed64(from_fixed64(raw, radix), radix), raw);
        }
    }
}
