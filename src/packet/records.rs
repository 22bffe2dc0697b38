//! Multi-word context field records.
//!
//! Each record converts to and from the exact bytes of its field. Angles and
//! positions use the fixed-point radices of the field definitions; the value
//! `0x7FFFFFFF` marks a component as unspecified and maps to `None`.

use crate::numeric::fixed::{from_fixed16, from_fixed32, to_fixed16, to_fixed32};
use crate::numeric::{get_be, put_be, try_unpack, ByteOrder};
use crate::types::{FractionalMode, IntegerMode, TimeStamp, MAX_OUI};
use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};

const UNSPECIFIED: i32 = 0x7FFF_FFFF;
const UNSPECIFIED_SECONDS: u32 = 0xFFFF_FFFF;
const UNSPECIFIED_FRACTION: u64 = 0xFFFF_FFFF_FFFF_FFFF;

const ANGLE_RADIX: u32 = 22;
const ALTITUDE_RADIX: u32 = 5;
const SPEED_RADIX: u32 = 16;
const GAIN_RADIX: u32 = 7;

fn optional_fixed(bits: i32, radix: u32) -> Option<f64> {
    (bits != UNSPECIFIED).then(|| from_fixed32(bits, radix))
}

fn fixed_or_unspecified(value: Option<f64>, radix: u32) -> i32 {
    value.map_or(UNSPECIFIED, |v| to_fixed32(v, radix))
}

fn check_oui(oui: u32) -> Result<()> {
    if oui > MAX_OUI {
        return Err(VrtError::invalid_value("OUI", format!("{oui:#x} exceeds 24 bits")));
    }
    Ok(())
}

fn check_len(record: &str, bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(VrtError::malformed(record, format!("expected {expected} bytes, found {}", bytes.len())));
    }
    Ok(())
}

/// Two-stage gain in dB.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gain {
    pub stage1: f64,
    pub stage2: f64,
}

impl Gain {
    pub fn from_word(word: u32) -> Self {
        Self {
            stage1: from_fixed16(word as u16 as i16, GAIN_RADIX),
            stage2: from_fixed16((word >> 16) as u16 as i16, GAIN_RADIX),
        }
    }

    pub fn to_word(&self) -> u32 {
        let stage1 = to_fixed16(self.stage1, GAIN_RADIX) as u16;
        let stage2 = to_fixed16(self.stage2, GAIN_RADIX) as u16;
        (u32::from(stage2) << 16) | u32::from(stage1)
    }

    /// Sum of both stages.
    pub fn total(&self) -> f64 {
        self.stage1 + self.stage2
    }
}

/// Manufacturer OUI plus device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceId {
    pub oui: u32,
    pub device_code: u16,
}

impl DeviceId {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len("device identifier", bytes, 8)?;
        Ok(Self { oui: get_be::<u32>(bytes, 0) & MAX_OUI, device_code: get_be::<u32>(bytes, 4) as u16 })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        check_oui(self.oui)?;
        let mut bytes = vec![0u8; 8];
        put_be(&mut bytes, 0, self.oui);
        put_be(&mut bytes, 4, u32::from(self.device_code));
        Ok(bytes)
    }
}

fn read_record_time(bytes: &[u8]) -> (u32, TimeStamp) {
    let word0: u32 = get_be(bytes, 0);
    let tsi = IntegerMode::from_bits(word0 >> 26);
    let tsf = FractionalMode::from_bits(word0 >> 24);
    let seconds: u32 = if tsi == IntegerMode::None { 0 } else { get_be(bytes, 4) };
    let fractional: u64 = if tsf == FractionalMode::None { 0 } else { get_be(bytes, 8) };
    (word0 & MAX_OUI, TimeStamp::from_raw(tsi, tsf, seconds, fractional))
}

fn write_record_time(bytes: &mut [u8], oui: u32, ts: &TimeStamp) -> Result<()> {
    check_oui(oui)?;
    let word0 = (ts.integer_mode().bits() << 26) | (ts.fractional_mode().bits() << 24) | oui;
    put_be(bytes, 0, word0);
    put_be(bytes, 4, ts.seconds().unwrap_or(UNSPECIFIED_SECONDS));
    put_be(bytes, 8, ts.fractional().unwrap_or(UNSPECIFIED_FRACTION));
    Ok(())
}

/// Formatted GPS or INS geolocation (11 words).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geolocation {
    pub manufacturer_oui: u32,
    pub time_stamp: TimeStamp,
    /// Degrees
    pub latitude: Option<f64>,
    /// Degrees
    pub longitude: Option<f64>,
    /// Meters
    pub altitude: Option<f64>,
    /// Meters per second
    pub speed_over_ground: Option<f64>,
    /// Degrees
    pub heading_angle: Option<f64>,
    /// Degrees
    pub track_angle: Option<f64>,
    /// Degrees
    pub magnetic_variation: Option<f64>,
}

impl Geolocation {
    pub const LENGTH: usize = 44;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len("geolocation", bytes, Self::LENGTH)?;
        let (manufacturer_oui, time_stamp) = read_record_time(bytes);
        let word = |i: usize| get_be::<i32>(bytes, 16 + 4 * i);
        Ok(Self {
            manufacturer_oui,
            time_stamp,
            latitude: optional_fixed(word(0), ANGLE_RADIX),
            longitude: optional_fixed(word(1), ANGLE_RADIX),
            altitude: optional_fixed(word(2), ALTITUDE_RADIX),
            speed_over_ground: optional_fixed(word(3), SPEED_RADIX),
            heading_angle: optional_fixed(word(4), ANGLE_RADIX),
            track_angle: optional_fixed(word(5), ANGLE_RADIX),
            magnetic_variation: optional_fixed(word(6), ANGLE_RADIX),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; Self::LENGTH];
        write_record_time(&mut bytes, self.manufacturer_oui, &self.time_stamp)?;
        let values = [
            fixed_or_unspecified(self.latitude, ANGLE_RADIX),
            fixed_or_unspecified(self.longitude, ANGLE_RADIX),
            fixed_or_unspecified(self.altitude, ALTITUDE_RADIX),
            fixed_or_unspecified(self.speed_over_ground, SPEED_RADIX),
            fixed_or_unspecified(self.heading_angle, ANGLE_RADIX),
            fixed_or_unspecified(self.track_angle, ANGLE_RADIX),
            fixed_or_unspecified(self.magnetic_variation, ANGLE_RADIX),
        ];
        for (i, v) in values.into_iter().enumerate() {
            put_be(&mut bytes, 16 + 4 * i, v);
        }
        Ok(bytes)
    }
}

/// ECEF or relative ephemeris (13 words).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ephemeris {
    pub manufacturer_oui: u32,
    pub time_stamp: TimeStamp,
    /// Meters
    pub position: [Option<f64>; 3],
    /// Attitude angles alpha, beta, phi in degrees
    pub attitude: [Option<f64>; 3],
    /// Meters per second
    pub velocity: [Option<f64>; 3],
}

impl Ephemeris {
    pub const LENGTH: usize = 52;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len("ephemeris", bytes, Self::LENGTH)?;
        let (manufacturer_oui, time_stamp) = read_record_time(bytes);
        let read = |first: usize, radix: u32| -> [Option<f64>; 3] {
            [0, 1, 2].map(|i| optional_fixed(get_be::<i32>(bytes, 16 + 4 * (first + i)), radix))
        };
        Ok(Self {
            manufacturer_oui,
            time_stamp,
            position: read(0, ALTITUDE_RADIX),
            attitude: read(3, ANGLE_RADIX),
            velocity: read(6, SPEED_RADIX),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; Self::LENGTH];
        write_record_time(&mut bytes, self.manufacturer_oui, &self.time_stamp)?;
        let groups = [(self.position, ALTITUDE_RADIX), (self.attitude, ANGLE_RADIX), (self.velocity, SPEED_RADIX)];
        for (g, (values, radix)) in groups.into_iter().enumerate() {
            for (i, v) in values.into_iter().enumerate() {
                put_be(&mut bytes, 16 + 4 * (3 * g + i), fixed_or_unspecified(v, radix));
            }
        }
        Ok(bytes)
    }
}

/// Free-form GPS receiver sentence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GpsAscii {
    pub oui: u32,
    pub text: String,
}

impl GpsAscii {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let words: u32 = try_unpack(bytes, 4, ByteOrder::BigEndian)?;
        check_len("GPS ASCII", bytes, 8 + words as usize * 4)?;
        let text = &bytes[8..];
        let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
        Ok(Self {
            oui: get_be::<u32>(bytes, 0) & MAX_OUI,
            text: String::from_utf8_lossy(&text[..end]).into_owned(),
        })
    }

    /// Text is NUL-padded to a whole word.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        check_oui(self.oui)?;
        let words = self.text.len().div_ceil(4);
        let mut bytes = vec![0u8; 8 + words * 4];
        put_be(&mut bytes, 0, self.oui);
        put_be(&mut bytes, 4, words as u32);
        bytes[8..8 + self.text.len()].copy_from_slice(self.text.as_bytes());
        Ok(bytes)
    }
}

/// Stream identifiers associated with this context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextAssociationLists {
    pub source: Vec<u32>,
    pub system: Vec<u32>,
    pub vector_component: Vec<u32>,
    pub async_channel: Vec<u32>,
    /// One tag per asynchronous channel entry when present
    pub async_channel_tags: Option<Vec<u32>>,
}

impl ContextAssociationLists {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let first: u32 = try_unpack(bytes, 0, ByteOrder::BigEndian)?;
        let second: u32 = try_unpack(bytes, 4, ByteOrder::BigEndian)?;
        let counts = [
            ((first >> 16) & 0x1FF) as usize,
            (first & 0x1FF) as usize,
            (second >> 16) as usize,
            (second & 0x7FFF) as usize,
        ];
        let tagged = second & 0x8000 != 0;
        let total: usize = counts.iter().sum::<usize>() + if tagged { counts[3] } else { 0 };
        check_len("context association lists", bytes, 8 + 4 * total)?;

        let mut offset = 8;
        let mut take = |n: usize| -> Vec<u32> {
            let list = (0..n).map(|i| get_be::<u32>(bytes, offset + 4 * i)).collect();
            offset += 4 * n;
            list
        };
        let source = take(counts[0]);
        let system = take(counts[1]);
        let vector_component = take(counts[2]);
        let async_channel = take(counts[3]);
        let async_channel_tags = tagged.then(|| take(counts[3]));
        Ok(Self { source, system, vector_component, async_channel, async_channel_tags })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let limits = [
            ("source list", self.source.len(), 0x1FF),
            ("system list", self.system.len(), 0x1FF),
            ("vector-component list", self.vector_component.len(), 0xFFFF),
            ("asynchronous-channel list", self.async_channel.len(), 0x7FFF),
        ];
        for (name, len, max) in limits {
            if len > max {
                return Err(VrtError::invalid_value(name, format!("{len} entries exceeds {max}")));
            }
        }
        if let Some(tags) = &self.async_channel_tags {
            if tags.len() != self.async_channel.len() {
                return Err(VrtError::invalid_value(
                    "asynchronous-channel tags",
                    format!("{} tags for {} channels", tags.len(), self.async_channel.len()),
                ));
            }
        }

        let first = ((self.source.len() as u32) << 16) | self.system.len() as u32;
        let tag_bit = if self.async_channel_tags.is_some() { 0x8000 } else { 0 };
        let second = ((self.vector_component.len() as u32) << 16) | tag_bit | self.async_channel.len() as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&first.to_be_bytes());
        bytes.extend_from_slice(&second.to_be_bytes());
        let lists = [&self.source, &self.system, &self.vector_component, &self.async_channel];
        for id in lists.into_iter().flatten().chain(self.async_channel_tags.iter().flatten()) {
            bytes.extend_from_slice(&id.to_be_bytes());
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::cif::FieldSize;
    use anyhow::Result;

    #[test]
    fn gain_stages_are_q9_7() {
        let gain = Gain { stage1: -1.5, stage2: 10.25 };
        let word = gain.to_word();
        assert_eq!(word & 0xFFFF, 0xFF40);
        assert_eq!(word >> 16, 0x0520);
        assert_eq!(Gain::from_word(word), gain);
        assert_eq!(gain.total(), 8.75);
    }

    #[test]
    fn geolocation_unspecified_components() -> Result<()> {
        let geo = Geolocation {
            manufacturer_oui: 0x12_34_56,
            time_stamp: TimeStamp::gps(1000, 0)?,
            latitude: Some(45.5),
            longitude: Some(-120.25),
            altitude: Some(1500.0),
            ..Default::default()
        };
        let bytes = geo.to_bytes()?;
        assert_eq!(bytes.len(), Geolocation::LENGTH);
        assert_eq!(&bytes[32..36], [0x7F, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Geolocation::from_bytes(&bytes)?, geo);
        Ok(())
    }

    #[test]
    fn ephemeris_layout() -> Result<()> {
        let eph = Ephemeris {
            manufacturer_oui: 1,
            time_stamp: TimeStamp::NONE,
            position: [Some(1.0), Some(-2.0), None],
            attitude: [None, Some(90.0), None],
            velocity: [Some(0.5), None, None],
        };
        let bytes = eph.to_bytes()?;
        assert_eq!(&bytes[4..8], [0xFF; 4]);
        assert_eq!(get_be::<i32>(&bytes, 16), 32);
        assert_eq!(Ephemeris::from_bytes(&bytes)?, eph);
        Ok(())
    }

    #[test]
    fn gps_ascii_pads_to_words() -> Result<()> {
        let gps = GpsAscii { oui: 0xABCDEF, text: "$GPGGA".to_string() };
        let bytes = gps.to_bytes()?;
        assert_eq!(bytes.len(), 16);
        assert_eq!(FieldSize::GpsAscii.measure(&bytes, 0)?, 16);
        assert_eq!(GpsAscii::from_bytes(&bytes)?, gps);
        Ok(())
    }

    #[test]
    fn association_lists_with_tags() -> Result<()> {
        let lists = ContextAssociationLists {
            source: vec![1],
            system: vec![2, 3],
            vector_component: vec![],
            async_channel: vec![4],
            async_channel_tags: Some(vec![5]),
        };
        let bytes = lists.to_bytes()?;
        assert_eq!(FieldSize::ContextAssociationLists.measure(&bytes, 0)?, bytes.len());
        assert_eq!(bytes.len(), 8 + 4 * 5);
        assert_eq!(ContextAssociationLists::from_bytes(&bytes)?, lists);

        let bad = ContextAssociationLists { async_channel_tags: Some(vec![]), ..lists };
        assert!(bad.to_bytes().is_err());
        Ok(())
    }

    #[test]
    fn device_id_rejects_wide_oui() {
        assert!(DeviceId { oui: 0x0100_0000, device_code: 1 }.to_bytes().is_err());
    }
}
