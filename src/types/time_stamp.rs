//! Packet timestamps.
//!
//! A VRT timestamp has two independent halves: an optional 32-bit integer-seconds
//! word (TSI) and an optional 64-bit fractional word (TSF). Each half has its own
//! 2-bit mode in the header, and a mode of `None` means the word is absent.
//!
//! Converting between UTC and GPS integer seconds needs the cumulative leap
//! second count, which is supplied by a [`TimeAuthority`].

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Picoseconds in one second, the bound for real-time fractional values.
pub const ONE_SECOND_PICOS: u64 = 1_000_000_000_000;

/// UTC POSIX seconds at the GPS epoch (1980-01-06T00:00:00Z).
pub const GPS_EPOCH_UTC: i64 = 315_964_800;

/// TAI - UTC at the GPS epoch.
const LEAP_SECONDS_AT_GPS_EPOCH: i64 = 19;

/// Integer timestamp mode (TSI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IntegerMode {
    #[default]
    None = 0,
    Utc = 1,
    Gps = 2,
    Other = 3,
}

/// Fractional timestamp mode (TSF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FractionalMode {
    #[default]
    None = 0,
    SampleCount = 1,
    RealTime = 2,
    FreeRunningCount = 3,
}

impl IntegerMode {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => IntegerMode::None,
            1 => IntegerMode::Utc,
            2 => IntegerMode::Gps,
            _ => IntegerMode::Other,
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }
}

impl FractionalMode {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => FractionalMode::None,
            1 => FractionalMode::SampleCount,
            2 => FractionalMode::RealTime,
            _ => FractionalMode::FreeRunningCount,
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// Leap-second service used for UTC/GPS conversion.
pub trait TimeAuthority {
    /// Cumulative TAI - UTC offset in effect at the given UTC POSIX second.
    fn leap_seconds_at_utc(&self, utc_seconds: i64) -> i64;

    /// Cumulative TAI - UTC offset in effect at the given GPS second.
    fn leap_seconds_at_gps(&self, gps_seconds: i64) -> i64;
}

/// Authority that reports one constant offset, for closed time windows and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLeapSeconds(pub i64);

impl TimeAuthority for FixedLeapSeconds {
    fn leap_seconds_at_utc(&self, _utc_seconds: i64) -> i64 {
        self.0
    }

    fn leap_seconds_at_gps(&self, _gps_seconds: i64) -> i64 {
        self.0
    }
}

/// Timestamp value as carried in a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeStamp {
    integer_mode: IntegerMode,
    fractional_mode: FractionalMode,
    seconds: u32,
    fractional: u64,
}

impl TimeStamp {
    /// No timestamp; both header sections absent.
    pub const NONE: TimeStamp = TimeStamp {
        integer_mode: IntegerMode::None,
        fractional_mode: FractionalMode::None,
        seconds: 0,
        fractional: 0,
    };

    pub fn new(
        integer_mode: IntegerMode,
        fractional_mode: FractionalMode,
        seconds: u32,
        fractional: u64,
    ) -> Result<Self> {
        if fractional_mode == FractionalMode::RealTime && fractional >= ONE_SECOND_PICOS {
            return Err(VrtError::invalid_value(
                "fractional timestamp",
                format!("{fractional} ps is not below one second"),
            ));
        }
        Ok(Self {
            integer_mode,
            fractional_mode,
            seconds: if integer_mode == IntegerMode::None { 0 } else { seconds },
            fractional: if fractional_mode == FractionalMode::None { 0 } else { fractional },
        })
    }

    /// UTC seconds plus picoseconds.
    pub fn utc(seconds: u32, picoseconds: u64) -> Result<Self> {
        Self::new(IntegerMode::Utc, FractionalMode::RealTime, seconds, picoseconds)
    }

    /// GPS seconds plus picoseconds.
    pub fn gps(seconds: u32, picoseconds: u64) -> Result<Self> {
        Self::new(IntegerMode::Gps, FractionalMode::RealTime, seconds, picoseconds)
    }

    /// Free-running sample count without integer seconds.
    pub fn sample_count(count: u64) -> Self {
        Self {
            integer_mode: IntegerMode::None,
            fractional_mode: FractionalMode::SampleCount,
            seconds: 0,
            fractional: count,
        }
    }

    pub const fn integer_mode(&self) -> IntegerMode {
        self.integer_mode
    }

    pub const fn fractional_mode(&self) -> FractionalMode {
        self.fractional_mode
    }

    /// Integer seconds, or `None` when the TSI word is absent.
    pub fn seconds(&self) -> Option<u32> {
        (self.integer_mode != IntegerMode::None).then_some(self.seconds)
    }

    /// Fractional value, or `None` when the TSF words are absent.
    pub fn fractional(&self) -> Option<u64> {
        (self.fractional_mode != FractionalMode::None).then_some(self.fractional)
    }

    pub fn is_none(&self) -> bool {
        self.integer_mode == IntegerMode::None && self.fractional_mode == FractionalMode::None
    }

    /// Add picoseconds to a real-time stamp, carrying into the integer seconds.
    pub fn add_picoseconds(&self, delta: i64) -> Result<Self> {
        if self.fractional_mode != FractionalMode::RealTime || self.integer_mode == IntegerMode::None {
            return Err(VrtError::unsupported(
                "add_picoseconds",
                "requires integer seconds with a real-time fraction",
            ));
        }
        let total = i128::from(self.seconds) * i128::from(ONE_SECOND_PICOS)
            + i128::from(self.fractional)
            + i128::from(delta);
        let one = i128::from(ONE_SECOND_PICOS);
        let seconds = u32::try_from(total.div_euclid(one))
            .map_err(|_| VrtError::invalid_value("timestamp", "seconds out of range after adjustment"))?;
        let picos = total.rem_euclid(one) as u64;
        Self::new(self.integer_mode, self.fractional_mode, seconds, picos)
    }

    /// Convert a UTC stamp to GPS seconds. GPS stamps are returned unchanged.
    pub fn to_gps(&self, authority: &dyn TimeAuthority) -> Result<Self> {
        match self.integer_mode {
            IntegerMode::Gps => Ok(*self),
            IntegerMode::Utc => {
                let utc = i64::from(self.seconds);
                let gps = utc - GPS_EPOCH_UTC + authority.leap_seconds_at_utc(utc) - LEAP_SECONDS_AT_GPS_EPOCH;
                let seconds = u32::try_from(gps).map_err(|_| {
                    VrtError::invalid_value("timestamp", format!("UTC second {utc} precedes the GPS epoch"))
                })?;
                Ok(Self { integer_mode: IntegerMode::Gps, seconds, ..*self })
            }
            mode => Err(VrtError::unsupported("to_gps", format!("integer mode {mode:?} has no epoch"))),
        }
    }

    /// Convert a GPS stamp to UTC seconds. UTC stamps are returned unchanged.
    pub fn to_utc(&self, authority: &dyn TimeAuthority) -> Result<Self> {
        match self.integer_mode {
            IntegerMode::Utc => Ok(*self),
            IntegerMode::Gps => {
                let gps = i64::from(self.seconds);
                let utc = gps + GPS_EPOCH_UTC - (authority.leap_seconds_at_gps(gps) - LEAP_SECONDS_AT_GPS_EPOCH);
                let seconds = u32::try_from(utc).map_err(|_| {
                    VrtError::invalid_value("timestamp", format!("GPS second {gps} is outside the UTC range"))
                })?;
                Ok(Self { integer_mode: IntegerMode::Utc, seconds, ..*self })
            }
            mode => Err(VrtError::unsupported("to_utc", format!("integer mode {mode:?} has no epoch"))),
        }
    }

    pub(crate) const fn raw_seconds(&self) -> u32 {
        self.seconds
    }

    pub(crate) const fn raw_fractional(&self) -> u64 {
        self.fractional
    }

    pub(crate) const fn from_raw(
        integer_mode: IntegerMode,
        fractional_mode: FractionalMode,
        seconds: u32,
        fractional: u64,
    ) -> Self {
        Self { integer_mode, fractional_mode, seconds, fractional }
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.seconds(), self.fractional()) {
            (None, None) => f.write_str("<no timestamp>"),
            (Some(s), None) => write!(f, "{:?} {}", self.integer_mode, s),
            (None, Some(frac)) => write!(f, "{:?} {}", self.fractional_mode, frac),
            (Some(s), Some(frac)) if self.fractional_mode == FractionalMode::RealTime => {
                write!(f, "{:?} {}.{:012}", self.integer_mode, s, frac)
            }
            (Some(s), Some(frac)) => {
                write!(f, "{:?} {} + {:?} {}", self.integer_mode, s, self.fractional_mode, frac)
            }
        }
    }
}
