//! Warning and error response codes of acknowledge packets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set carried in each acknowledge response word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResponseCode(pub u32);

impl ResponseCode {
    pub const NONE: ResponseCode = ResponseCode(0);
    pub const FIELD_NOT_EXECUTED: ResponseCode = ResponseCode(1 << 31);
    pub const DEVICE_FAILURE: ResponseCode = ResponseCode(1 << 30);
    pub const ERRONEOUS_FIELD: ResponseCode = ResponseCode(1 << 29);
    pub const PARAM_OUT_OF_RANGE: ResponseCode = ResponseCode(1 << 28);
    pub const PARAM_UNSUPPORTED_PRECISION: ResponseCode = ResponseCode(1 << 27);
    pub const FIELD_VALUE_INVALID: ResponseCode = ResponseCode(1 << 26);
    pub const TIMESTAMP_PROBLEM: ResponseCode = ResponseCode(1 << 25);
    pub const HAZARDOUS_POWER_LEVELS: ResponseCode = ResponseCode(1 << 24);
    pub const DISTORTION: ResponseCode = ResponseCode(1 << 23);
    pub const IN_BAND_POWER_COMPLIANCE: ResponseCode = ResponseCode(1 << 22);
    pub const OUT_OF_BAND_POWER_COMPLIANCE: ResponseCode = ResponseCode(1 << 21);
    pub const COSITE_INTERFERENCE: ResponseCode = ResponseCode(1 << 20);
    pub const REGIONAL_INTERFERENCE: ResponseCode = ResponseCode(1 << 19);

    const NAMED: [(ResponseCode, &'static str); 13] = [
        (Self::FIELD_NOT_EXECUTED, "FIELD_NOT_EXECUTED"),
        (Self::DEVICE_FAILURE, "DEVICE_FAILURE"),
        (Self::ERRONEOUS_FIELD, "ERRONEOUS_FIELD"),
        (Self::PARAM_OUT_OF_RANGE, "PARAM_OUT_OF_RANGE"),
        (Self::PARAM_UNSUPPORTED_PRECISION, "PARAM_UNSUPPORTED_PRECISION"),
        (Self::FIELD_VALUE_INVALID, "FIELD_VALUE_INVALID"),
        (Self::TIMESTAMP_PROBLEM, "TIMESTAMP_PROBLEM"),
        (Self::HAZARDOUS_POWER_LEVELS, "HAZARDOUS_POWER_LEVELS"),
        (Self::DISTORTION, "DISTORTION"),
        (Self::IN_BAND_POWER_COMPLIANCE, "IN_BAND_POWER_COMPLIANCE"),
        (Self::OUT_OF_BAND_POWER_COMPLIANCE, "OUT_OF_BAND_POWER_COMPLIANCE"),
        (Self::COSITE_INTERFERENCE, "COSITE_INTERFERENCE"),
        (Self::REGIONAL_INTERFERENCE, "REGIONAL_INTERFERENCE"),
    ];

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `flag` is set.
    pub fn contains(&self, flag: ResponseCode) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ResponseCode {
    type Output = ResponseCode;

    fn bitor(self, rhs: ResponseCode) -> ResponseCode {
        ResponseCode(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResponseCode {
    fn bitor_assign(&mut self, rhs: ResponseCode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(code, _)| self.contains(*code))
            .map(|(_, name)| *name)
            .collect();
        let known = Self::NAMED.iter().fold(0, |acc, (code, _)| acc | code.0);
        let unknown = self.0 & !known;
        match (names.is_empty(), unknown) {
            (true, 0) => f.write_str("NONE"),
            (_, 0) => f.write_str(&names.join("|")),
            (true, bits) => write!(f, "{bits:#010x}"),
            (false, bits) => write!(f, "{}|{bits:#010x}", names.join("|")),
        }
    }
}
