//! State and event indicator word.
//!
//! Shared by the data packet trailer and the context "state and event
//! indicators" field. Each indicator has an enable bit (31..20) and a value bit
//! twelve positions lower (19..8). The trailer additionally carries an
//! associated context packet count in bits 7..0 (bit 7 enables the count).

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};

const ASSOCIATED_COUNT_ENABLE: u32 = 1 << 7;
const ASSOCIATED_COUNT_MASK: u32 = 0x7F;

/// Named indicator in a state/event word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    CalibratedTimeStamp,
    ValidData,
    ReferenceLock,
    AgcMgc,
    DetectedSignal,
    SpectralInversion,
    OverRange,
    SampleLoss,
    UserDefined0,
    UserDefined1,
    UserDefined2,
    UserDefined3,
}

impl Indicator {
    pub const ALL: [Indicator; 12] = [
        Indicator::CalibratedTimeStamp,
        Indicator::ValidData,
        Indicator::ReferenceLock,
        Indicator::AgcMgc,
        Indicator::DetectedSignal,
        Indicator::SpectralInversion,
        Indicator::OverRange,
        Indicator::SampleLoss,
        Indicator::UserDefined0,
        Indicator::UserDefined1,
        Indicator::UserDefined2,
        Indicator::UserDefined3,
    ];

    /// Bit position of the enable flag.
    pub const fn enable_bit(self) -> u32 {
        31 - self as u32
    }

    /// Bit position of the indicator value.
    pub const fn value_bit(self) -> u32 {
        self.enable_bit() - 12
    }
}

/// Packed state/event indicator word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateEventIndicators(pub u32);

impl StateEventIndicators {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// `None` when the indicator is not enabled.
    pub fn get(&self, indicator: Indicator) -> Option<bool> {
        let enabled = self.0 & (1 << indicator.enable_bit()) != 0;
        enabled.then(|| self.0 & (1 << indicator.value_bit()) != 0)
    }

    /// Set an indicator; `None` clears both the enable and value bits.
    pub fn set(&mut self, indicator: Indicator, value: Option<bool>) {
        let enable = 1 << indicator.enable_bit();
        let bit = 1 << indicator.value_bit();
        match value {
            None => self.0 &= !(enable | bit),
            Some(true) => self.0 |= enable | bit,
            Some(false) => self.0 = (self.0 | enable) & !bit,
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, indicator: Indicator, value: bool) -> Self {
        self.set(indicator, Some(value));
        self
    }

    /// Associated context packet count, trailer only.
    pub fn associated_context_packets(&self) -> Option<u8> {
        (self.0 & ASSOCIATED_COUNT_ENABLE != 0).then_some((self.0 & ASSOCIATED_COUNT_MASK) as u8)
    }

    pub fn set_associated_context_packets(&mut self, count: Option<u8>) -> Result<()> {
        match count {
            None => self.0 &= !(ASSOCIATED_COUNT_ENABLE | ASSOCIATED_COUNT_MASK),
            Some(n) if u32::from(n) > ASSOCIATED_COUNT_MASK => {
                return Err(VrtError::invalid_value(
                    "associated context packet count",
                    format!("{n} exceeds 127"),
                ));
            }
            Some(n) => {
                self.0 = (self.0 & !ASSOCIATED_COUNT_MASK) | ASSOCIATED_COUNT_ENABLE | u32::from(n);
            }
        }
        Ok(())
    }
}
