//! Class identifier: organizationally unique identifier plus information and
//! packet class codes.

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest value representable in the 24-bit OUI field.
pub const MAX_OUI: u32 = 0x00FF_FFFF;

/// Class identifier as carried in the 8-byte header section.
///
/// Displayed as `AB-CD-EF:1234.5678` (OUI bytes, then ICC and PCC in hex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClassId {
    pub oui: u32,
    pub icc: u16,
    pub pcc: u16,
}

impl ClassId {
    pub fn new(oui: u32, icc: u16, pcc: u16) -> Result<Self> {
        if oui > MAX_OUI {
            return Err(VrtError::invalid_value("class id OUI", format!("{oui:#x} exceeds 24 bits")));
        }
        Ok(Self { oui, icc, pcc })
    }

    /// Decode from the 56 significant bits of the class-id section.
    pub const fn from_bits(bits: i64) -> Self {
        let bits = bits as u64;
        Self {
            oui: ((bits >> 32) as u32) & MAX_OUI,
            icc: (bits >> 16) as u16,
            pcc: bits as u16,
        }
    }

    /// Packed `oui << 32 | icc << 16 | pcc`.
    pub const fn bits(self) -> i64 {
        (((self.oui & MAX_OUI) as i64) << 32) | ((self.icc as i64) << 16) | self.pcc as i64
    }

    pub const fn is_zero(self) -> bool {
        self.oui == 0 && self.icc == 0 && self.pcc == 0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}-{:02X}-{:02X}:{:04X}.{:04X}",
            (self.oui >> 16) & 0xFF,
            (self.oui >> 8) & 0xFF,
            self.oui & 0xFF,
            self.icc,
            self.pcc
        )
    }
}

impl FromStr for ClassId {
    type Err = VrtError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || VrtError::invalid_value("class id", format!("expected AB-CD-EF:1234.5678, found '{s}'"));
        let (oui, codes) = s.trim().split_once(':').ok_or_else(bad)?;
        let (icc, pcc) = codes.split_once('.').ok_or_else(bad)?;

        let oui_parts: Vec<&str> = oui.split('-').collect();
        if oui_parts.len() != 3 || oui_parts.iter().any(|p| p.is_empty() || p.len() > 2) {
            return Err(bad());
        }
        let mut oui_value = 0u32;
        for part in oui_parts {
            oui_value = (oui_value << 8) | u32::from(u8::from_str_radix(part, 16).map_err(|_| bad())?);
        }
        let icc = u16::from_str_radix(icc, 16).map_err(|_| bad())?;
        let pcc = u16::from_str_radix(pcc, 16).map_err(|_| bad())?;
        Ok(Self { oui: oui_value, icc, pcc })
    }
}
