//! VRA file header.
//!
//! ## Layout
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | `"VRAF"` sync word                      |
//! | 4      | 1    | version                                 |
//! | 5      | 3    | reserved, zero                          |
//! | 8      | 8    | file length in bytes, header included   |
//! | 16     | 4    | CRC-32 of the packet region, or `"VEND"` |
//!
//! All fields are big-endian. The packets follow the header back to back;
//! there is no trailer.

use crate::frame::NO_CRC;
use crate::numeric::{get_be, put_be};
use crate::{Result, VrtError};
use std::io::Read;
use tracing::{debug, trace};

/// `"VRAF"`
pub const VRA_FAW: u32 = 0x5652_4146;
pub const VRA_HEADER_LENGTH: usize = 20;
pub const VRA_TRAILER_LENGTH: usize = 0;
pub const MIN_VERSION_SUPPORTED: u8 = 1;
pub const MAX_VERSION_SUPPORTED: u8 = 1;
pub const DEFAULT_VERSION: u8 = 1;

/// In-memory copy of the 20-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VraHeader {
    pub version: u8,
    pub file_length: u64,
    pub crc: u32,
}

impl Default for VraHeader {
    fn default() -> Self {
        Self { version: DEFAULT_VERSION, file_length: VRA_HEADER_LENGTH as u64, crc: NO_CRC }
    }
}

impl VraHeader {
    pub fn parse_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        trace!("Reading VRA header ({} bytes)", VRA_HEADER_LENGTH);
        let mut raw = [0u8; VRA_HEADER_LENGTH];
        reader.read_exact(&mut raw).map_err(|e| {
            VrtError::malformed("VRA header", format!("failed to read {VRA_HEADER_LENGTH} header bytes: {e}"))
        })?;
        Self::from_bytes(&raw)
    }

    /// Decode and check the sync word and version.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < VRA_HEADER_LENGTH {
            return Err(VrtError::malformed(
                "VRA header",
                format!("need {VRA_HEADER_LENGTH} bytes, found {}", raw.len()),
            ));
        }
        let faw: u32 = get_be(raw, 0);
        if faw != VRA_FAW {
            return Err(VrtError::malformed("VRA header", format!("bad sync word {faw:#010x}")));
        }
        let header = Self { version: raw[4], file_length: get_be(raw, 8), crc: get_be(raw, 16) };
        check_version(header.version).map_err(|e| VrtError::malformed("VRA header", e.to_string()))?;
        debug!("Parsed VRA header: version={}, file_length={}, crc={:#010x}", header.version, header.file_length, header.crc);
        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; VRA_HEADER_LENGTH] {
        let mut raw = [0u8; VRA_HEADER_LENGTH];
        put_be(&mut raw, 0, VRA_FAW);
        raw[4] = self.version;
        put_be(&mut raw, 8, self.file_length);
        put_be(&mut raw, 16, self.crc);
        raw
    }
}

pub(crate) fn check_version(version: u8) -> Result<()> {
    if !(MIN_VERSION_SUPPORTED..=MAX_VERSION_SUPPORTED).contains(&version) {
        return Err(VrtError::invalid_value(
            "VRA version",
            format!("{version} is outside {MIN_VERSION_SUPPORTED}..={MAX_VERSION_SUPPORTED}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn default_header_bytes() {
        let raw = VraHeader::default().to_bytes();
        assert_eq!(&raw[..4], b"VRAF");
        assert_eq!(raw[4], 1);
        assert_eq!(&raw[5..8], &[0, 0, 0]);
        assert_eq!(&raw[8..16], &20u64.to_be_bytes());
        assert_eq!(&raw[16..], b"VEND");
    }

    #[test]
    fn parse_checks_sync_and_version() -> Result<()> {
        let header = VraHeader { version: 1, file_length: 1234, crc: 0xDEAD_BEEF };
        let mut raw = header.to_bytes();
        assert_eq!(VraHeader::parse_from_reader(&mut &raw[..])?, header);

        raw[4] = 2;
        assert!(VraHeader::from_bytes(&raw).is_err());
        raw[4] = 1;
        raw[0] = b'X';
        assert!(VraHeader::from_bytes(&raw).is_err());
        assert!(VraHeader::parse_from_reader(&mut &raw[..10]).is_err());
        Ok(())
    }
}
