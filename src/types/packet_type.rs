//! Packet type nibble of the VRT header word.

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};

/// Packet type carried in bits 31..28 of the header word.
///
/// Acknowledge packets are command-class packets with the acknowledge bit set,
/// so they share the `Command` / `ExtCommand` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Signal data without a stream identifier
    UnidentifiedData = 0,
    /// Signal data
    Data = 1,
    /// Extension data without a stream identifier
    UnidentifiedExtData = 2,
    /// Extension data
    ExtData = 3,
    /// IF context
    Context = 4,
    /// Extension context
    ExtContext = 5,
    /// Command (control and acknowledge)
    Command = 6,
    /// Extension command
    ExtCommand = 7,
}

impl PacketType {
    pub const ALL: [PacketType; 8] = [
        PacketType::UnidentifiedData,
        PacketType::Data,
        PacketType::UnidentifiedExtData,
        PacketType::ExtData,
        PacketType::Context,
        PacketType::ExtContext,
        PacketType::Command,
        PacketType::ExtCommand,
    ];

    /// Decode a header nibble. Codes 8..15 are reserved.
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL.get(usize::from(code)).copied().ok_or_else(|| {
            VrtError::invalid_value("packet type", format!("reserved packet type code {code}"))
        })
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether packets of this type carry a stream identifier word.
    pub const fn has_stream_id(self) -> bool {
        !matches!(self, PacketType::UnidentifiedData | PacketType::UnidentifiedExtData)
    }

    pub const fn is_data(self) -> bool {
        (self as u8) < 4
    }

    pub const fn is_context(self) -> bool {
        matches!(self, PacketType::Context | PacketType::ExtContext)
    }

    pub const fn is_command(self) -> bool {
        matches!(self, PacketType::Command | PacketType::ExtCommand)
    }

    /// Data type with the same extension flag and the requested stream-id presence.
    pub(crate) const fn with_stream_id(self, present: bool) -> Self {
        match (self, present) {
            (PacketType::UnidentifiedData, true) => PacketType::Data,
            (PacketType::Data, false) => PacketType::UnidentifiedData,
            (PacketType::UnidentifiedExtData, true) => PacketType::ExtData,
            (PacketType::ExtData, false) => PacketType::UnidentifiedExtData,
            (other, _) => other,
        }
    }
}
