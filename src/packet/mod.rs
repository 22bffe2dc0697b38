//! VRT packet classes.
//!
//! ## Architecture
//!
//! Every packet wraps a [`PacketBuffer`], the byte-exact wire image. The
//! [`VrtPacket`] trait exposes the header model through default methods over
//! `buffer()` / `buffer_mut()` and restricts `set_packet_type` to the types each
//! class supports:
//!
//! - [`DataPacket`]: signal samples plus an optional trailer
//! - [`ContextPacket`]: CIF-indexed metadata fields
//! - [`CommandPacket`]: control prologue followed by CIF-indexed control fields
//! - [`AcknowledgePacket`]: control prologue, warning and error blocks, free-form message
//!
//! [`AnyPacket`] dispatches raw bytes to the right class.
//!
//! ## Usage Example
//!
//! ```rust
//! use vrt_codec::packet::{AnyPacket, ContextPacket, VrtPacket};
//! use vrt_codec::{CifAccess, CodecConfig};
//!
//! # fn main() -> vrt_codec::Result<()> {
//! let mut context = ContextPacket::new(CodecConfig::default());
//! context.set_stream_identifier(Some(0x42))?;
//! context.set_sample_rate(Some(10.0e6))?;
//!
//! let parsed = AnyPacket::from_bytes(context.as_bytes(), CodecConfig::default())?;
//! assert_eq!(parsed.stream_identifier(), Some(0x42));
//! # Ok(())
//! # }
//! ```

mod acknowledge;
mod buffer;
mod cif;
mod command;
mod context;
mod data;
mod indicator;
mod payload;
mod records;

pub use acknowledge::{AcknowledgePacket, FreeFormMessage};
pub use buffer::{HEADER_WORD_LENGTH, MAX_PACKET_LENGTH, PacketBuffer, peek_packet_length};
pub use cif::{Attribute, CifField, FIELD_TABLE, FieldSize, FieldSpec, IndicatorWord};
pub use command::{ActionMode, CommandPacket, ControlPrologue, Identifier};
pub use context::{CifAccess, ContextPacket};
pub use data::DataPacket;
pub use records::{ContextAssociationLists, DeviceId, Ephemeris, Gain, Geolocation, GpsAscii};

use crate::types::{ClassId, PacketType, TimeStamp};
use crate::{CodecConfig, Result, VrtError};

/// Behavior shared by every packet class.
pub trait VrtPacket {
    fn buffer(&self) -> &PacketBuffer;

    fn buffer_mut(&mut self) -> &mut PacketBuffer;

    /// Whether this packet class can carry `packet_type`.
    fn supports_packet_type(&self, packet_type: PacketType) -> bool;

    /// Class-specific payload checks run by [`validate`](Self::validate).
    fn validate_payload(&self, _strict: bool) -> Result<()> {
        Ok(())
    }

    fn as_bytes(&self) -> &[u8] {
        self.buffer().as_bytes()
    }

    fn config(&self) -> CodecConfig {
        self.buffer().config()
    }

    fn packet_type(&self) -> PacketType {
        self.buffer().packet_type()
    }

    /// Change the packet type within the class's supported set.
    fn set_packet_type(&mut self, packet_type: PacketType) -> Result<()> {
        if !self.supports_packet_type(packet_type) {
            return Err(VrtError::unsupported(
                "set_packet_type",
                format!("packet type {packet_type:?} not supported by this class"),
            ));
        }
        self.buffer_mut().set_packet_type(packet_type)
    }

    fn stream_identifier(&self) -> Option<u32> {
        self.buffer().stream_identifier()
    }

    fn set_stream_identifier(&mut self, stream_id: Option<u32>) -> Result<()> {
        self.buffer_mut().set_stream_identifier(stream_id)
    }

    fn class_id(&self) -> Option<ClassId> {
        self.buffer().class_id()
    }

    fn class_identifier_bits(&self) -> Option<i64> {
        self.buffer().class_identifier_bits()
    }

    fn set_class_id(&mut self, class_id: Option<ClassId>) -> Result<()> {
        self.buffer_mut().set_class_id(class_id)
    }

    fn set_class_id_str(&mut self, class_id: &str) -> Result<()> {
        self.buffer_mut().set_class_id_str(class_id)
    }

    fn time_stamp(&self) -> TimeStamp {
        self.buffer().time_stamp()
    }

    fn set_time_stamp(&mut self, ts: &TimeStamp) -> Result<()> {
        self.buffer_mut().set_time_stamp(ts)
    }

    fn packet_count(&self) -> u8 {
        self.buffer().packet_count()
    }

    fn set_packet_count(&mut self, count: u8) -> Result<()> {
        self.buffer_mut().set_packet_count(count)
    }

    fn pad_bit_count(&self) -> u8 {
        self.buffer().pad_bit_count()
    }

    fn set_pad_bit_count(&mut self, bits: u8) -> Result<()> {
        self.buffer_mut().set_pad_bit_count(bits)
    }

    fn header_length(&self) -> usize {
        self.buffer().header_length()
    }

    fn payload_length(&self) -> usize {
        self.buffer().payload_length()
    }

    fn trailer_length(&self) -> usize {
        self.buffer().trailer_length()
    }

    fn packet_length(&self) -> usize {
        self.buffer().packet_length()
    }

    fn payload(&self) -> &[u8] {
        self.buffer().payload()
    }

    /// Header, class and payload checks.
    ///
    /// Non-strict mode rejects only structural problems; strict mode also
    /// rejects reserved bits and version-gated fields.
    fn validate(&self, strict: bool, known_length: Option<usize>) -> Result<()> {
        self.buffer().validate_header(strict, known_length)?;
        let packet_type = self.packet_type();
        if !self.supports_packet_type(packet_type) {
            return Err(VrtError::validation(
                "VRT packet",
                format!("packet type {packet_type:?} not supported by this class"),
            ));
        }
        self.validate_payload(strict)
    }

    fn is_packet_valid(&self) -> bool {
        self.validate(true, None).is_ok()
    }

    /// Restamp the packet before sending it again. Returns whether any other
    /// field was changed as part of the reset.
    fn reset_for_resend(&mut self, ts: &TimeStamp) -> Result<bool> {
        self.set_time_stamp(ts)?;
        Ok(false)
    }
}

/// Any supported packet, dispatched on the header type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyPacket {
    Data(DataPacket),
    Context(ContextPacket),
    Command(CommandPacket),
    Acknowledge(AcknowledgePacket),
}

impl AnyPacket {
    /// Parse the packet at the start of `buf`.
    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        let buffer = PacketBuffer::from_bytes(buf, config)?;
        let packet_type = buffer.packet_type();
        Ok(if packet_type.is_data() {
            AnyPacket::Data(DataPacket::from_buffer(buffer)?)
        } else if packet_type.is_context() {
            AnyPacket::Context(ContextPacket::from_buffer(buffer)?)
        } else if buffer.header_bit(buffer::BIT_26) {
            AnyPacket::Acknowledge(AcknowledgePacket::from_buffer(buffer)?)
        } else {
            AnyPacket::Command(CommandPacket::from_buffer(buffer)?)
        })
    }

    fn inner(&self) -> &dyn VrtPacket {
        match self {
            AnyPacket::Data(p) => p,
            AnyPacket::Context(p) => p,
            AnyPacket::Command(p) => p,
            AnyPacket::Acknowledge(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn VrtPacket {
        match self {
            AnyPacket::Data(p) => p,
            AnyPacket::Context(p) => p,
            AnyPacket::Command(p) => p,
            AnyPacket::Acknowledge(p) => p,
        }
    }

    pub fn as_data(&self) -> Option<&DataPacket> {
        match self {
            AnyPacket::Data(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&ContextPacket> {
        match self {
            AnyPacket::Context(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandPacket> {
        match self {
            AnyPacket::Command(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_acknowledge(&self) -> Option<&AcknowledgePacket> {
        match self {
            AnyPacket::Acknowledge(p) => Some(p),
            _ => None,
        }
    }
}

impl VrtPacket for AnyPacket {
    fn buffer(&self) -> &PacketBuffer {
        self.inner().buffer()
    }

    fn buffer_mut(&mut self) -> &mut PacketBuffer {
        self.inner_mut().buffer_mut()
    }

    fn supports_packet_type(&self, packet_type: PacketType) -> bool {
        self.inner().supports_packet_type(packet_type)
    }

    fn validate_payload(&self, strict: bool) -> Result<()> {
        self.inner().validate_payload(strict)
    }

    fn reset_for_resend(&mut self, ts: &TimeStamp) -> Result<bool> {
        self.inner_mut().reset_for_resend(ts)
    }
}

impl From<DataPacket> for AnyPacket {
    fn from(packet: DataPacket) -> Self {
        AnyPacket::Data(packet)
    }
}

impl From<ContextPacket> for AnyPacket {
    fn from(packet: ContextPacket) -> Self {
        AnyPacket::Context(packet)
    }
}

impl From<CommandPacket> for AnyPacket {
    fn from(packet: CommandPacket) -> Self {
        AnyPacket::Command(packet)
    }
}

impl From<AcknowledgePacket> for AnyPacket {
    fn from(packet: AcknowledgePacket) -> Self {
        AnyPacket::Acknowledge(packet)
    }
}
