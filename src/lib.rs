//! Type-safe Rust codec for VITA-49 radio transport.
//!
//! vrt-codec reads and writes VRT packets directly over their wire bytes, wraps
//! them in VITA Radio Link (VRL) frames and stores them in VITA Radio Archive
//! (VRA) files.
//!
//! # Features
//!
//! - **Self-describing headers**: stream id, class id and timestamp sections are
//!   inserted and removed in place, lengths always derived from the header flags
//! - **Every packet class**: data, context, command and acknowledge packets
//! - **Indicator fields**: CIF0/1/2/3 fields in canonical order with CIF7
//!   attributes, shared by context, command and acknowledge packets
//! - **Sample formats**: 1 to 64-bit integers, IEEE floats, VRT floats and
//!   fixed-point items, processing- or link-efficient packing
//! - **Framing and archives**: VRL frames with CRC-32, random-access VRA files
//!
//! # Quick Start
//!
//! ```rust
//! use vrt_codec::{AnyPacket, CodecConfig, DataPacket, DataType, PayloadFormat, TimeStamp, VrtPacket};
//!
//! # fn main() -> vrt_codec::Result<()> {
//! let config = CodecConfig::default();
//! let mut packet = DataPacket::new(config).with_payload_format(PayloadFormat::from_data_type(DataType::Int16));
//! packet.set_stream_identifier(Some(0x1000))?;
//! packet.set_time_stamp(&TimeStamp::utc(1_700_000_000, 0)?)?;
//! packet.set_data_i32(&[1, -2, 3, -4])?;
//!
//! let parsed = AnyPacket::from_bytes(packet.as_bytes(), config)?;
//! assert_eq!(parsed.stream_identifier(), Some(0x1000));
//! assert_eq!(parsed.payload_length(), 8);
//! # Ok(())
//! # }
//! ```

// Core types and error handling
mod config;
mod error;
pub mod numeric;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Codec layers
pub mod archive;
pub mod frame;
pub mod packet;

// Core exports
pub use config::{CodecConfig, VrtVersion};
pub use error::*;
pub use types::*;

// Codec exports
pub use archive::{FileMode, PacketCursor, VraFile, VraHeader};
pub use frame::{NO_CRC, VRL_FAW, VrlFrame, peek_frame_length};
pub use packet::{
    AcknowledgePacket, AnyPacket, Attribute, CifAccess, CifField, CommandPacket, ContextPacket, ControlPrologue,
    DataPacket, Identifier, VrtPacket, peek_packet_length,
};
