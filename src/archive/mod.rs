//! VITA Radio Archive (VRA) files.
//!
//! A VRA file is a 20-byte header followed by VRT packets stored back to
//! back. [`VraFile`] appends packets, maintains the header's length and CRC
//! fields, and walks the packets with [`PacketCursor`]s.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use vrt_codec::archive::{FileMode, VraFile};
//! use vrt_codec::{CodecConfig, DataPacket, VrtPacket};
//!
//! fn record() -> vrt_codec::Result<()> {
//!     let config = CodecConfig::default();
//!     let mut file = VraFile::open("capture.vra", FileMode::Write, config)?;
//!     file.append(&DataPacket::new(config))?;
//!     file.update_crc()?;
//!     file.close()?;
//!
//!     let mut file = VraFile::open("capture.vra", FileMode::Read, config)?;
//!     for packet in file.packets() {
//!         println!("{:?}", packet?.packet_type());
//!     }
//!     Ok(())
//! }
//! ```

mod file;
mod format;

pub use file::{FileMode, PacketCursor, Packets, VraFile};
pub use format::{
    DEFAULT_VERSION, MAX_VERSION_SUPPORTED, MIN_VERSION_SUPPORTED, VRA_FAW, VRA_HEADER_LENGTH, VRA_TRAILER_LENGTH,
    VraHeader,
};
