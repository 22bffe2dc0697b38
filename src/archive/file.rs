//! Random-access VRA files.
//!
//! The header is held in memory and written back by [`VraFile::flush`];
//! packets are written straight through to storage on append.

use super::format::{VRA_HEADER_LENGTH, VraHeader, check_version};
use crate::frame::NO_CRC;
use crate::packet::{AnyPacket, PacketBuffer, VrtPacket, peek_packet_length};
use crate::{CodecConfig, Result, VrtError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CRC_CHUNK: usize = 64 * 1024;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Existing file, header validated, no writes.
    Read,
    /// New or truncated file with a fresh header.
    Write,
    /// Existing file (or a new one if absent) open for appends.
    ReadWrite,
}

impl FileMode {
    fn is_writable(self) -> bool {
        !matches!(self, FileMode::Read)
    }
}

/// Byte position of a packet within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketCursor {
    pub offset: u64,
}

/// A VRA archive over any seekable storage.
pub struct VraFile<S: Read + Write + Seek = File> {
    storage: S,
    path: PathBuf,
    mode: FileMode,
    config: CodecConfig,
    header: VraHeader,
    /// Bytes actually present in storage.
    end: u64,
    dirty: bool,
}

impl VraFile<File> {
    /// Open `path` in `mode`.
    pub fn open<P: AsRef<Path>>(path: P, mode: FileMode, config: CodecConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match mode {
            FileMode::Read => File::open(&path),
            FileMode::Write => OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path),
            FileMode::ReadWrite => OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path),
        }
        .map_err(|e| VrtError::file_error(path.clone(), e))?;
        info!("Opened VRA file {} ({:?})", path.display(), mode);
        Self::with_path(file, path, mode, config)
    }
}

impl<S: Read + Write + Seek> VraFile<S> {
    /// Wrap already-open storage. `Write` mode discards existing content.
    pub fn from_storage(storage: S, mode: FileMode, config: CodecConfig) -> Result<Self> {
        Self::with_path(storage, PathBuf::from("<memory>"), mode, config)
    }

    fn with_path(storage: S, path: PathBuf, mode: FileMode, config: CodecConfig) -> Result<Self> {
        let mut file = Self { storage, path, mode, config, header: VraHeader::default(), end: 0, dirty: false };
        let existing = file.storage.seek(SeekFrom::End(0)).map_err(|e| file.io_error(e))?;

        if mode == FileMode::Write || (mode == FileMode::ReadWrite && existing == 0) {
            file.end = VRA_HEADER_LENGTH as u64;
            file.write_header()?;
            return Ok(file);
        }

        file.storage.seek(SeekFrom::Start(0)).map_err(|e| file.io_error(e))?;
        file.header = VraHeader::parse_from_reader(&mut file.storage)?;
        file.end = existing;
        if file.header.file_length != existing {
            warn!(
                "VRA header reports {} bytes, {} holds {}",
                file.header.file_length,
                file.path.display(),
                existing
            );
        }
        Ok(file)
    }

    fn io_error(&self, source: std::io::Error) -> VrtError {
        VrtError::file_error(self.path.clone(), source)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.storage.seek(SeekFrom::Start(offset)).map_err(|e| self.io_error(e))?;
        self.storage.read_exact(buf).map_err(|e| self.io_error(e))
    }

    fn write_header(&mut self) -> Result<()> {
        let raw = self.header.to_bytes();
        self.storage.seek(SeekFrom::Start(0)).map_err(|e| self.io_error(e))?;
        self.storage.write_all(&raw).map_err(|e| self.io_error(e))?;
        self.dirty = false;
        Ok(())
    }

    fn require_writable(&self, operation: &str) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(VrtError::unsupported(operation.to_string(), "file is open read-only"));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn header(&self) -> &VraHeader {
        &self.header
    }

    pub fn header_length(&self) -> usize {
        VRA_HEADER_LENGTH
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Change the version byte; out-of-range values leave the header untouched.
    pub fn set_version(&mut self, version: u8) -> Result<()> {
        self.require_writable("set_version")?;
        check_version(version)?;
        self.header.version = version;
        self.dirty = true;
        Ok(())
    }

    /// File length recorded in the (in-memory) header.
    pub fn file_length(&self) -> u64 {
        self.header.file_length
    }

    /// Record the storage length in the header.
    pub fn update_file_length(&mut self) -> Result<()> {
        self.require_writable("update_file_length")?;
        self.header.file_length = self.end;
        self.dirty = true;
        Ok(())
    }

    /// Write `packet` at the end of the file and extend the header length.
    pub fn append<P: VrtPacket + ?Sized>(&mut self, packet: &P) -> Result<()> {
        self.require_writable("append")?;
        let bytes = packet.as_bytes();
        self.storage.seek(SeekFrom::Start(self.end)).map_err(|e| self.io_error(e))?;
        self.storage.write_all(bytes).map_err(|e| self.io_error(e))?;
        self.end += bytes.len() as u64;
        self.header.file_length = self.end;
        self.dirty = true;
        debug!("Appended {:?} packet ({} bytes), file now {} bytes", packet.packet_type(), bytes.len(), self.end);
        Ok(())
    }

    /// Write the header back and flush storage.
    pub fn flush(&mut self) -> Result<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        if self.dirty {
            self.write_header()?;
        }
        self.storage.flush().map_err(|e| self.io_error(e))
    }

    /// CRC-32 (IEEE 802.3 polynomial, as for VRL frames) over the packet
    /// region as stored.
    pub fn compute_crc(&mut self) -> Result<u32> {
        let mut hasher = crc32fast::Hasher::new();
        let mut chunk = vec![0u8; CRC_CHUNK];
        let mut offset = VRA_HEADER_LENGTH as u64;
        while offset < self.end {
            let len = CRC_CHUNK.min((self.end - offset) as usize);
            self.read_at(offset, &mut chunk[..len])?;
            hasher.update(&chunk[..len]);
            offset += len as u64;
        }
        Ok(hasher.finalize())
    }

    pub fn update_crc(&mut self) -> Result<()> {
        self.require_writable("update_crc")?;
        self.header.crc = self.compute_crc()?;
        self.dirty = true;
        Ok(())
    }

    /// True for the `"VEND"` sentinel or a CRC matching the packets.
    pub fn is_crc_valid(&mut self) -> bool {
        let crc = self.header.crc;
        crc == NO_CRC || self.compute_crc().is_ok_and(|c| c == crc)
    }

    pub fn begin(&self) -> PacketCursor {
        PacketCursor { offset: VRA_HEADER_LENGTH as u64 }
    }

    pub fn end(&self) -> PacketCursor {
        PacketCursor { offset: self.end }
    }

    fn packet_length_at(&mut self, cursor: PacketCursor) -> Result<usize> {
        let mut word = [0u8; 4];
        self.read_at(cursor.offset, &mut word)?;
        let length = peek_packet_length(&word, 0)?;
        if length == 0 || cursor.offset + length as u64 > self.end {
            return Err(VrtError::malformed(
                "VRA file",
                format!("packet at offset {} with length {} overruns the file", cursor.offset, length),
            ));
        }
        Ok(length)
    }

    /// Read the packet at `cursor`. With `peek_only` the packet is checked
    /// structurally and `None` is returned.
    pub fn get_this_packet(&mut self, cursor: PacketCursor, peek_only: bool) -> Result<Option<AnyPacket>> {
        if cursor.offset >= self.end {
            return Err(VrtError::invalid_value("packet cursor", format!("offset {} is at or past the end", cursor.offset)));
        }
        let length = self.packet_length_at(cursor)?;
        let mut bytes = vec![0u8; length];
        self.read_at(cursor.offset, &mut bytes)?;
        if peek_only {
            PacketBuffer::from_bytes(&bytes, self.config)?;
            return Ok(None);
        }
        AnyPacket::from_bytes(&bytes, self.config).map(Some)
    }

    /// Cursor of the packet after the one at `cursor`.
    pub fn goto_next_packet(&mut self, cursor: PacketCursor) -> Result<PacketCursor> {
        let length = self.packet_length_at(cursor)?;
        Ok(PacketCursor { offset: cursor.offset + length as u64 })
    }

    /// Iterate over every packet in file order.
    pub fn packets(&mut self) -> Packets<'_, S> {
        let cursor = self.begin();
        Packets { file: self, cursor, failed: false }
    }

    /// Check the header and, in strict mode, the recorded length, every
    /// packet boundary and the CRC.
    pub fn validate(&mut self, strict: bool, known_length: Option<u64>) -> Result<()> {
        let subject = "VRA file";
        if self.end < VRA_HEADER_LENGTH as u64 {
            return Err(VrtError::validation(subject, format!("{} bytes is below the header length", self.end)));
        }
        check_version(self.header.version).map_err(|e| VrtError::validation(subject, e.to_string()))?;
        if let Some(known) = known_length {
            if known != self.end {
                return Err(VrtError::validation(subject, format!("expected {known} bytes, file holds {}", self.end)));
            }
        }
        if !strict {
            return Ok(());
        }
        if self.header.file_length != self.end {
            return Err(VrtError::validation(
                subject,
                format!("header records {} bytes, file holds {}", self.header.file_length, self.end),
            ));
        }
        let mut cursor = self.begin();
        while cursor < self.end() {
            self.get_this_packet(cursor, true).map_err(|e| VrtError::validation(subject, e.to_string()))?;
            cursor = self.goto_next_packet(cursor).map_err(|e| VrtError::validation(subject, e.to_string()))?;
        }
        if !self.is_crc_valid() {
            return Err(VrtError::validation(subject, "CRC does not match the packet data"));
        }
        Ok(())
    }

    pub fn is_file_valid(&mut self) -> bool {
        self.validate(true, None).is_ok()
    }

    /// Byte-for-byte comparison: the in-memory header plus stored packets.
    pub fn content_equals<T: Read + Write + Seek>(&mut self, other: &mut VraFile<T>) -> Result<bool> {
        if self.header.to_bytes() != other.header.to_bytes() || self.end != other.end {
            return Ok(false);
        }
        let mut mine = vec![0u8; CRC_CHUNK];
        let mut theirs = vec![0u8; CRC_CHUNK];
        let mut offset = VRA_HEADER_LENGTH as u64;
        while offset < self.end {
            let len = CRC_CHUNK.min((self.end - offset) as usize);
            self.read_at(offset, &mut mine[..len])?;
            other.read_at(offset, &mut theirs[..len])?;
            if mine[..len] != theirs[..len] {
                return Ok(false);
            }
            offset += len as u64;
        }
        Ok(true)
    }

    /// Flush and release the storage.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!("Closed VRA file {}", self.path.display());
        Ok(())
    }

    /// Flush and hand back the storage.
    pub fn into_storage(mut self) -> Result<S>
    where
        S: Default,
    {
        self.flush()?;
        Ok(std::mem::take(&mut self.storage))
    }
}

impl<S: Read + Write + Seek> Drop for VraFile<S> {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                warn!("Failed to flush VRA file {} on drop: {}", self.path.display(), e);
            }
        }
    }
}

impl<S: Read + Write + Seek> std::fmt::Debug for VraFile<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VraFile")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("header", &self.header)
            .field("end", &self.end)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Packet iterator returned by [`VraFile::packets`]. Stops after the first
/// error.
pub struct Packets<'a, S: Read + Write + Seek> {
    file: &'a mut VraFile<S>,
    cursor: PacketCursor,
    failed: bool,
}

impl<S: Read + Write + Seek> Iterator for Packets<'_, S> {
    type Item = Result<AnyPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.file.end() {
            return None;
        }
        let item = self.file.get_this_packet(self.cursor, false).and_then(|packet| {
            self.cursor = self.file.goto_next_packet(self.cursor)?;
            packet.ok_or_else(|| VrtError::malformed("VRA file", "packet read returned nothing"))
        });
        self.failed = item.is_err();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ContextPacket, DataPacket};
    use crate::CifAccess;
    use anyhow::Result;
    use std::io::Cursor;

    fn memory(mode: FileMode) -> Result<VraFile<Cursor<Vec<u8>>>> {
        Ok(VraFile::from_storage(Cursor::new(Vec::new()), mode, CodecConfig::default())?)
    }

    #[test]
    fn fresh_file_is_only_a_header() -> Result<()> {
        let file = memory(FileMode::Write)?;
        assert_eq!(file.file_length(), 20);
        assert_eq!(file.begin(), file.end());
        let bytes = file.into_storage()?.into_inner();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..4], b"VRAF");
        Ok(())
    }

    #[test]
    fn append_tracks_length_and_iterates() -> Result<()> {
        let mut file = memory(FileMode::Write)?;
        let mut context = ContextPacket::new(CodecConfig::default());
        context.set_bandwidth(Some(2.0e6))?;
        let data = DataPacket::new(CodecConfig::default());
        file.append(&context)?;
        assert_eq!(file.file_length(), 20 + context.packet_length() as u64);
        file.append(&data)?;
        assert_eq!(file.file_length(), 20 + (context.packet_length() + data.packet_length()) as u64);

        let packets: Vec<AnyPacket> = file.packets().collect::<crate::Result<_>>()?;
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].as_context().and_then(|c| c.bandwidth()), Some(2.0e6));
        assert_eq!(packets[1].as_bytes(), data.as_bytes());
        assert!(file.is_file_valid());
        Ok(())
    }

    #[test]
    fn crc_covers_the_packets() -> Result<()> {
        let mut file = memory(FileMode::Write)?;
        file.append(&DataPacket::new(CodecConfig::default()))?;
        assert!(file.is_crc_valid());
        file.update_crc()?;
        assert_ne!(file.header().crc, NO_CRC);
        assert!(file.is_crc_valid());
        file.append(&DataPacket::new(CodecConfig::default()))?;
        assert!(!file.is_crc_valid());
        assert!(!file.is_file_valid());
        Ok(())
    }

    #[test]
    fn version_changes_are_range_checked() -> Result<()> {
        let mut file = memory(FileMode::Write)?;
        assert!(file.set_version(2).is_err());
        assert!(file.set_version(0).is_err());
        assert_eq!(file.version(), 1);
        file.set_version(1)?;
        Ok(())
    }

    #[test]
    fn read_mode_rejects_writes_and_bad_headers() -> Result<()> {
        let mut writer = memory(FileMode::Write)?;
        writer.append(&DataPacket::new(CodecConfig::default()))?;
        let bytes = writer.into_storage()?.into_inner();

        let mut reader = VraFile::from_storage(Cursor::new(bytes.clone()), FileMode::Read, CodecConfig::default())?;
        assert!(reader.append(&DataPacket::new(CodecConfig::default())).is_err());
        assert_eq!(reader.packets().count(), 1);

        let mut corrupt = bytes;
        corrupt[1] = b'X';
        assert!(VraFile::from_storage(Cursor::new(corrupt), FileMode::Read, CodecConfig::default()).is_err());
        Ok(())
    }

    #[test]
    fn peek_only_validates_without_decoding() -> Result<()> {
        let mut file = memory(FileMode::Write)?;
        file.append(&DataPacket::new(CodecConfig::default()))?;
        let cursor = file.begin();
        assert!(file.get_this_packet(cursor, true)?.is_none());
        assert!(file.get_this_packet(cursor, false)?.is_some());
        let next = file.goto_next_packet(cursor)?;
        assert_eq!(next, file.end());
        assert!(file.get_this_packet(next, false).is_err());
        Ok(())
    }
}
