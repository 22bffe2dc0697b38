//! Command packets and the control prologue shared with acknowledges.
//!
//! The payload opens with the control/acknowledge mode (CAM) word and a
//! message identifier, followed by the optional controllee and controller
//! identifiers announced in the CAM word. Command packets then carry a CIF
//! block of requested settings.

use super::buffer::{BIT_24, BIT_26};
use super::cif::{Attribute, CifField};
use super::context::{CifAccess, validate_block};
use super::indicator::{self, SlotSizing};
use super::{PacketBuffer, VrtPacket};
use crate::numeric::get_be;
use crate::types::PacketType;
use crate::{CodecConfig, Result, VrtError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CONTROLLEE_ENABLE: u32 = 1 << 31;
const CONTROLLEE_UUID: u32 = 1 << 30;
const CONTROLLER_ENABLE: u32 = 1 << 29;
const CONTROLLER_UUID: u32 = 1 << 28;
const PERMIT_PARTIAL: u32 = 1 << 27;
const PERMIT_WARNINGS: u32 = 1 << 26;
const PERMIT_ERRORS: u32 = 1 << 25;
const ACTION_SHIFT: u32 = 23;
const NOT_ACK_ONLY: u32 = 1 << 22;
pub(crate) const VALIDATION_ACK: u32 = 1 << 20;
pub(crate) const EXECUTION_ACK: u32 = 1 << 19;
pub(crate) const QUERY_STATE_ACK: u32 = 1 << 18;
pub(crate) const WARNINGS: u32 = 1 << 17;
pub(crate) const ERRORS: u32 = 1 << 16;
const TIMING_SHIFT: u32 = 12;

/// Prologue bytes before the identifiers: CAM word and message id.
pub(crate) const FIXED_PROLOGUE: usize = 8;

/// What the controllee should do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionMode {
    #[default]
    NoAction,
    DryRun,
    Execute,
}

impl ActionMode {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits & 0x3 {
            0 => Ok(Self::NoAction),
            1 => Ok(Self::DryRun),
            2 => Ok(Self::Execute),
            other => Err(VrtError::malformed("action mode", format!("reserved value {other}"))),
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// Controllee or controller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Number(u32),
    Uuid(Uuid),
}

impl Identifier {
    fn encoded_len(uuid: bool) -> usize {
        if uuid { 16 } else { 4 }
    }

    fn to_bytes(self) -> Vec<u8> {
        match self {
            Self::Number(n) => n.to_be_bytes().to_vec(),
            Self::Uuid(u) => u.as_bytes().to_vec(),
        }
    }

    fn read(bytes: &[u8], offset: usize, uuid: bool) -> Option<Self> {
        if uuid {
            let raw = bytes.get(offset..offset + 16)?;
            Uuid::from_slice(raw).ok().map(Self::Uuid)
        } else {
            bytes.get(offset..offset + 4).map(|b| Self::Number(get_be(b, 0)))
        }
    }

    fn is_uuid(&self) -> bool {
        matches!(self, Self::Uuid(_))
    }
}

/// Which identifier slot an edit targets.
#[derive(Clone, Copy)]
enum Party {
    Controllee,
    Controller,
}

impl Party {
    fn bits(self) -> (u32, u32) {
        match self {
            Self::Controllee => (CONTROLLEE_ENABLE, CONTROLLEE_UUID),
            Self::Controller => (CONTROLLER_ENABLE, CONTROLLER_UUID),
        }
    }
}

/// CAM word, message id and identifiers, common to commands and acknowledges.
pub trait ControlPrologue: VrtPacket {
    fn cam(&self) -> u32 {
        self.buffer().read_u32(self.buffer().payload_offset())
    }

    #[doc(hidden)]
    fn set_cam_bits(&mut self, mask: u32, on: bool) {
        let offset = self.buffer().payload_offset();
        let cam = self.cam();
        let cam = if on { cam | mask } else { cam & !mask };
        self.buffer_mut().write_u32(offset, cam);
    }

    fn message_id(&self) -> u32 {
        self.buffer().read_u32(self.buffer().payload_offset() + 4)
    }

    fn set_message_id(&mut self, id: u32) {
        let offset = self.buffer().payload_offset() + 4;
        self.buffer_mut().write_u32(offset, id);
    }

    /// Bytes from the start of the payload to the end of the identifiers.
    fn prologue_length(&self) -> usize {
        let cam = self.cam();
        let slot = |enable: u32, uuid: u32| {
            if cam & enable == 0 { 0 } else { Identifier::encoded_len(cam & uuid != 0) }
        };
        FIXED_PROLOGUE + slot(CONTROLLEE_ENABLE, CONTROLLEE_UUID) + slot(CONTROLLER_ENABLE, CONTROLLER_UUID)
    }

    fn controllee(&self) -> Option<Identifier> {
        let cam = self.cam();
        if cam & CONTROLLEE_ENABLE == 0 {
            return None;
        }
        let offset = self.buffer().payload_offset() + FIXED_PROLOGUE;
        Identifier::read(self.buffer().as_bytes(), offset, cam & CONTROLLEE_UUID != 0)
    }

    fn set_controllee(&mut self, id: Option<Identifier>) -> Result<()> {
        set_identifier(self, Party::Controllee, id)
    }

    fn controller(&self) -> Option<Identifier> {
        let cam = self.cam();
        if cam & CONTROLLER_ENABLE == 0 {
            return None;
        }
        let controllee_len = if cam & CONTROLLEE_ENABLE == 0 {
            0
        } else {
            Identifier::encoded_len(cam & CONTROLLEE_UUID != 0)
        };
        let offset = self.buffer().payload_offset() + FIXED_PROLOGUE + controllee_len;
        Identifier::read(self.buffer().as_bytes(), offset, cam & CONTROLLER_UUID != 0)
    }

    fn set_controller(&mut self, id: Option<Identifier>) -> Result<()> {
        set_identifier(self, Party::Controller, id)
    }

    fn action_mode(&self) -> Result<ActionMode> {
        ActionMode::from_bits(self.cam() >> ACTION_SHIFT)
    }

    fn set_action_mode(&mut self, mode: ActionMode) {
        let offset = self.buffer().payload_offset();
        let cam = (self.cam() & !(0x3 << ACTION_SHIFT)) | (mode.bits() << ACTION_SHIFT);
        self.buffer_mut().write_u32(offset, cam);
    }

    fn is_partial_permitted(&self) -> bool {
        self.cam() & PERMIT_PARTIAL != 0
    }

    fn set_partial_permitted(&mut self, on: bool) {
        self.set_cam_bits(PERMIT_PARTIAL, on);
    }

    fn is_warnings_permitted(&self) -> bool {
        self.cam() & PERMIT_WARNINGS != 0
    }

    fn set_warnings_permitted(&mut self, on: bool) {
        self.set_cam_bits(PERMIT_WARNINGS, on);
    }

    fn is_errors_permitted(&self) -> bool {
        self.cam() & PERMIT_ERRORS != 0
    }

    fn set_errors_permitted(&mut self, on: bool) {
        self.set_cam_bits(PERMIT_ERRORS, on);
    }

    /// Timing control code (0 ignore timestamp, 1 device, 2 late,
    /// 3 early, 4 early and late).
    fn timing_control(&self) -> u8 {
        ((self.cam() >> TIMING_SHIFT) & 0x7) as u8
    }

    fn set_timing_control(&mut self, code: u8) -> Result<()> {
        if code > 4 {
            return Err(VrtError::invalid_value("timing control", format!("{code} is reserved")));
        }
        let offset = self.buffer().payload_offset();
        let cam = (self.cam() & !(0x7 << TIMING_SHIFT)) | (u32::from(code) << TIMING_SHIFT);
        self.buffer_mut().write_u32(offset, cam);
        Ok(())
    }
}

fn set_identifier<P: ControlPrologue + ?Sized>(packet: &mut P, party: Party, id: Option<Identifier>) -> Result<()> {
    let (enable, uuid) = party.bits();
    let cam = packet.cam();
    let payload = packet.buffer().payload_offset();
    let len_of = |enabled: bool, is_uuid: bool| if enabled { Identifier::encoded_len(is_uuid) } else { 0 };
    let controllee_len = len_of(cam & CONTROLLEE_ENABLE != 0, cam & CONTROLLEE_UUID != 0);
    let offset = payload
        + FIXED_PROLOGUE
        + match party {
            Party::Controllee => 0,
            Party::Controller => controllee_len,
        };
    let old_len = len_of(cam & enable != 0, cam & uuid != 0);
    let bytes = id.map(Identifier::to_bytes).unwrap_or_default();

    packet.buffer_mut().replace_bytes(offset, old_len, &bytes)?;
    let cam = match id {
        Some(i) if i.is_uuid() => cam | enable | uuid,
        Some(_) => (cam | enable) & !uuid,
        None => cam & !(enable | uuid),
    };
    packet.buffer_mut().write_u32(payload, cam);
    Ok(())
}

/// Command packet: control prologue followed by a CIF block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    buffer: PacketBuffer,
}

impl CommandPacket {
    /// Empty control packet: zero CAM, message id 0, no fields.
    pub fn new(config: CodecConfig) -> Self {
        Self { buffer: PacketBuffer::with_payload_words(PacketType::Command, config, &[0, 0, 0]) }
    }

    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        Self::from_buffer(PacketBuffer::from_bytes(buf, config)?)
    }

    pub(crate) fn from_buffer(buffer: PacketBuffer) -> Result<Self> {
        if !buffer.packet_type().is_command() || buffer.header_bit(BIT_26) {
            return Err(VrtError::malformed("command packet", "not a control packet"));
        }
        let packet = Self { buffer };
        if packet.payload_length() < FIXED_PROLOGUE {
            return Err(VrtError::malformed("command packet", "payload shorter than the control prologue"));
        }
        indicator::scan(packet.buffer.as_bytes(), packet.block_start(), SlotSizing::FieldWidth)
            .map_err(|e| VrtError::malformed("command packet", e.to_string()))?;
        Ok(packet)
    }

    fn block_start(&self) -> usize {
        self.buffer.payload_offset() + self.prologue_length()
    }

    /// Header bit 24: the packet cancels an earlier command.
    pub fn is_cancellation(&self) -> bool {
        self.buffer.header_bit(BIT_24)
    }

    pub fn set_cancellation(&mut self, on: bool) {
        self.buffer.set_header_bit(BIT_24, on);
    }

    pub fn is_not_ack_only(&self) -> bool {
        self.cam() & NOT_ACK_ONLY != 0
    }

    pub fn set_not_ack_only(&mut self, on: bool) {
        self.set_cam_bits(NOT_ACK_ONLY, on);
    }

    pub fn is_validation_ack_requested(&self) -> bool {
        self.cam() & VALIDATION_ACK != 0
    }

    pub fn set_validation_ack_requested(&mut self, on: bool) {
        self.set_cam_bits(VALIDATION_ACK, on);
    }

    pub fn is_execution_ack_requested(&self) -> bool {
        self.cam() & EXECUTION_ACK != 0
    }

    pub fn set_execution_ack_requested(&mut self, on: bool) {
        self.set_cam_bits(EXECUTION_ACK, on);
    }

    pub fn is_query_state_ack_requested(&self) -> bool {
        self.cam() & QUERY_STATE_ACK != 0
    }

    pub fn set_query_state_ack_requested(&mut self, on: bool) {
        self.set_cam_bits(QUERY_STATE_ACK, on);
    }

    pub fn is_warnings_requested(&self) -> bool {
        self.cam() & WARNINGS != 0
    }

    pub fn set_warnings_requested(&mut self, on: bool) {
        self.set_cam_bits(WARNINGS, on);
    }

    pub fn is_errors_requested(&self) -> bool {
        self.cam() & ERRORS != 0
    }

    pub fn set_errors_requested(&mut self, on: bool) {
        self.set_cam_bits(ERRORS, on);
    }

    /// Control fields present, in wire order.
    pub fn fields(&self) -> Vec<CifField> {
        indicator::scan(self.buffer.as_bytes(), self.block_start(), SlotSizing::FieldWidth)
            .map(|layout| layout.fields)
            .unwrap_or_default()
    }
}

impl CifAccess for CommandPacket {
    fn field_bytes(&self, field: CifField) -> Option<&[u8]> {
        indicator::slot_bytes(
            self.buffer.as_bytes(),
            self.block_start(),
            SlotSizing::FieldWidth,
            field,
            Attribute::CurrentValue,
        )
    }

    fn set_field_bytes(&mut self, field: CifField, value: Option<&[u8]>) -> Result<()> {
        let start = self.block_start();
        indicator::set_field(&mut self.buffer, start, SlotSizing::FieldWidth, field, value)
    }
}

impl VrtPacket for CommandPacket {
    fn buffer(&self) -> &PacketBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut PacketBuffer {
        &mut self.buffer
    }

    fn supports_packet_type(&self, packet_type: PacketType) -> bool {
        packet_type.is_command()
    }

    fn validate_payload(&self, strict: bool) -> Result<()> {
        if self.payload_length() < self.prologue_length() {
            return Err(VrtError::validation("command packet", "payload shorter than the control prologue"));
        }
        validate_block(&self.buffer, self.block_start(), strict, "command packet")
    }
}

impl ControlPrologue for CommandPacket {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeStamp;
    use anyhow::Result;

    #[test]
    fn new_command_is_a_minimal_valid_packet() {
        let p = CommandPacket::new(CodecConfig::default());
        assert_eq!(p.packet_type(), PacketType::Command);
        assert_eq!(p.stream_identifier(), Some(0));
        assert_eq!(p.payload_length(), 12);
        assert_eq!(p.prologue_length(), 8);
        assert_eq!(p.action_mode().ok(), Some(ActionMode::NoAction));
        assert!(p.is_packet_valid());
    }

    #[test]
    fn cam_flags_are_independent() {
        let mut p = CommandPacket::new(CodecConfig::default());
        p.set_action_mode(ActionMode::Execute);
        p.set_partial_permitted(true);
        p.set_execution_ack_requested(true);
        p.set_errors_requested(true);
        assert_eq!(p.cam(), (2 << 23) | (1 << 27) | (1 << 19) | (1 << 16));
        p.set_partial_permitted(false);
        assert_eq!(p.action_mode().ok(), Some(ActionMode::Execute));
        assert!(p.is_execution_ack_requested());
        assert!(!p.is_validation_ack_requested());
        assert!(p.set_timing_control(5).is_err());
    }

    #[test]
    fn identifiers_resize_the_prologue() -> Result<()> {
        let mut p = CommandPacket::new(CodecConfig::default());
        p.set_message_id(0x1234);
        p.set_sample_rate(Some(1.0e6))?;
        let uuid = Uuid::from_u128(0xFEED_F00D);

        p.set_controller(Some(Identifier::Number(7)))?;
        p.set_controllee(Some(Identifier::Uuid(uuid)))?;
        assert_eq!(p.prologue_length(), 8 + 16 + 4);
        assert_eq!(p.controllee(), Some(Identifier::Uuid(uuid)));
        assert_eq!(p.controller(), Some(Identifier::Number(7)));
        assert_eq!(p.sample_rate(), Some(1.0e6));

        p.set_controllee(Some(Identifier::Number(9)))?;
        assert_eq!(p.prologue_length(), 8 + 4 + 4);
        assert_eq!(p.controller(), Some(Identifier::Number(7)));

        p.set_controllee(None)?;
        p.set_controller(None)?;
        assert_eq!(p.cam(), 0);
        assert_eq!(p.payload_length(), 8 + 4 + 8);
        assert_eq!(p.message_id(), 0x1234);
        assert_eq!(p.sample_rate(), Some(1.0e6));
        assert!(p.is_packet_valid());
        Ok(())
    }

    #[test]
    fn cancellation_is_a_header_flag() -> Result<()> {
        let mut p = CommandPacket::new(CodecConfig::default());
        p.set_cancellation(true);
        p.set_time_stamp(&TimeStamp::utc(10, 0)?)?;
        assert!(p.is_cancellation());
        let parsed = CommandPacket::from_bytes(p.as_bytes(), CodecConfig::default())?;
        assert!(parsed.is_cancellation());
        assert_eq!(parsed, p);
        Ok(())
    }

    #[test]
    fn truncated_prologue_is_malformed() {
        let mut bytes = CommandPacket::new(CodecConfig::default()).as_bytes().to_vec();
        bytes.truncate(12);
        bytes[3] = 3;
        assert!(CommandPacket::from_bytes(&bytes, CodecConfig::default()).is_err());
    }
}
