//! Acknowledge packets.
//!
//! Layout after the control prologue: an optional warning block (WIF), an
//! optional error block (EIF) and an optional free-form message running to
//! the end of the payload. Each block is an indicator block whose slots are
//! single [`ResponseCode`] words, one per announced field and enabled
//! attribute.

use super::buffer::BIT_26;
use super::cif::{Attribute, CifField, IndicatorWord};
use super::command::{
    ControlPrologue, ERRORS, EXECUTION_ACK, FIXED_PROLOGUE, QUERY_STATE_ACK, VALIDATION_ACK, WARNINGS,
};
use super::indicator::{self, Layout, SlotSizing};
use super::{PacketBuffer, VrtPacket};
use crate::types::{PacketType, ResponseCode};
use crate::{CodecConfig, Result, VrtError};
use serde::{Deserialize, Serialize};
use tracing::debug;

const PARTIAL_ACTION: u32 = 1 << 11;
const SCHEDULED_OR_EXECUTED: u32 = 1 << 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Warnings,
    Errors,
}

impl Block {
    fn cam_bit(self) -> u32 {
        match self {
            Self::Warnings => WARNINGS,
            Self::Errors => ERRORS,
        }
    }
}

/// Scanned positions of both blocks and the message.
struct Blocks {
    warnings: Option<Layout>,
    errors: Option<Layout>,
    /// First byte after the prologue.
    prologue_end: usize,
    /// First byte of the free-form message region.
    message_start: usize,
}

impl Blocks {
    fn get(&self, block: Block) -> Option<&Layout> {
        match block {
            Block::Warnings => self.warnings.as_ref(),
            Block::Errors => self.errors.as_ref(),
        }
    }

    fn present(&self) -> impl Iterator<Item = (Block, &Layout)> {
        [(Block::Warnings, &self.warnings), (Block::Errors, &self.errors)]
            .into_iter()
            .filter_map(|(b, l)| l.as_ref().map(|l| (b, l)))
    }
}

/// Text carried after the response blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeFormMessage {
    text: String,
    size: usize,
}

impl FreeFormMessage {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes occupied on the wire, terminator and padding included.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Acknowledge packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgePacket {
    buffer: PacketBuffer,
}

impl AcknowledgePacket {
    /// Empty acknowledge: zero CAM, message id 0, no responses.
    pub fn new(config: CodecConfig) -> Self {
        let mut buffer = PacketBuffer::with_payload_words(PacketType::Command, config, &[0, 0]);
        buffer.set_header_bit(BIT_26, true);
        Self { buffer }
    }

    pub fn from_bytes(buf: &[u8], config: CodecConfig) -> Result<Self> {
        Self::from_buffer(PacketBuffer::from_bytes(buf, config)?)
    }

    pub(crate) fn from_buffer(buffer: PacketBuffer) -> Result<Self> {
        if !buffer.packet_type().is_command() || !buffer.header_bit(BIT_26) {
            return Err(VrtError::malformed("acknowledge packet", "acknowledge bit not set"));
        }
        if buffer.payload_length() < FIXED_PROLOGUE {
            return Err(VrtError::malformed("acknowledge packet", "payload shorter than the control prologue"));
        }
        let packet = Self { buffer };
        packet.blocks().map_err(|e| VrtError::malformed("acknowledge packet", e.to_string()))?;
        Ok(packet)
    }

    fn blocks(&self) -> Result<Blocks> {
        let bytes = self.buffer.as_bytes();
        // the CAM word lives in the fixed prologue
        if self.buffer.payload_length() < FIXED_PROLOGUE {
            return Err(VrtError::malformed("acknowledge packet", "payload shorter than the control prologue"));
        }
        let prologue_end = self.buffer.payload_offset() + self.prologue_length();
        if prologue_end > bytes.len() {
            return Err(VrtError::malformed("acknowledge packet", "payload shorter than the control prologue"));
        }
        let cam = self.cam();
        let warnings = (cam & WARNINGS != 0)
            .then(|| indicator::scan(bytes, prologue_end, SlotSizing::ResponseWord))
            .transpose()?;
        let errors_start = warnings.as_ref().map_or(prologue_end, |l| l.end);
        let errors = (cam & ERRORS != 0)
            .then(|| indicator::scan(bytes, errors_start, SlotSizing::ResponseWord))
            .transpose()?;
        let message_start = errors.as_ref().map_or(errors_start, |l| l.end);
        Ok(Blocks { warnings, errors, prologue_end, message_start })
    }

    // Acknowledge kind and outcome flags

    pub fn is_validation(&self) -> bool {
        self.cam() & VALIDATION_ACK != 0
    }

    pub fn set_validation(&mut self, on: bool) {
        self.set_cam_bits(VALIDATION_ACK, on);
    }

    pub fn is_execution(&self) -> bool {
        self.cam() & EXECUTION_ACK != 0
    }

    pub fn set_execution(&mut self, on: bool) {
        self.set_cam_bits(EXECUTION_ACK, on);
    }

    pub fn is_query_state(&self) -> bool {
        self.cam() & QUERY_STATE_ACK != 0
    }

    pub fn set_query_state(&mut self, on: bool) {
        self.set_cam_bits(QUERY_STATE_ACK, on);
    }

    /// Only part of the requested action was carried out.
    pub fn is_partial_action(&self) -> bool {
        self.cam() & PARTIAL_ACTION != 0
    }

    pub fn set_partial_action(&mut self, on: bool) {
        self.set_cam_bits(PARTIAL_ACTION, on);
    }

    pub fn is_scheduled_or_executed(&self) -> bool {
        self.cam() & SCHEDULED_OR_EXECUTED != 0
    }

    pub fn set_scheduled_or_executed(&mut self, on: bool) {
        self.set_cam_bits(SCHEDULED_OR_EXECUTED, on);
    }

    // Response blocks

    pub fn warnings_generated(&self) -> bool {
        self.cam() & WARNINGS != 0
    }

    /// Add an empty warning block or drop the existing one with its responses.
    pub fn set_warnings_generated(&mut self, on: bool) -> Result<()> {
        self.set_block_present(Block::Warnings, on)
    }

    pub fn errors_generated(&self) -> bool {
        self.cam() & ERRORS != 0
    }

    pub fn set_errors_generated(&mut self, on: bool) -> Result<()> {
        self.set_block_present(Block::Errors, on)
    }

    fn set_block_present(&mut self, block: Block, on: bool) -> Result<()> {
        let blocks = self.blocks()?;
        match (blocks.get(block), on) {
            (Some(layout), false) => {
                self.buffer.remove_bytes(layout.start, layout.end - layout.start);
                self.set_cam_bits(block.cam_bit(), false);
            }
            (None, true) => {
                // a new block inherits the attribute set of its sibling
                let cif7 = blocks.present().find_map(|(_, l)| l.word(IndicatorWord::Cif7));
                let mut bytes = Vec::with_capacity(8);
                match cif7 {
                    Some(word) => {
                        let if0 = IndicatorWord::Cif7.enable_mask().unwrap_or(0);
                        bytes.extend_from_slice(&if0.to_be_bytes());
                        bytes.extend_from_slice(&word.to_be_bytes());
                    }
                    None => bytes.extend_from_slice(&[0; 4]),
                }
                let at = match (block, &blocks.warnings) {
                    (Block::Warnings, _) | (Block::Errors, None) => blocks.prologue_end,
                    (Block::Errors, Some(warnings)) => warnings.end,
                };
                self.buffer.insert_bytes(at, &bytes)?;
                self.set_cam_bits(block.cam_bit(), true);
            }
            _ => {}
        }
        Ok(())
    }

    fn response(&self, block: Block, field: CifField, attribute: Attribute) -> Option<ResponseCode> {
        let layout = self.blocks().ok()?;
        let start = layout.get(block)?.start;
        indicator::slot_bytes(self.buffer.as_bytes(), start, SlotSizing::ResponseWord, field, attribute)
            .map(|b| ResponseCode(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
    }

    fn set_response(&mut self, block: Block, field: CifField, code: Option<ResponseCode>) -> Result<()> {
        if code.is_some() {
            self.set_block_present(block, true)?;
        }
        let Some(start) = self.blocks()?.get(block).map(|l| l.start) else {
            return Ok(());
        };
        let bytes = code.map(|c| c.value().to_be_bytes());
        indicator::set_field(&mut self.buffer, start, SlotSizing::ResponseWord, field, bytes.as_ref().map(|b| &b[..]))
    }

    fn set_attribute_response(
        &mut self,
        block: Block,
        field: CifField,
        attribute: Attribute,
        code: ResponseCode,
    ) -> Result<()> {
        let start = self.blocks()?.get(block).map(|l| l.start).ok_or_else(|| {
            VrtError::unsupported("set attribute response", format!("no {block:?} block in this packet"))
        })?;
        indicator::set_slot(&mut self.buffer, start, SlotSizing::ResponseWord, field, attribute, &code.value().to_be_bytes())
    }

    fn block_fields(&self, block: Block) -> Vec<CifField> {
        self.blocks().ok().and_then(|b| b.get(block).map(|l| l.fields.clone())).unwrap_or_default()
    }

    /// Current-value warning for `field`.
    pub fn warning(&self, field: CifField) -> Option<ResponseCode> {
        self.response(Block::Warnings, field, Attribute::CurrentValue)
    }

    /// Set or clear a warning. Setting one turns on the warning block.
    pub fn set_warning(&mut self, field: CifField, code: Option<ResponseCode>) -> Result<()> {
        self.set_response(Block::Warnings, field, code)
    }

    pub fn warning_attribute(&self, field: CifField, attribute: Attribute) -> Option<ResponseCode> {
        self.response(Block::Warnings, field, attribute)
    }

    pub fn set_warning_attribute(&mut self, field: CifField, attribute: Attribute, code: ResponseCode) -> Result<()> {
        self.set_attribute_response(Block::Warnings, field, attribute, code)
    }

    pub fn warning_fields(&self) -> Vec<CifField> {
        self.block_fields(Block::Warnings)
    }

    pub fn error(&self, field: CifField) -> Option<ResponseCode> {
        self.response(Block::Errors, field, Attribute::CurrentValue)
    }

    /// Set or clear an error. Setting one turns on the error block.
    pub fn set_error(&mut self, field: CifField, code: Option<ResponseCode>) -> Result<()> {
        self.set_response(Block::Errors, field, code)
    }

    pub fn error_attribute(&self, field: CifField, attribute: Attribute) -> Option<ResponseCode> {
        self.response(Block::Errors, field, attribute)
    }

    pub fn set_error_attribute(&mut self, field: CifField, attribute: Attribute, code: ResponseCode) -> Result<()> {
        self.set_attribute_response(Block::Errors, field, attribute, code)
    }

    pub fn error_fields(&self) -> Vec<CifField> {
        self.block_fields(Block::Errors)
    }

    // CIF7, applied to every present block

    /// Enabled attributes, or `None` when the blocks carry no IF7 word.
    pub fn cif7_attributes(&self) -> Option<Vec<Attribute>> {
        let blocks = self.blocks().ok()?;
        blocks.present().find_map(|(_, l)| l.word(IndicatorWord::Cif7)).map(Attribute::from_word)
    }

    fn present_blocks(&self, operation: &str) -> Result<Vec<Block>> {
        let present: Vec<Block> = self.blocks()?.present().map(|(b, _)| b).collect();
        if present.is_empty() {
            return Err(VrtError::unsupported(
                operation.to_string(),
                "no warning or error block; enable warnings or errors first",
            ));
        }
        Ok(present)
    }

    fn block_start(&self, block: Block) -> Result<usize> {
        self.blocks()?
            .get(block)
            .map(|l| l.start)
            .ok_or_else(|| VrtError::validation("acknowledge packet", format!("{block:?} block vanished")))
    }

    pub fn add_cif7(&mut self) -> Result<()> {
        let present = self.present_blocks("add_cif7")?;
        let missing = self.blocks()?.present().filter(|(_, l)| l.word(IndicatorWord::Cif7).is_none()).count();
        self.buffer.check_growth(4 * missing)?;
        for block in present {
            let start = self.block_start(block)?;
            indicator::add_cif7(&mut self.buffer, start, SlotSizing::ResponseWord)?;
        }
        Ok(())
    }

    pub fn remove_cif7(&mut self) -> Result<()> {
        for block in self.present_blocks("remove_cif7")? {
            let start = self.block_start(block)?;
            indicator::remove_cif7(&mut self.buffer, start, SlotSizing::ResponseWord)?;
        }
        Ok(())
    }

    /// Toggle one attribute in every block; each announced field gains or
    /// loses one response word per block.
    pub fn set_cif7_attribute(&mut self, attribute: Attribute, enabled: bool) -> Result<()> {
        let present = self.present_blocks("set_cif7_attribute")?;
        let mut growth = 0;
        for block in &present {
            let start = self.block_start(*block)?;
            growth +=
                indicator::attribute_growth(self.buffer.as_bytes(), start, SlotSizing::ResponseWord, attribute, enabled)?;
        }
        self.buffer.check_growth(growth)?;
        for block in present {
            let start = self.block_start(block)?;
            indicator::set_attribute(&mut self.buffer, start, SlotSizing::ResponseWord, attribute, enabled)?;
        }
        debug!("Acknowledge CIF7 {:?} set to {}, payload now {} bytes", attribute, enabled, self.payload_length());
        Ok(())
    }

    // Free-form message

    pub fn has_free_form_message(&self) -> bool {
        self.free_form_message().is_some_and(|m| !m.text.is_empty())
    }

    pub fn free_form_message(&self) -> Option<FreeFormMessage> {
        let start = self.blocks().ok()?.message_start;
        let region = self.buffer.as_bytes().get(start..)?;
        if region.is_empty() {
            return None;
        }
        let end = region.iter().position(|b| *b == 0).unwrap_or(region.len());
        Some(FreeFormMessage { text: String::from_utf8_lossy(&region[..end]).into_owned(), size: region.len() })
    }

    /// Replace the message; an empty string removes it.
    pub fn set_free_form_message(&mut self, text: &str) -> Result<()> {
        if text.contains('\0') {
            return Err(VrtError::invalid_value("free-form message", "contains a NUL character"));
        }
        let start = self.blocks()?.message_start;
        let old_len = self.buffer.as_bytes().len() - start;
        let mut bytes = Vec::new();
        if !text.is_empty() {
            bytes.extend_from_slice(text.as_bytes());
            bytes.resize((text.len() + 1).next_multiple_of(4), 0);
        }
        self.buffer.replace_bytes(start, old_len, &bytes)
    }
}

impl VrtPacket for AcknowledgePacket {
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
        let blocks = self.blocks().map_err(|e| VrtError::validation("acknowledge packet", e.to_string()))?;
        if strict {
            for (block, layout) in blocks.present() {
                if let Some((word, bits)) = layout.reserved_bits() {
                    return Err(VrtError::validation(
                        "acknowledge packet",
                        format!("reserved {word:?} bits {bits:#010x} set in the {block:?} block"),
                    ));
                }
            }
            let region = &self.buffer.as_bytes()[blocks.message_start..];
            if !region.is_empty() && !region.contains(&0) {
                return Err(VrtError::validation("acknowledge packet", "free-form message is not NUL-terminated"));
            }
        }
        Ok(())
    }
}

impl ControlPrologue for AcknowledgePacket {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn new_acknowledge_has_only_the_prologue() {
        let ack = AcknowledgePacket::new(CodecConfig::default());
        assert!(ack.buffer().header_bit(BIT_26));
        assert_eq!(ack.payload_length(), 8);
        assert!(!ack.warnings_generated());
        assert!(ack.free_form_message().is_none());
        assert!(ack.is_packet_valid());
    }

    #[test]
    fn payload_without_a_prologue_is_malformed() {
        // header + stream id, acknowledge bit set, empty payload
        let bytes = [0x64, 0, 0, 2, 0, 0, 0, 0];
        let err = AcknowledgePacket::from_bytes(&bytes, CodecConfig::default());
        assert!(matches!(err, Err(VrtError::MalformedInput { .. })));

        // one word of payload is still short of CAM plus message id
        let bytes = [0x64, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(AcknowledgePacket::from_bytes(&bytes, CodecConfig::default()).is_err());
    }

    #[test]
    fn warning_then_error_blocks_are_ordered() -> Result<()> {
        let mut ack = AcknowledgePacket::new(CodecConfig::default());
        ack.set_error(CifField::Bandwidth, Some(ResponseCode::DEVICE_FAILURE))?;
        ack.set_warning(CifField::Gain, Some(ResponseCode::DISTORTION))?;
        let base = ack.buffer().payload_offset() + 8;
        // WIF0, gain warning, EIF0, bandwidth error
        assert_eq!(ack.buffer().read_u32(base), CifField::Gain.mask());
        assert_eq!(ack.buffer().read_u32(base + 4), ResponseCode::DISTORTION.value());
        assert_eq!(ack.buffer().read_u32(base + 8), CifField::Bandwidth.mask());
        assert_eq!(ack.buffer().read_u32(base + 12), ResponseCode::DEVICE_FAILURE.value());
        assert_eq!(ack.warning(CifField::Gain), Some(ResponseCode::DISTORTION));
        assert_eq!(ack.error(CifField::Bandwidth), Some(ResponseCode::DEVICE_FAILURE));
        assert_eq!(ack.warning(CifField::Bandwidth), None);

        ack.set_warnings_generated(false)?;
        assert_eq!(ack.payload_length(), 16);
        assert_eq!(ack.error(CifField::Bandwidth), Some(ResponseCode::DEVICE_FAILURE));
        Ok(())
    }

    #[test]
    fn clearing_a_response_keeps_the_block() -> Result<()> {
        let mut ack = AcknowledgePacket::new(CodecConfig::default());
        ack.set_warning(CifField::SampleRate, Some(ResponseCode::PARAM_OUT_OF_RANGE))?;
        ack.set_warning(CifField::SampleRate, None)?;
        assert!(ack.warnings_generated());
        assert!(ack.warning_fields().is_empty());
        assert_eq!(ack.payload_length(), 12);
        ack.set_error(CifField::SampleRate, None)?;
        assert!(!ack.errors_generated());
        Ok(())
    }

    #[test]
    fn cif7_applies_to_every_block() -> Result<()> {
        let mut ack = AcknowledgePacket::new(CodecConfig::default());
        assert!(ack.add_cif7().is_err());
        ack.set_warning(CifField::SampleRate, Some(ResponseCode::PARAM_OUT_OF_RANGE))?;
        ack.set_error(CifField::Gain, Some(ResponseCode::DEVICE_FAILURE))?;
        ack.set_cif7_attribute(Attribute::MaxValue, true)?;
        // each block: IF0, IF7, current, max
        assert_eq!(ack.payload_length(), 8 + 16 + 16);
        assert_eq!(ack.warning_attribute(CifField::SampleRate, Attribute::MaxValue), Some(ResponseCode::NONE));
        ack.set_error_attribute(CifField::Gain, Attribute::MaxValue, ResponseCode::DISTORTION)?;
        assert_eq!(ack.error_attribute(CifField::Gain, Attribute::MaxValue), Some(ResponseCode::DISTORTION));
        assert_eq!(ack.error(CifField::Gain), Some(ResponseCode::DEVICE_FAILURE));

        ack.remove_cif7()?;
        assert_eq!(ack.payload_length(), 8 + 8 + 8);
        assert_eq!(ack.cif7_attributes(), None);
        Ok(())
    }

    #[test]
    fn new_block_copies_sibling_attributes() -> Result<()> {
        let mut ack = AcknowledgePacket::new(CodecConfig::default());
        ack.set_warnings_generated(true)?;
        ack.set_cif7_attribute(Attribute::Average, true)?;
        ack.set_error(CifField::Bandwidth, Some(ResponseCode::ERRONEOUS_FIELD))?;
        assert_eq!(ack.error_attribute(CifField::Bandwidth, Attribute::Average), Some(ResponseCode::NONE));
        assert_eq!(ack.cif7_attributes(), Some(vec![Attribute::CurrentValue, Attribute::Average]));
        Ok(())
    }

    #[test]
    fn free_form_message_is_padded() -> Result<()> {
        let mut ack = AcknowledgePacket::new(CodecConfig::default());
        ack.set_free_form_message("abcd")?;
        let message = ack.free_form_message().ok_or_else(|| anyhow::anyhow!("message missing"))?;
        assert_eq!(message.text(), "abcd");
        assert_eq!(message.size(), 8);
        assert!(ack.has_free_form_message());

        // the message follows blocks added later
        ack.set_warning(CifField::Gain, Some(ResponseCode::DISTORTION))?;
        assert_eq!(ack.free_form_message().map(|m| m.text().to_string()), Some("abcd".to_string()));

        ack.set_free_form_message("abc")?;
        assert_eq!(ack.free_form_message().map(|m| m.size()), Some(4));
        ack.set_free_form_message("")?;
        assert!(!ack.has_free_form_message());
        assert!(ack.set_free_form_message("a\0b").is_err());
        assert!(ack.is_packet_valid());
        Ok(())
    }

    #[test]
    fn parsing_requires_the_acknowledge_bit() -> Result<()> {
        let mut ack = AcknowledgePacket::new(CodecConfig::default());
        ack.set_warning(CifField::Gain, Some(ResponseCode::DISTORTION))?;
        let parsed = AcknowledgePacket::from_bytes(ack.as_bytes(), CodecConfig::default())?;
        assert_eq!(parsed, ack);

        let command = super::super::CommandPacket::new(CodecConfig::default());
        assert!(AcknowledgePacket::from_bytes(command.as_bytes(), CodecConfig::default()).is_err());
        Ok(())
    }
}
