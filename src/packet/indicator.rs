//! Indicator-block layout engine.
//!
//! A block is `[IF0][IF1?][IF2?][IF3?][IF7?]` followed by one slot per enabled
//! attribute of every announced field, fields in table order. Without an IF7
//! word every field has exactly one (current value) slot.
//!
//! Every edit rescans the block, splices whole slots at their canonical
//! position and then rewrites the indicator words, so the final bytes depend
//! only on which fields and attributes are set, never on call order.

use super::cif::{Attribute, CifField, FIELD_TABLE, FieldSpec, IndicatorWord};
use super::PacketBuffer;
use crate::numeric::{try_unpack, ByteOrder};
use crate::{Result, VrtError};
use tracing::trace;

/// CIF0 bit 31: context field change indicator.
pub(crate) const CHANGE_INDICATOR: u32 = 1 << 31;

/// How large one attribute slot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotSizing {
    /// Context and command fields: the field's own width.
    FieldWidth,
    /// Acknowledge responses: one word per field and attribute.
    ResponseWord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub field: CifField,
    pub attribute: Attribute,
    pub offset: usize,
    pub len: usize,
}

/// Result of scanning one block.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub start: usize,
    words: [Option<u32>; 5],
    pub attributes: Vec<Attribute>,
    pub fields: Vec<CifField>,
    pub slots: Vec<Slot>,
    pub end: usize,
}

impl Layout {
    pub fn word(&self, word: IndicatorWord) -> Option<u32> {
        self.words[word as usize]
    }

    /// Byte offset of `word`, counting only the words present before it.
    fn word_offset(&self, word: IndicatorWord) -> usize {
        let before = IndicatorWord::ALL
            .iter()
            .take_while(|w| **w != word)
            .filter(|w| self.word(**w).is_some())
            .count();
        self.start + 4 * before
    }

    pub fn is_present(&self, field: CifField) -> bool {
        self.fields.contains(&field)
    }

    pub fn slot(&self, field: CifField, attribute: Attribute) -> Option<&Slot> {
        self.slots.iter().find(|s| s.field == field && s.attribute == attribute)
    }

    fn field_span(&self, field: CifField) -> Option<(usize, usize)> {
        let mut slots = self.slots.iter().filter(|s| s.field == field);
        let first = slots.next()?;
        let last = slots.last().unwrap_or(first);
        Some((first.offset, last.offset + last.len))
    }

    /// Where a slot for (`field`, `attribute`) belongs.
    fn insertion_point(&self, field: CifField, attribute: Attribute) -> usize {
        self.slots
            .iter()
            .find(|s| s.field > field || (s.field == field && s.attribute > attribute))
            .map(|s| s.offset)
            .unwrap_or(self.end)
    }

    /// First indicator bit set that no field, attribute or enable flag claims.
    pub fn reserved_bits(&self) -> Option<(IndicatorWord, u32)> {
        IndicatorWord::ALL.into_iter().find_map(|word| {
            let value = self.word(word)?;
            let stray = value & !known_bits(word);
            (stray != 0).then_some((word, stray))
        })
    }
}

fn known_bits(word: IndicatorWord) -> u32 {
    match word {
        IndicatorWord::Cif7 => Attribute::ALL.iter().fold(0, |acc, a| acc | a.mask()),
        IndicatorWord::Cif0 => {
            let enables = IndicatorWord::ALL.iter().filter_map(|w| w.enable_mask()).fold(0, |a, m| a | m);
            table_bits(word) | enables | CHANGE_INDICATOR
        }
        _ => table_bits(word),
    }
}

fn table_bits(word: IndicatorWord) -> u32 {
    FIELD_TABLE.iter().filter(|s| s.word == word).fold(0, |acc, s| acc | s.mask())
}

fn slot_len(spec: &FieldSpec, attribute: Attribute, bytes: &[u8], offset: usize, sizing: SlotSizing) -> Result<usize> {
    match sizing {
        SlotSizing::ResponseWord => Ok(4),
        SlotSizing::FieldWidth if attribute.is_single_word() => Ok(4),
        SlotSizing::FieldWidth => spec.size.measure(bytes, offset),
    }
}

fn empty_slot(spec: &FieldSpec, attribute: Attribute, sizing: SlotSizing) -> Vec<u8> {
    match sizing {
        SlotSizing::ResponseWord => vec![0; 4],
        SlotSizing::FieldWidth if attribute.is_single_word() => vec![0; 4],
        SlotSizing::FieldWidth => spec.size.empty_value(),
    }
}

/// Scan the block starting at `start`.
pub(crate) fn scan(bytes: &[u8], start: usize, sizing: SlotSizing) -> Result<Layout> {
    let if0: u32 = try_unpack(bytes, start, ByteOrder::BigEndian)?;
    let mut words = [None; 5];
    words[0] = Some(if0);
    let mut offset = start + 4;
    for word in &IndicatorWord::ALL[1..] {
        if word.enable_mask().is_some_and(|mask| if0 & mask != 0) {
            words[*word as usize] = Some(try_unpack::<u32>(bytes, offset, ByteOrder::BigEndian)?);
            offset += 4;
        }
    }

    let attributes = match words[IndicatorWord::Cif7 as usize] {
        Some(cif7) => Attribute::from_word(cif7),
        None => vec![Attribute::CurrentValue],
    };

    let mut fields = Vec::new();
    let mut slots = Vec::new();
    for spec in FIELD_TABLE {
        let Some(word) = words[spec.word as usize] else { continue };
        if word & spec.mask() == 0 {
            continue;
        }
        fields.push(spec.field);
        for attribute in &attributes {
            let len = slot_len(spec, *attribute, bytes, offset, sizing)?;
            slots.push(Slot { field: spec.field, attribute: *attribute, offset, len });
            offset += len;
        }
    }

    if offset > bytes.len() {
        return Err(VrtError::malformed(
            "indicator block",
            format!("fields end at byte {offset}, packet holds {}", bytes.len()),
        ));
    }
    Ok(Layout { start, words, attributes, fields, slots, end: offset })
}

fn check_value(spec: &FieldSpec, attribute: Attribute, value: &[u8], sizing: SlotSizing) -> Result<()> {
    let expected = match sizing {
        SlotSizing::ResponseWord => 4,
        SlotSizing::FieldWidth if attribute.is_single_word() => 4,
        SlotSizing::FieldWidth => {
            if value.len() % 4 != 0 {
                return Err(VrtError::invalid_value(spec.name, "value is not a whole number of words"));
            }
            spec.size.measure(value, 0)?
        }
    };
    if value.len() != expected {
        return Err(VrtError::invalid_value(
            spec.name,
            format!("expected {expected} bytes, found {}", value.len()),
        ));
    }
    Ok(())
}

fn write_word(buf: &mut PacketBuffer, layout: &Layout, word: IndicatorWord, value: u32) {
    buf.write_u32(layout.word_offset(word), value);
}

/// Insert an absent indicator word and set its enable bit in IF0.
fn insert_word(buf: &mut PacketBuffer, layout: &Layout, word: IndicatorWord, value: u32) -> Result<()> {
    let mask = word.enable_mask().unwrap_or(0);
    buf.insert_bytes(layout.word_offset(word), &value.to_be_bytes())?;
    let if0 = buf.read_u32(layout.start);
    buf.write_u32(layout.start, if0 | mask);
    Ok(())
}

fn remove_word(buf: &mut PacketBuffer, layout: &Layout, word: IndicatorWord) {
    let mask = word.enable_mask().unwrap_or(0);
    buf.remove_bytes(layout.word_offset(word), 4);
    let if0 = buf.read_u32(layout.start);
    buf.write_u32(layout.start, if0 & !mask);
}

/// Set (`Some`) or remove (`None`) the current value of `field`.
///
/// A new field gets an empty slot for every other enabled attribute. Removing
/// the last field of CIF1, CIF2 or CIF3 drops that word.
pub(crate) fn set_field(
    buf: &mut PacketBuffer,
    start: usize,
    sizing: SlotSizing,
    field: CifField,
    value: Option<&[u8]>,
) -> Result<()> {
    let layout = scan(buf.as_bytes(), start, sizing)?;
    let spec = field.spec();

    let Some(value) = value else {
        if !layout.is_present(field) {
            return Ok(());
        }
        if let Some((from, to)) = layout.field_span(field) {
            buf.remove_bytes(from, to - from);
        }
        let word = layout.word(spec.word).unwrap_or(0) & !spec.mask();
        if word == 0 && spec.word != IndicatorWord::Cif0 {
            remove_word(buf, &layout, spec.word);
        } else {
            write_word(buf, &layout, spec.word, word);
        }
        trace!("Removed {} at block offset {}", spec.name, start);
        return Ok(());
    };

    if !layout.attributes.contains(&Attribute::CurrentValue) {
        return Err(VrtError::unsupported(
            "set field",
            format!("{} has no current value slot while CIF7 disables it", spec.name),
        ));
    }
    check_value(spec, Attribute::CurrentValue, value, sizing)?;

    if let Some(slot) = layout.slot(field, Attribute::CurrentValue) {
        return buf.replace_bytes(slot.offset, slot.len, value);
    }

    let mut bytes = Vec::new();
    for attribute in &layout.attributes {
        if *attribute == Attribute::CurrentValue {
            bytes.extend_from_slice(value);
        } else {
            bytes.extend(empty_slot(spec, *attribute, sizing));
        }
    }
    let word = layout.word(spec.word);
    buf.check_growth(bytes.len() + if word.is_some() { 0 } else { 4 })?;
    buf.insert_bytes(layout.insertion_point(field, Attribute::CurrentValue), &bytes)?;
    match word {
        Some(w) => write_word(buf, &layout, spec.word, w | spec.mask()),
        None => insert_word(buf, &layout, spec.word, spec.mask())?,
    }
    trace!("Inserted {} ({} bytes)", spec.name, bytes.len());
    Ok(())
}

/// Bytes of one attribute slot.
pub(crate) fn slot_bytes(
    bytes: &[u8],
    start: usize,
    sizing: SlotSizing,
    field: CifField,
    attribute: Attribute,
) -> Option<&[u8]> {
    let layout = scan(bytes, start, sizing).ok()?;
    let slot = layout.slot(field, attribute)?;
    Some(&bytes[slot.offset..slot.offset + slot.len])
}

/// Overwrite an existing attribute slot.
pub(crate) fn set_slot(
    buf: &mut PacketBuffer,
    start: usize,
    sizing: SlotSizing,
    field: CifField,
    attribute: Attribute,
    value: &[u8],
) -> Result<()> {
    let layout = scan(buf.as_bytes(), start, sizing)?;
    let slot = *layout.slot(field, attribute).ok_or_else(|| {
        VrtError::unsupported(
            "set attribute",
            format!("{} has no {attribute:?} slot; set the field and enable the attribute first", field.name()),
        )
    })?;
    check_value(field.spec(), attribute, value, sizing)?;
    buf.replace_bytes(slot.offset, slot.len, value)
}

/// Insert a CIF7 word enabling only the current value.
pub(crate) fn add_cif7(buf: &mut PacketBuffer, start: usize, sizing: SlotSizing) -> Result<()> {
    let layout = scan(buf.as_bytes(), start, sizing)?;
    if layout.word(IndicatorWord::Cif7).is_some() {
        return Ok(());
    }
    insert_word(buf, &layout, IndicatorWord::Cif7, Attribute::CurrentValue.mask())
}

/// Drop the CIF7 word, keeping only current-value slots.
pub(crate) fn remove_cif7(buf: &mut PacketBuffer, start: usize, sizing: SlotSizing) -> Result<()> {
    let layout = scan(buf.as_bytes(), start, sizing)?;
    if layout.word(IndicatorWord::Cif7).is_none() {
        return Ok(());
    }
    set_attribute(buf, start, sizing, Attribute::CurrentValue, true)?;
    for attribute in layout.attributes.iter().filter(|a| **a != Attribute::CurrentValue) {
        set_attribute(buf, start, sizing, *attribute, false)?;
    }
    let layout = scan(buf.as_bytes(), start, sizing)?;
    remove_word(buf, &layout, IndicatorWord::Cif7);
    Ok(())
}

enum Splice {
    Insert(usize, Vec<u8>),
    Remove(usize, usize),
}

struct AttributePlan {
    splices: Vec<Splice>,
    growth: usize,
    had_cif7: bool,
    new_word: u32,
}

fn plan_attribute(layout: &Layout, attribute: Attribute, on: bool, sizing: SlotSizing) -> Option<AttributePlan> {
    let had_cif7 = layout.word(IndicatorWord::Cif7).is_some();
    // without an IF7 word there is nothing to disable
    if !had_cif7 && !on {
        return None;
    }
    let current = layout.word(IndicatorWord::Cif7).unwrap_or(Attribute::CurrentValue.mask());
    let new_word = if on { current | attribute.mask() } else { current & !attribute.mask() };
    let enabled = layout.attributes.contains(&attribute);
    if enabled == on {
        return (on && !had_cif7).then_some(AttributePlan { splices: Vec::new(), growth: 4, had_cif7, new_word });
    }

    let mut splices = Vec::new();
    let mut growth = if had_cif7 { 0 } else { 4 };
    for field in &layout.fields {
        if on {
            let bytes = empty_slot(field.spec(), attribute, sizing);
            growth += bytes.len();
            splices.push(Splice::Insert(layout.insertion_point(*field, attribute), bytes));
        } else if let Some(slot) = layout.slot(*field, attribute) {
            splices.push(Splice::Remove(slot.offset, slot.len));
        }
    }
    Some(AttributePlan { splices, growth, had_cif7, new_word })
}

/// Bytes `set_attribute` would add to the block.
pub(crate) fn attribute_growth(bytes: &[u8], start: usize, sizing: SlotSizing, attribute: Attribute, on: bool) -> Result<usize> {
    let layout = scan(bytes, start, sizing)?;
    Ok(plan_attribute(&layout, attribute, on, sizing).map_or(0, |plan| plan.growth))
}

/// Enable or disable one CIF7 attribute, adding or removing its slot for
/// every announced field. The CIF7 word is added first if absent.
pub(crate) fn set_attribute(
    buf: &mut PacketBuffer,
    start: usize,
    sizing: SlotSizing,
    attribute: Attribute,
    on: bool,
) -> Result<()> {
    let layout = scan(buf.as_bytes(), start, sizing)?;
    let Some(plan) = plan_attribute(&layout, attribute, on, sizing) else {
        return Ok(());
    };
    buf.check_growth(plan.growth)?;

    // fields are in ascending offset order; splice from the back
    for splice in plan.splices.iter().rev() {
        match splice {
            Splice::Insert(at, bytes) => buf.insert_bytes(*at, bytes)?,
            Splice::Remove(at, len) => buf.remove_bytes(*at, *len),
        }
    }
    if plan.had_cif7 {
        write_word(buf, &layout, IndicatorWord::Cif7, plan.new_word);
    } else {
        insert_word(buf, &layout, IndicatorWord::Cif7, plan.new_word)?;
    }
    trace!("CIF7 {:?} -> {} for {} fields", attribute, on, layout.fields.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PacketType;
    use crate::CodecConfig;
    use anyhow::Result;
    use proptest::prelude::*;

    /// Context-style packet holding an empty block right after the header.
    fn block() -> (PacketBuffer, usize) {
        let mut buf = PacketBuffer::new(PacketType::Context, CodecConfig::default());
        buf.set_payload_length(4).unwrap();
        let start = buf.payload_offset();
        (buf, start)
    }

    fn u32_value(v: u32) -> Vec<u8> {
        v.to_be_bytes().to_vec()
    }

    fn u64_value(v: u64) -> Vec<u8> {
        v.to_be_bytes().to_vec()
    }

    #[test]
    fn fields_land_in_table_order() -> Result<()> {
        let (mut buf, start) = block();
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::SampleRate, Some(&u64_value(7)))?;
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::Bandwidth, Some(&u64_value(5)))?;
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::Gain, Some(&u32_value(3)))?;

        let layout = scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?;
        assert_eq!(layout.fields, vec![CifField::Bandwidth, CifField::Gain, CifField::SampleRate]);
        assert_eq!(layout.word(IndicatorWord::Cif0), Some((1 << 29) | (1 << 23) | (1 << 21)));
        assert_eq!(layout.end, buf.as_bytes().len());
        assert_eq!(
            slot_bytes(buf.as_bytes(), start, SlotSizing::FieldWidth, CifField::Gain, Attribute::CurrentValue),
            Some(&u32_value(3)[..])
        );
        Ok(())
    }

    #[test]
    fn cif_words_come_and_go_with_their_fields() -> Result<()> {
        let (mut buf, start) = block();
        let empty = buf.as_bytes().to_vec();
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::NetworkId, Some(&u32_value(1)))?;
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::AuxGain, Some(&u32_value(2)))?;
        let layout = scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?;
        assert_eq!(layout.word(IndicatorWord::Cif0), Some((1 << 1) | (1 << 3)));
        assert_eq!(layout.word(IndicatorWord::Cif1), Some(1 << 14));
        assert_eq!(layout.word(IndicatorWord::Cif3), Some(1 << 1));

        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::NetworkId, None)?;
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::AuxGain, None)?;
        assert_eq!(buf.as_bytes(), &empty[..]);
        Ok(())
    }

    #[test]
    fn attributes_multiply_slots() -> Result<()> {
        let (mut buf, start) = block();
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::Bandwidth, Some(&u64_value(10)))?;
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::Gain, Some(&u32_value(20)))?;
        set_attribute(&mut buf, start, SlotSizing::FieldWidth, Attribute::Probability, true)?;
        set_attribute(&mut buf, start, SlotSizing::FieldWidth, Attribute::MaxValue, true)?;

        let layout = scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?;
        let shape: Vec<(CifField, Attribute, usize)> =
            layout.slots.iter().map(|s| (s.field, s.attribute, s.len)).collect();
        assert_eq!(
            shape,
            vec![
                (CifField::Bandwidth, Attribute::CurrentValue, 8),
                (CifField::Bandwidth, Attribute::MaxValue, 8),
                (CifField::Bandwidth, Attribute::Probability, 4),
                (CifField::Gain, Attribute::CurrentValue, 4),
                (CifField::Gain, Attribute::MaxValue, 4),
                (CifField::Gain, Attribute::Probability, 4),
            ]
        );

        // a field added later gets empty slots for the other attributes
        set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::Temperature, Some(&u32_value(1)))?;
        let layout = scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?;
        assert_eq!(layout.slots.len(), 9);

        remove_cif7(&mut buf, start, SlotSizing::FieldWidth)?;
        let layout = scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?;
        assert!(layout.word(IndicatorWord::Cif7).is_none());
        assert_eq!(layout.slots.len(), 3);
        assert_eq!(
            slot_bytes(buf.as_bytes(), start, SlotSizing::FieldWidth, CifField::Gain, Attribute::CurrentValue),
            Some(&u32_value(20)[..])
        );
        Ok(())
    }

    #[test]
    fn disabling_without_cif7_leaves_the_block_alone() -> Result<()> {
        let (mut buf, start) = block();
        set_field(&mut buf, start, SlotSizing::ResponseWord, CifField::SampleRate, Some(&u32_value(0x20)))?;
        let before = buf.as_bytes().to_vec();
        for attribute in [Attribute::CurrentValue, Attribute::Average] {
            assert_eq!(attribute_growth(buf.as_bytes(), start, SlotSizing::ResponseWord, attribute, false)?, 0);
            set_attribute(&mut buf, start, SlotSizing::ResponseWord, attribute, false)?;
            assert_eq!(buf.as_bytes(), &before[..]);
        }
        Ok(())
    }

    #[test]
    fn response_sizing_uses_one_word_per_slot() -> Result<()> {
        let (mut buf, start) = block();
        set_field(&mut buf, start, SlotSizing::ResponseWord, CifField::FormattedGps, Some(&u32_value(9)))?;
        assert!(set_field(&mut buf, start, SlotSizing::ResponseWord, CifField::Bandwidth, Some(&u64_value(1))).is_err());
        let layout = scan(buf.as_bytes(), start, SlotSizing::ResponseWord)?;
        assert_eq!(layout.slots[0].len, 4);
        Ok(())
    }

    #[test]
    fn wrong_widths_are_rejected_without_mutation() -> Result<()> {
        let (mut buf, start) = block();
        let before = buf.as_bytes().to_vec();
        assert!(set_field(&mut buf, start, SlotSizing::FieldWidth, CifField::Bandwidth, Some(&[0; 4])).is_err());
        assert!(set_slot(&mut buf, start, SlotSizing::FieldWidth, CifField::Gain, Attribute::MinValue, &[0; 4]).is_err());
        assert_eq!(buf.as_bytes(), &before[..]);
        Ok(())
    }

    #[test]
    fn reserved_bits_are_reported() -> Result<()> {
        let (mut buf, start) = block();
        assert!(scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?.reserved_bits().is_none());
        buf.write_u32(start, 1 << 5);
        let layout = scan(buf.as_bytes(), start, SlotSizing::FieldWidth)?;
        assert_eq!(layout.reserved_bits(), Some((IndicatorWord::Cif0, 1 << 5)));
        Ok(())
    }

    proptest! {
        #[test]
        fn call_order_does_not_change_bytes(
            picks in prop::collection::btree_set(0usize..FIELD_TABLE.len(), 1..12),
            attrs in prop::collection::btree_set(1usize..13, 0..3),
        ) {
            let fields: Vec<CifField> = picks.iter().map(|i| FIELD_TABLE[*i].field).collect();
            let attrs: Vec<Attribute> = attrs.iter().map(|i| Attribute::ALL[*i]).collect();
            let value_for = |f: CifField| f.spec().size.empty_value().iter().map(|_| f as u8).collect::<Vec<u8>>();

            let build = |order: Vec<CifField>, attrs_first: bool| -> PacketBuffer {
                let (mut buf, start) = block();
                if attrs_first {
                    for a in &attrs {
                        set_attribute(&mut buf, start, SlotSizing::FieldWidth, *a, true).unwrap();
                    }
                }
                for f in order {
                    let spec = f.spec();
                    let value = match spec.size {
                        crate::packet::cif::FieldSize::Fixed(_) => value_for(f),
                        size => size.empty_value(),
                    };
                    set_field(&mut buf, start, SlotSizing::FieldWidth, f, Some(&value)).unwrap();
                }
                if !attrs_first {
                    for a in attrs.iter().rev() {
                        set_attribute(&mut buf, start, SlotSizing::FieldWidth, *a, true).unwrap();
                    }
                }
                buf
            };

            let ascending = build(fields.clone(), false);
            let descending = build(fields.iter().rev().copied().collect(), true);
            prop_assert_eq!(ascending.as_bytes(), descending.as_bytes());
        }
    }
}
