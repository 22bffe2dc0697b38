//! Packet fixtures shared by unit tests and benchmarks.
//!
//! Every builder is deterministic so benchmark runs and test failures are
//! reproducible.

#![cfg(any(test, feature = "benchmark"))]

use crate::packet::{AnyPacket, CifAccess, ContextPacket, DataPacket, VrtPacket};
use crate::types::{ClassId, DataType, PayloadFormat, TimeStamp};
use crate::{CodecConfig, Result};

/// Class identifier stamped on fixture packets.
pub const FIXTURE_CLASS_ID: ClassId = ClassId { oui: 0x00_12A2, icc: 0x0001, pcc: 0x0002 };

/// Stream identifier of the first fixture stream.
pub const FIXTURE_STREAM_ID: u32 = 0x0000_1000;

/// Ramp of `count` samples spanning the 16-bit range.
pub fn ramp_samples(count: usize) -> Vec<i32> {
    (0..count).map(|i| ((i * 997) % 65_536) as i32 - 32_768).collect()
}

/// Int16 data packet carrying `samples` ramp values, with class id and a
/// real-time timestamp.
pub fn sample_data_packet(config: CodecConfig, samples: usize) -> Result<DataPacket> {
    let mut packet = DataPacket::new(config).with_payload_format(PayloadFormat::from_data_type(DataType::Int16));
    packet.set_stream_identifier(Some(FIXTURE_STREAM_ID))?;
    packet.set_class_id(Some(FIXTURE_CLASS_ID))?;
    packet.set_time_stamp(&TimeStamp::utc(1_700_000_000, 250_000_000_000)?)?;
    packet.set_data_i32(&ramp_samples(samples))?;
    Ok(packet)
}

/// Context packet describing the fixture stream.
pub fn sample_context_packet(config: CodecConfig) -> Result<ContextPacket> {
    let mut packet = ContextPacket::new(config);
    packet.set_stream_identifier(Some(FIXTURE_STREAM_ID))?;
    packet.set_class_id(Some(FIXTURE_CLASS_ID))?;
    packet.set_time_stamp(&TimeStamp::utc(1_700_000_000, 0)?)?;
    packet.set_change_indicator(true);
    packet.set_rf_reference_frequency(Some(2.4e9))?;
    packet.set_bandwidth(Some(20.0e6))?;
    packet.set_sample_rate(Some(25.0e6))?;
    packet.set_reference_level(Some(-10.0))?;
    packet.set_data_payload_format(Some(PayloadFormat::from_data_type(DataType::Int16)))?;
    Ok(packet)
}

/// One context packet followed by `count - 1` data packets, packet counts
/// cycling through 0..16 the way a live stream numbers them.
pub fn packet_stream(config: CodecConfig, count: usize, samples_per_packet: usize) -> Result<Vec<AnyPacket>> {
    let mut packets = Vec::with_capacity(count);
    if count == 0 {
        return Ok(packets);
    }
    packets.push(AnyPacket::from(sample_context_packet(config)?));
    for i in 1..count {
        let mut packet = sample_data_packet(config, samples_per_packet)?;
        packet.set_packet_count((i % 16) as u8)?;
        packets.push(AnyPacket::from(packet));
    }
    Ok(packets)
}

/// Total wire size of `packets`.
pub fn total_length<P: VrtPacket>(packets: &[P]) -> usize {
    packets.iter().map(|p| p.packet_length()).sum()
}
