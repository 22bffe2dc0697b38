//! Benchmarks for packet encode and decode paths
//!
//! Covers:
//! - Parsing raw bytes into typed packets
//! - Sample extraction for processing- and link-efficient formats
//! - CIF field insertion and CIF7 attribute toggling
//!
//! Platform: Cross-platform (synthetic fixtures, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use vrt_codec::test_utils::{ramp_samples, sample_context_packet, sample_data_packet};
use vrt_codec::{
    AnyPacket, Attribute, CifAccess, CodecConfig, ContextPacket, DataPacket, DataItemFormat, PayloadFormat,
    RealComplexType, VrtPacket,
};

fn bench_packet_parsing(c: &mut Criterion) {
    let config = CodecConfig::default();
    let data = sample_data_packet(config, 1024).expect("data fixture");
    let context = sample_context_packet(config).expect("context fixture");

    let mut group = c.benchmark_group("packet_parsing");
    group.throughput(Throughput::Bytes(data.packet_length() as u64));
    group.bench_function("data_1024_samples", |b| {
        b.iter(|| black_box(AnyPacket::from_bytes(black_box(data.as_bytes()), config).expect("parse")))
    });
    group.throughput(Throughput::Bytes(context.packet_length() as u64));
    group.bench_function("context_five_fields", |b| {
        b.iter(|| black_box(AnyPacket::from_bytes(black_box(context.as_bytes()), config).expect("parse")))
    });
    group.finish();
}

fn bench_sample_extraction(c: &mut Criterion) {
    let config = CodecConfig::default();
    let samples = ramp_samples(4096);
    let mut group = c.benchmark_group("sample_extraction");
    group.throughput(Throughput::Elements(samples.len() as u64));

    for (label, processing_efficient, item, packing) in
        [("int16_processing", true, 16, 16), ("int12_link", false, 12, 12), ("int12_in_16", true, 12, 16)]
    {
        let format = PayloadFormat::new(
            processing_efficient,
            RealComplexType::Real,
            DataItemFormat::SignedInt,
            false,
            0,
            0,
            item,
            packing,
            1,
            1,
        )
        .expect("valid format");
        let clipped: Vec<i32> = samples.iter().map(|s| s >> (16 - item)).collect();
        let mut packet = DataPacket::new(config).with_payload_format(format);
        packet.set_data_i32(&clipped).expect("encode");

        group.bench_with_input(BenchmarkId::new("decode", label), &packet, |b, packet| {
            b.iter(|| black_box(packet.data_i32().expect("decode")))
        });
        group.bench_with_input(BenchmarkId::new("encode", label), &clipped, |b, clipped| {
            b.iter(|| {
                let mut p = DataPacket::new(config).with_payload_format(format);
                p.set_data_i32(black_box(clipped)).expect("encode");
                black_box(p)
            })
        });
    }
    group.finish();
}

fn bench_cif_editing(c: &mut Criterion) {
    let config = CodecConfig::default();
    let mut group = c.benchmark_group("cif_editing");

    group.bench_function("insert_fields_reverse_order", |b| {
        b.iter(|| {
            let mut p = ContextPacket::new(config);
            p.set_aux_bandwidth(Some(1.0e3)).expect("field");
            p.set_temperature(Some(21.5)).expect("field");
            p.set_sample_rate(Some(25.0e6)).expect("field");
            p.set_bandwidth(Some(20.0e6)).expect("field");
            black_box(p)
        })
    });

    let base = sample_context_packet(config).expect("context fixture");
    group.bench_function("toggle_cif7_attribute", |b| {
        b.iter(|| {
            let mut p = base.clone();
            p.set_cif7_attribute(Attribute::MaxValue, true).expect("enable");
            p.set_cif7_attribute(Attribute::MaxValue, false).expect("disable");
            black_box(p)
        })
    });

    group.bench_function("typed_field_read", |b| b.iter(|| black_box(base.sample_rate())));
    group.finish();
}

criterion_group!(benches, bench_packet_parsing, bench_sample_extraction, bench_cif_editing);
criterion_main!(benches);
