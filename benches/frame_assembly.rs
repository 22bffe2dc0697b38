//! Benchmarks for VRL frame assembly and VRA archive appends
//!
//! Covers:
//! - Packing packet streams into frames with and without CRC
//! - Splitting frames back into packets
//! - Appending to an in-memory archive
//!
//! Platform: Cross-platform (synthetic fixtures, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Cursor;
use vrt_codec::test_utils::{packet_stream, total_length};
use vrt_codec::{CodecConfig, FileMode, VraFile, VrlFrame};

fn bench_frame_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_fill");
    for crc in [false, true] {
        let config = CodecConfig::default().with_frame_crc(crc);
        let packets = packet_stream(config, 32, 256).expect("packet fixtures");
        group.throughput(Throughput::Bytes(total_length(&packets) as u64));
        group.bench_with_input(BenchmarkId::new("set_vrt_packets", if crc { "crc" } else { "vend" }), &packets, |b, packets| {
            b.iter(|| {
                let mut frame = VrlFrame::new(config);
                black_box(frame.set_vrt_packets(black_box(packets)).expect("fill"));
                black_box(frame)
            })
        });
    }

    let config = CodecConfig::default();
    let packets = packet_stream(config, 64, 256).expect("packet fixtures");
    group.bench_function("set_vrt_packets_limited_mtu", |b| {
        b.iter(|| {
            let mut frame = VrlFrame::new(config);
            black_box(frame.set_vrt_packets_limited(black_box(8972), &packets).expect("fill"));
            black_box(frame)
        })
    });
    group.finish();
}

fn bench_frame_split(c: &mut Criterion) {
    let config = CodecConfig::default().with_frame_crc(true);
    let packets = packet_stream(config, 32, 256).expect("packet fixtures");
    let mut frame = VrlFrame::new(config);
    frame.set_vrt_packets(&packets).expect("fill");

    let mut group = c.benchmark_group("frame_split");
    group.throughput(Throughput::Bytes(frame.frame_length() as u64));
    group.bench_function("packets", |b| b.iter(|| black_box(frame.packets().expect("split"))));
    group.bench_function("strict_validate", |b| b.iter(|| black_box(frame.is_frame_valid(None))));
    group.finish();
}

fn bench_archive_append(c: &mut Criterion) {
    let config = CodecConfig::default();
    let packets = packet_stream(config, 128, 256).expect("packet fixtures");
    let mut group = c.benchmark_group("archive_append");
    group.throughput(Throughput::Bytes(total_length(&packets) as u64));
    group.bench_function("append_128_then_crc", |b| {
        b.iter(|| {
            let mut file =
                VraFile::from_storage(Cursor::new(Vec::new()), FileMode::Write, config).expect("archive");
            for packet in &packets {
                file.append(packet).expect("append");
            }
            file.update_crc().expect("crc");
            black_box(file.into_storage().expect("storage"))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_frame_fill, bench_frame_split, bench_archive_append);
criterion_main!(benches);
