use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use leptonic::vospi::{
    encode_packet, FrameSynchronizer, PacketHeader, SyncOpts, ANCHOR_PACKET,
    PACKETS_PER_SEGMENT, PACKET_BYTES, SEGMENTS_PER_FRAME,
};
use leptonic::{TelemetryLocation, TelemetryRow};
use rand::Rng;

fn random_payload() -> [u8; 160] {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 160];
    rng.fill(&mut buf[..]);
    buf
}

fn bench_telemetry_decode(c: &mut Criterion) {
    let buf = random_payload();

    let mut group = c.benchmark_group("telemetry");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let _ = TelemetryRow::decode(&buf).unwrap();
        });
    });
    group.finish();
}

// Synchronize with, then transfer, a frame from an in-memory stream.
fn bench_frame_transfer(c: &mut Criterion) {
    let payload = random_payload();
    let mut wire = Vec::new();
    for ttt in 1..=SEGMENTS_PER_FRAME as u8 {
        for line in 0..PACKETS_PER_SEGMENT {
            let segment = if line == ANCHOR_PACKET { ttt } else { 0 };
            let header = PacketHeader::new(segment, line as u8, 0);
            wire.extend_from_slice(&encode_packet(header, &payload));
        }
    }

    let mut group = c.benchmark_group("vospi");
    group.throughput(Throughput::Bytes(
        (SEGMENTS_PER_FRAME * PACKETS_PER_SEGMENT * PACKET_BYTES) as u64,
    ));
    group.bench_function("sync_and_transfer_frame", |b| {
        b.iter(|| {
            let mut sync = FrameSynchronizer::new(&wire[..], SyncOpts::default());
            let mut frame = sync.new_frame();
            sync.sync_and_transfer_frame(&mut frame).unwrap();
        });
    });

    let mut sync = FrameSynchronizer::new(&wire[..], SyncOpts::default());
    let mut frame = sync.new_frame();
    sync.sync_and_transfer_frame(&mut frame).unwrap();
    group.bench_function("image", |b| {
        b.iter(|| {
            let _ = frame.image(TelemetryLocation::Header);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_telemetry_decode, bench_frame_transfer);
criterion_main!(benches);
