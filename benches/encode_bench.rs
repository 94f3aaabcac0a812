/*
Measures the per-frame cost of the output path: packet framing alone, and a full
FrameSink::send through a null transport (lock + encode + bounded write).
*/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use std::{hint::black_box, io, time::Duration};

use dmx_bridge::{
    Frame,
    output::{
        sink::{FrameSink, encode_into, encode_packet},
        transport::WriterTransport,
    },
};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("sink_encode");

    for channels in [24usize, 512] {
        let frame = Frame::filled(channels, 0xAA);

        group.bench_function(BenchmarkId::new("encode_packet", channels), |b| {
            b.iter(|| black_box(encode_packet(black_box(&frame))));
        });

        // reused scratch buffer, as the sink does
        group.bench_function(BenchmarkId::new("encode_into", channels), |b| {
            let mut buf = Vec::with_capacity(channels + 3);
            b.iter(|| {
                encode_into(black_box(&frame), &mut buf);
                black_box(buf.len());
            });
        });

        group.bench_function(BenchmarkId::new("sink_send_null", channels), |b| {
            let sink = FrameSink::with_transport(
                Box::new(WriterTransport::new("null", io::sink())),
                Duration::from_millis(100),
            );
            b.iter(|| black_box(sink.send(black_box(&frame)).is_ok()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
