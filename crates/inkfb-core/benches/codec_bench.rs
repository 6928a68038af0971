//! Criterion benchmarks for the inkfb binary codec.
//!
//! The update path runs once per painted frame and the input path once per
//! forwarded event, so both are measured.
//!
//! Run with:
//! ```bash
//! cargo bench --package inkfb-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use inkfb_core::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ClientMessage, InputKind, PixelFormat, ServerMessage, UserInput,
};

fn make_update_partial() -> ClientMessage {
    ClientMessage::UpdatePartial {
        x: 10,
        y: 20,
        w: 100,
        h: 50,
    }
}

fn make_initialize() -> ClientMessage {
    ClientMessage::Initialize {
        key: 245209899,
        format: PixelFormat::Rgb565,
    }
}

fn make_user_input() -> ServerMessage {
    ServerMessage::UserInput(UserInput {
        kind: InputKind::PenUpdate,
        device_id: 0,
        x: 702,
        y: 936,
        pressure: 50,
    })
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.bench_function("initialize", |b| {
        let msg = make_initialize();
        b.iter(|| encode_client_message(black_box(&msg)))
    });
    group.bench_function("update_partial", |b| {
        let msg = make_update_partial();
        b.iter(|| encode_client_message(black_box(&msg)))
    });
    group.bench_function("user_input", |b| {
        let msg = make_user_input();
        b.iter(|| encode_server_message(black_box(&msg)))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.bench_function("update_partial", |b| {
        let bytes = encode_client_message(&make_update_partial());
        b.iter(|| decode_client_message(black_box(&bytes)).unwrap())
    });
    group.bench_function("user_input", |b| {
        let bytes = encode_server_message(&make_user_input());
        b.iter(|| decode_server_message(black_box(&bytes)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
