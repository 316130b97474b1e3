use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mercury_rs::mercury::codec::crc16_modbus;
use mercury_rs::mercury::frame::{build_request, decode_current_values, decode_energy};

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

fn benchmark_crc(c: &mut Criterion) {
    let data = hex_to_bytes("0A9876542700123456000100000000009912345678");

    c.bench_function("crc16_modbus_21", |b| {
        b.iter(|| black_box(crc16_modbus(black_box(&data))))
    });
    c.bench_function("build_request", |b| {
        b.iter(|| black_box(build_request(black_box(0x0A98_7654), black_box(0x63))))
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let current = hex_to_bytes("0A9876546323050123001234E816");
    let energy = hex_to_bytes("0A9876542700123456000100000000009912345678A996");

    c.bench_function("decode_current_values", |b| {
        b.iter(|| {
            let _ = black_box(decode_current_values(black_box(&current)));
        })
    });
    c.bench_function("decode_energy", |b| {
        b.iter(|| {
            let _ = black_box(decode_energy(black_box(&energy)));
        })
    });
}

criterion_group!(benches, benchmark_crc, benchmark_decode);
criterion_main!(benches);
