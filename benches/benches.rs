use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::{Rng, SeedableRng};

use gnss_demux::checksum::{crc24q_update, crc32_reversed_update};
use gnss_demux::{ParserBuilder, Protocol};

fn ubx_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xb5, 0x62, class, id];
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    let ck = gnss_demux::checksum::fletcher8(&frame[2..]);
    frame.push(ck.0);
    frame.push(ck.1);
    frame
}

fn rtcm_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xd3, (payload.len() >> 8) as u8, payload.len() as u8];
    frame.extend_from_slice(payload);
    let crc = gnss_demux::checksum::crc24q(&frame);
    frame.extend_from_slice(&[(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]);
    frame
}

fn bench_mixed_stream(c: &mut Criterion) {
    let mut stream = Vec::new();
    while stream.len() < 64 * 1024 {
        stream.extend_from_slice(b"$GPGGA,123519,4807.038,N*27\r\n");
        stream.extend_from_slice(&rtcm_frame(&[0x3e; 64]));
        stream.extend_from_slice(&ubx_frame(0x01, 0x07, &[0x55; 92]));
    }

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("mixed_stream", |b| {
        b.iter(|| {
            let mut count = 0usize;
            let mut parser = ParserBuilder::new("bench")
                .with_protocols(&[Protocol::Nmea, Protocol::Rtcm, Protocol::Ublox])
                .buffer_length(2048)
                .begin(move |_| count += 1)
                .unwrap();
            parser.parse_next_bytes(&stream);
        });
    });
    group.finish();
}

fn bench_noise(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let noise: Vec<u8> = (0..64 * 1024).map(|_| rng.gen()).collect();

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(noise.len() as u64));
    group.bench_function("random_noise", |b| {
        b.iter(|| {
            let mut parser = ParserBuilder::new("bench")
                .with_protocols(&[
                    Protocol::Nmea,
                    Protocol::Rtcm,
                    Protocol::Ublox,
                    Protocol::Sbf,
                    Protocol::Spartn,
                    Protocol::UnicoreBinary,
                    Protocol::UnicoreHash,
                ])
                .buffer_length(2048)
                .begin(|_| {})
                .unwrap();
            parser.parse_next_bytes(&noise);
        });
    });
    group.finish();
}

fn bench_crc_folds(c: &mut Criterion) {
    let data = vec![0xa5u8; 4096];

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("crc24q", |b| {
        b.iter(|| data.iter().fold(0u32, |crc, &byte| crc24q_update(crc, byte)));
    });
    group.bench_function("crc32_reversed", |b| {
        b.iter(|| {
            data.iter()
                .fold(0u32, |crc, &byte| crc32_reversed_update(crc, byte))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_mixed_stream, bench_noise, bench_crc_folds);
criterion_main!(benches);
