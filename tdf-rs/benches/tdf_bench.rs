//! Benchmarks for tdf-rs
//!
//! Run with: cargo bench -p tdf-rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tdf::decoder::parse_scan_buffer;
use tdf::engine::{SyntheticEngine, SyntheticFrame};
use tdf::paths::{TDF_BIN_FILE_NAME, TDF_FILE_NAME};
use tdf::{DecoderConfig, TdfReader};
use tempfile::TempDir;

const NUM_SCANS: u32 = 900;
const PEAKS_PER_SCAN: u32 = 40;

fn frame_pairs(frame_id: u32) -> Vec<(Vec<u32>, Vec<u32>)> {
    (0..NUM_SCANS)
        .map(|scan| {
            let indices = (0..PEAKS_PER_SCAN).map(|p| frame_id * 7 + scan * 3 + p * 101).collect();
            let intensities = (0..PEAKS_PER_SCAN).map(|p| (scan + p) % 250 + 1).collect();
            (indices, intensities)
        })
        .collect()
}

/// Write a 4-frame acquisition into a temporary `.d` directory
fn create_test_acquisition() -> (TempDir, Arc<SyntheticEngine>) {
    let dir = tempfile::Builder::new().suffix(".d").tempdir().unwrap();
    std::fs::write(dir.path().join(TDF_BIN_FILE_NAME), b"").unwrap();

    let db = Connection::open(dir.path().join(TDF_FILE_NAME)).unwrap();
    db.execute_batch(
        "CREATE TABLE Frames (Id INTEGER PRIMARY KEY, Time REAL, Polarity CHAR(1), \
            ScanMode INTEGER, MsMsType INTEGER, NumScans INTEGER, AccumulationTime REAL);
         CREATE TABLE GlobalMetadata (Key TEXT PRIMARY KEY, Value TEXT);
         INSERT INTO GlobalMetadata VALUES ('InstrumentName', 'timsTOF Pro');",
    )
    .unwrap();

    let mut engine = SyntheticEngine::new();
    for frame_id in 1..=4u32 {
        db.execute(
            "INSERT INTO Frames VALUES (?1, ?2, '+', 8, 0, ?3, 100.0)",
            params![frame_id, frame_id as f64 * 0.1, NUM_SCANS],
        )
        .unwrap();
        engine.add_frame(frame_id as i64, SyntheticFrame::from_pairs(frame_pairs(frame_id)));
    }

    (dir, Arc::new(engine))
}

fn bench_open(c: &mut Criterion) {
    let (dir, engine) = create_test_acquisition();

    c.bench_function("open_reader", |b| {
        b.iter(|| {
            let reader = TdfReader::open(black_box(dir.path()), Arc::clone(&engine)).unwrap();
            black_box(reader.metadata().frame_count())
        });
    });
}

fn bench_decode_frame(c: &mut Criterion) {
    let (dir, engine) = create_test_acquisition();

    let mut group = c.benchmark_group("decode_frame");

    for scans_per_batch in [10u32, 50, 200].iter() {
        let config = DecoderConfig::default()
            .scans_per_batch(*scans_per_batch)
            .buffer_capacity(2_000_000);
        let mut reader = TdfReader::open_with_config(dir.path(), Arc::clone(&engine), config).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(scans_per_batch),
            scans_per_batch,
            |b, _| {
                b.iter(|| {
                    let decode = reader.decode_frame(black_box(1)).unwrap();
                    black_box(decode.scans().len())
                });
            },
        );
    }

    group.finish();
}

fn bench_parse_scan_buffer(c: &mut Criterion) {
    let pairs = frame_pairs(1);
    let mut bytes = Vec::new();
    for (indices, _) in &pairs {
        bytes.extend_from_slice(&(indices.len() as u32).to_le_bytes());
    }
    for (indices, intensities) in &pairs {
        for value in indices.iter().chain(intensities.iter()) {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    c.bench_function("parse_scan_buffer", |b| {
        b.iter(|| {
            let sub_scans = parse_scan_buffer(black_box(&bytes), NUM_SCANS as usize).unwrap();
            black_box(sub_scans.len())
        });
    });
}

criterion_group!(
    benches,
    bench_open,
    bench_decode_frame,
    bench_parse_scan_buffer,
);

criterion_main!(benches);
