use anyhow::*;
use anyhow_ext::Context;
use fallible_iterator::FallibleIterator;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use tdf::engine::{CalibrationEngine, SyntheticEngine, SyntheticFrame};
use tdf::paths::{TDF_BIN_FILE_NAME, TDF_FILE_NAME};
use tdf::{FrameDecode, TdfReader};

/// Write a small two-frame acquisition and the matching synthetic engine
fn create_demo_acquisition(dir: &Path) -> Result<SyntheticEngine> {
    std::fs::create_dir_all(dir).dot()?;
    let tdf = dir.join(TDF_FILE_NAME);
    if tdf.exists() {
        std::fs::remove_file(&tdf).dot()?;
    }
    std::fs::write(dir.join(TDF_BIN_FILE_NAME), b"").dot()?;

    let db = Connection::open(&tdf).dot()?;
    db.execute_batch(
        "CREATE TABLE Frames (Id INTEGER PRIMARY KEY, Time REAL, Polarity CHAR(1), \
            ScanMode INTEGER, MsMsType INTEGER, NumScans INTEGER, AccumulationTime REAL);
         INSERT INTO Frames VALUES (1, 30.0, '+', 8, 0, 120, 100.0);
         INSERT INTO Frames VALUES (2, 30.1, '+', 8, 8, 120, 100.0);
         CREATE TABLE GlobalMetadata (Key TEXT PRIMARY KEY, Value TEXT);
         INSERT INTO GlobalMetadata VALUES ('InstrumentName', 'timsTOF demo');
         INSERT INTO GlobalMetadata VALUES ('MzAcqRangeLower', '100');
         INSERT INTO GlobalMetadata VALUES ('MzAcqRangeUpper', '1700');
         CREATE TABLE Precursors (Id INTEGER PRIMARY KEY, LargestPeakMz REAL, Charge INTEGER);
         INSERT INTO Precursors VALUES (1, 622.03, 2);
         CREATE TABLE PasefFrameMsMsInfo (Frame INTEGER, ScanNumBegin INTEGER, ScanNumEnd INTEGER, \
            IsolationMz REAL, IsolationWidth REAL, CollisionEnergy REAL, Precursor INTEGER);
         INSERT INTO PasefFrameMsMsInfo VALUES (2, 40, 80, 622.0, 2.0, 32.0, 1);",
    )
    .dot()?;

    let mut engine = SyntheticEngine::new();
    for frame_id in 1..=2u32 {
        let pairs = (0..120u32)
            .map(|scan| {
                if scan % 4 == 0 {
                    (vec![], vec![])
                } else {
                    let base = 1000 * frame_id + scan * 10;
                    (vec![base, base + 3, base + 7], vec![scan + 1, 2 * scan + 1, 50])
                }
            })
            .collect();
        engine.add_frame(frame_id as i64, SyntheticFrame::from_pairs(pairs));
    }
    engine.add_precursor(1, 2, 40, 80);

    Ok(engine)
}

fn print_frames<E: CalibrationEngine>(reader: &mut TdfReader<E>) -> Result<()> {
    println!("=== {} ===", reader.paths().dir.display());
    println!("Instrument: {}", reader.metadata().instrument_name());

    let mut frames = reader.frames();
    let mut count = 0;
    while let Some(decoded) = frames.next().dot()? {
        count += 1;
        match &decoded.decode {
            FrameDecode::Scans(scans) => println!(
                "Frame {} (RT {:.2} min): {} scans, {} peaks",
                decoded.frame.id,
                decoded.frame.retention_time_minutes(),
                scans.len(),
                scans.iter().map(|s| s.data_points.len()).sum::<usize>()
            ),
            FrameDecode::Empty => println!("Frame {}: empty", decoded.frame.id),
            FrameDecode::Skipped { declared, decoded: n } => {
                println!("Frame {}: skipped ({} declared, {} decoded)", decoded.frame.id, declared, n)
            }
        }
    }
    println!("Total frames: {}", count);

    Ok(())
}

#[cfg(feature = "native")]
fn open_native(path: &Path) -> Result<()> {
    let engine = tdf::engine::TimsDataEngine::load_default().dot()?;
    let mut reader = TdfReader::open(path, engine).dot()?;
    print_frames(&mut reader)
}

#[cfg(not(feature = "native"))]
fn open_native(path: &Path) -> Result<()> {
    bail!("cannot read {}: built without the `native` feature", path.display())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(path) = std::env::args().nth(1) {
        return open_native(&PathBuf::from(path));
    }

    let demo_dir = std::env::temp_dir().join("tdf_sandbox_demo.d");
    let engine = create_demo_acquisition(&demo_dir).dot()?;
    let mut reader = TdfReader::open(&demo_dir, engine).dot()?;
    print_frames(&mut reader)?;

    let spectrum = reader.centroid_frame_spectrum(2).dot()?;
    println!("{}: {} merged peaks", spectrum.scan_definition, spectrum.data_points.len());
    println!("Precursor 1: {} peaks", reader.centroid_for_precursor(1).len());

    Ok(())
}
