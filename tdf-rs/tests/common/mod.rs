//! Synthetic `.d` acquisitions shared by the integration tests
#![allow(dead_code)]

use std::fs::File;
use std::path::PathBuf;

use rusqlite::{Connection, params};
use tdf::engine::{SyntheticEngine, SyntheticFrame};
use tdf::paths::{TDF_BIN_FILE_NAME, TDF_FILE_NAME};
use tempfile::TempDir;

pub struct TestFrame {
    pub id: i64,
    pub time: f64,
    pub polarity: &'static str,
    pub scan_mode: u32,
    pub msms_type: u32,
    pub sub_scans: Vec<(Vec<u32>, Vec<u32>)>,
}

impl TestFrame {
    pub fn new(id: i64, msms_type: u32, sub_scans: Vec<(Vec<u32>, Vec<u32>)>) -> Self {
        Self {
            id,
            time: 60.0 + id as f64,
            polarity: "+",
            scan_mode: 8,
            msms_type,
            sub_scans,
        }
    }

    pub fn num_scans(&self) -> u32 {
        self.sub_scans.len() as u32
    }
}

pub struct TestPrecursor {
    pub id: i64,
    pub frame_id: i64,
    pub scan_begin: u32,
    pub scan_end: u32,
    pub largest_peak_mz: f64,
    pub charge: u32,
}

pub struct TestMaldiSpot {
    pub frame_id: i64,
    pub spot_name: &'static str,
    pub x: i32,
    pub y: i32,
}

#[derive(Default)]
pub struct AcquisitionBuilder {
    frames: Vec<TestFrame>,
    precursors: Vec<TestPrecursor>,
    maldi_spots: Vec<TestMaldiSpot>,
}

impl AcquisitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(mut self, frame: TestFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn precursor(mut self, precursor: TestPrecursor) -> Self {
        self.precursors.push(precursor);
        self
    }

    pub fn maldi_spot(mut self, spot: TestMaldiSpot) -> Self {
        self.maldi_spots.push(spot);
        self
    }

    /// Write `analysis.tdf` and an empty `analysis.tdf_bin` into a fresh `.d` directory
    pub fn build(self) -> (TempDir, SyntheticEngine) {
        let dir = tempfile::Builder::new().suffix(".d").tempdir().unwrap();
        File::create(dir.path().join(TDF_BIN_FILE_NAME)).unwrap();

        let db = Connection::open(dir.path().join(TDF_FILE_NAME)).unwrap();
        db.execute_batch(
            "CREATE TABLE Frames (Id INTEGER PRIMARY KEY, Time REAL, Polarity CHAR(1), \
                ScanMode INTEGER, MsMsType INTEGER, NumScans INTEGER, AccumulationTime REAL);
             CREATE TABLE GlobalMetadata (Key TEXT PRIMARY KEY, Value TEXT);
             INSERT INTO GlobalMetadata VALUES ('InstrumentName', 'timsTOF Pro');
             INSERT INTO GlobalMetadata VALUES ('MzAcqRangeLower', '100');
             INSERT INTO GlobalMetadata VALUES ('MzAcqRangeUpper', '1700');
             CREATE TABLE Precursors (Id INTEGER PRIMARY KEY, LargestPeakMz REAL, Charge INTEGER);
             CREATE TABLE PasefFrameMsMsInfo (Frame INTEGER, ScanNumBegin INTEGER, ScanNumEnd INTEGER, \
                IsolationMz REAL, IsolationWidth REAL, CollisionEnergy REAL, Precursor INTEGER);",
        )
        .unwrap();

        if !self.maldi_spots.is_empty() {
            db.execute_batch(
                "CREATE TABLE MaldiFrameInfo (Frame INTEGER, SpotName TEXT, XIndexPos INTEGER, YIndexPos INTEGER);",
            )
            .unwrap();
        }

        let mut engine = SyntheticEngine::new();

        for frame in self.frames {
            db.execute(
                "INSERT INTO Frames VALUES (?1, ?2, ?3, ?4, ?5, ?6, 100.0)",
                params![frame.id, frame.time, frame.polarity, frame.scan_mode, frame.msms_type, frame.num_scans()],
            )
            .unwrap();
            engine.add_frame(frame.id, SyntheticFrame::from_pairs(frame.sub_scans));
        }

        for p in self.precursors {
            db.execute(
                "INSERT OR IGNORE INTO Precursors VALUES (?1, ?2, ?3)",
                params![p.id, p.largest_peak_mz, p.charge],
            )
            .unwrap();
            db.execute(
                "INSERT INTO PasefFrameMsMsInfo VALUES (?1, ?2, ?3, ?4, 2.0, 30.0, ?5)",
                params![p.frame_id, p.scan_begin, p.scan_end, p.largest_peak_mz, p.id],
            )
            .unwrap();
            engine.add_precursor(p.id, p.frame_id, p.scan_begin, p.scan_end);
        }

        for spot in self.maldi_spots {
            db.execute(
                "INSERT INTO MaldiFrameInfo VALUES (?1, ?2, ?3, ?4)",
                params![spot.frame_id, spot.spot_name, spot.x, spot.y],
            )
            .unwrap();
        }

        (dir, engine)
    }
}

/// Path of the `.d` directory
pub fn test_db_path(dir: &TempDir) -> PathBuf {
    dir.path().to_path_buf()
}

/// `n` sub-scans where every third one (starting at index 1) is empty
pub fn sub_scans(n: u32, seed: u32) -> Vec<(Vec<u32>, Vec<u32>)> {
    (0..n)
        .map(|i| {
            if i % 3 == 1 {
                (vec![], vec![])
            } else {
                let base = seed * 1000 + i * 13;
                (vec![base, base + 4, base + 9], vec![i + 1, seed + 2, 7])
            }
        })
        .collect()
}
