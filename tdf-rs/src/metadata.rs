//! Metadata tables of a TDF acquisition
//!
//! The `analysis.tdf` SQLite database describes every frame stored in `analysis.tdf_bin`:
//! - Frames: retention time, polarity, scan mode, MS/MS type, number of sub-scans
//! - GlobalMetadata: instrument name and acquisition m/z range
//! - PasefFrameMsMsInfo joined with Precursors: precursor isolation per sub-scan range
//! - MaldiFrameInfo: spot coordinates of imaging acquisitions
//!
//! Only `Frames` is mandatory, the other tables are treated as empty when missing.

use std::collections::HashMap;

use anyhow::bail;
use anyhow_ext::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use serde_rusqlite::from_rows;

use crate::model::{FrameDescriptor, MaldiSpot, MzRange, Polarity, PrecursorInfo};
use crate::query_utils::{
    query_single_f64_with_params, query_single_i64, query_single_string_with_params, table_exists,
};

pub const INSTRUMENT_NAME_KEY: &str = "InstrumentName";
pub const MZ_ACQ_RANGE_LOWER_KEY: &str = "MzAcqRangeLower";
pub const MZ_ACQ_RANGE_UPPER_KEY: &str = "MzAcqRangeUpper";

const UNKNOWN_INSTRUMENT: &str = "Unknown instrument";

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "Polarity")]
    polarity: Option<String>,
    #[serde(rename = "ScanMode")]
    scan_mode: Option<i64>,
    #[serde(rename = "MsMsType")]
    msms_type: Option<i64>,
    #[serde(rename = "NumScans")]
    num_scans: i64,
    #[serde(rename = "AccumulationTime")]
    accumulation_time: Option<f64>,
}

fn to_u32(value: i64, column: &str, frame_id: i64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => bail!("invalid {} value {} for frame {}", column, value, frame_id),
    }
}

/// List all frames in table order.
///
/// The first scan number of a frame is one plus the number of sub-scans of all
/// frames listed before it, giving a run-wide 1-based scan numbering.
pub fn list_frames(db: &Connection) -> Result<Vec<FrameDescriptor>> {
    let frame_count = query_single_i64(db, "SELECT COUNT(*) FROM Frames").dot()?.unwrap_or(0);

    let mut stmt = db
        .prepare(
            "SELECT Id, Time, Polarity, ScanMode, MsMsType, NumScans, AccumulationTime \
             FROM Frames ORDER BY Id",
        )
        .dot()?;
    let records = from_rows::<FrameRecord>(stmt.query([]).dot()?);

    let mut frames = Vec::with_capacity(frame_count.max(0) as usize);
    let mut next_scan_number: u32 = 1;

    for record_res in records {
        let record = record_res.dot()?;
        let num_scans = to_u32(record.num_scans, "NumScans", record.id)?;

        frames.push(FrameDescriptor {
            id: record.id,
            num_scans,
            first_scan_number: next_scan_number,
            time: record.time,
            polarity: record
                .polarity
                .as_deref()
                .map(Polarity::from_single_char)
                .unwrap_or(Polarity::Unknown),
            scan_mode: to_u32(record.scan_mode.unwrap_or(0), "ScanMode", record.id)?,
            msms_type: to_u32(record.msms_type.unwrap_or(0), "MsMsType", record.id)?,
            accumulation_time: record.accumulation_time.unwrap_or(0.0),
        });

        next_scan_number = next_scan_number.saturating_add(num_scans);
    }

    Ok(frames)
}

// ============================================================================
// GlobalMetadata
// ============================================================================

/// Acquisition-wide values of the `GlobalMetadata` key/value table
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalMetadata {
    pub instrument_name: String,
    pub mz_range: MzRange,
}

pub fn get_global_metadata(db: &Connection) -> Result<GlobalMetadata> {
    if !table_exists(db, "GlobalMetadata").dot()? {
        log::warn!("No GlobalMetadata table, instrument name and m/z range are unknown");
        return Ok(GlobalMetadata {
            instrument_name: UNKNOWN_INSTRUMENT.to_string(),
            mz_range: MzRange::new(0.0, 0.0),
        });
    }

    let instrument_name = query_single_string_with_params(
        db,
        "SELECT CAST(Value AS TEXT) FROM GlobalMetadata WHERE Key = ?1",
        [INSTRUMENT_NAME_KEY],
    )
    .dot()?
    .unwrap_or_else(|| UNKNOWN_INSTRUMENT.to_string());

    let range_value = |key: &str| -> Result<f64> {
        let value = query_single_f64_with_params(
            db,
            "SELECT CAST(Value AS REAL) FROM GlobalMetadata WHERE Key = ?1",
            [key],
        )
        .dot()?;
        if value.is_none() {
            log::warn!("GlobalMetadata has no {} entry", key);
        }
        Ok(value.unwrap_or(0.0))
    };

    Ok(GlobalMetadata {
        instrument_name,
        mz_range: MzRange::new(range_value(MZ_ACQ_RANGE_LOWER_KEY)?, range_value(MZ_ACQ_RANGE_UPPER_KEY)?),
    })
}

// ============================================================================
// PASEF precursors
// ============================================================================

const SQL_PASEF_WITH_PRECURSORS: &str =
    "SELECT m.Frame, m.Precursor, m.ScanNumBegin, m.ScanNumEnd, m.IsolationMz, m.IsolationWidth, \
     m.CollisionEnergy, p.LargestPeakMz, p.Charge \
     FROM PasefFrameMsMsInfo m LEFT JOIN Precursors p ON p.Id = m.Precursor \
     ORDER BY m.Frame, m.ScanNumBegin";

const SQL_PASEF_WITHOUT_PRECURSORS: &str =
    "SELECT Frame, Precursor, ScanNumBegin, ScanNumEnd, IsolationMz, IsolationWidth, \
     CollisionEnergy, NULL, NULL \
     FROM PasefFrameMsMsInfo ORDER BY Frame, ScanNumBegin";

/// List the precursor selections of all PASEF MS/MS frames
pub fn list_precursor_infos(db: &Connection) -> Result<Vec<PrecursorInfo>> {
    if !table_exists(db, "PasefFrameMsMsInfo").dot()? {
        return Ok(Vec::new());
    }

    let sql = if table_exists(db, "Precursors").dot()? {
        SQL_PASEF_WITH_PRECURSORS
    } else {
        log::warn!("No Precursors table, precursor m/z and charge default to 0");
        SQL_PASEF_WITHOUT_PRECURSORS
    };

    let mut stmt = db.prepare(sql).dot()?;
    let rows = stmt
        .query_map([], |row| {
            let charge: Option<i64> = row.get(8)?;
            Ok(PrecursorInfo {
                frame_id: row.get(0)?,
                precursor_id: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                scan_num_begin: row.get(2)?,
                scan_num_end: row.get(3)?,
                isolation_mz: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                isolation_width: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                collision_energy: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                largest_peak_mz: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                charge: charge.and_then(|c| u32::try_from(c).ok()).unwrap_or(0),
            })
        })
        .dot()?;

    rows.collect::<rusqlite::Result<Vec<_>>>().dot()
}

// ============================================================================
// MALDI spots
// ============================================================================

/// List the spot coordinates of all frames of a MALDI imaging acquisition
pub fn list_maldi_spots(db: &Connection) -> Result<Vec<MaldiSpot>> {
    if !table_exists(db, "MaldiFrameInfo").dot()? {
        return Ok(Vec::new());
    }

    let mut stmt = db
        .prepare("SELECT Frame, SpotName, XIndexPos, YIndexPos FROM MaldiFrameInfo ORDER BY Frame")
        .dot()?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MaldiSpot {
                frame_id: row.get(0)?,
                spot_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                x_index: row.get(2)?,
                y_index: row.get(3)?,
            })
        })
        .dot()?;

    rows.collect::<rusqlite::Result<Vec<_>>>().dot()
}

// ============================================================================
// Loaded tables
// ============================================================================

/// All metadata needed to decode the frames of one acquisition, read once at open
#[derive(Clone, Debug)]
pub struct MetadataTables {
    frames: Vec<FrameDescriptor>,
    frame_index_by_id: HashMap<i64, usize>,
    global: GlobalMetadata,
    precursors_by_frame: HashMap<i64, Vec<PrecursorInfo>>,
    maldi_spots: HashMap<i64, MaldiSpot>,
}

impl MetadataTables {
    pub fn load(db: &Connection) -> Result<Self> {
        if !table_exists(db, "Frames").dot()? {
            bail!("not a TDF database: the Frames table is missing");
        }

        let frames = list_frames(db).dot()?;
        let global = get_global_metadata(db).dot()?;

        let mut precursors_by_frame: HashMap<i64, Vec<PrecursorInfo>> = HashMap::new();
        for info in list_precursor_infos(db).dot()? {
            precursors_by_frame.entry(info.frame_id).or_default().push(info);
        }

        let maldi_spots = list_maldi_spots(db)
            .dot()?
            .into_iter()
            .map(|spot| (spot.frame_id, spot))
            .collect::<HashMap<_, _>>();

        let frame_index_by_id = frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| (frame.id, idx))
            .collect();

        log::debug!(
            "Loaded metadata of {} frames, {} precursor selections, {} MALDI spots",
            frames.len(),
            precursors_by_frame.values().map(Vec::len).sum::<usize>(),
            maldi_spots.len()
        );

        Ok(Self {
            frames,
            frame_index_by_id,
            global,
            precursors_by_frame,
            maldi_spots,
        })
    }

    /// All frames in table order
    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    pub fn frame(&self, frame_id: i64) -> Option<&FrameDescriptor> {
        self.frame_index_by_id
            .get(&frame_id)
            .and_then(|&idx| self.frames.get(idx))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of sub-scans over all frames
    pub fn total_scan_count(&self) -> u64 {
        self.frames.iter().map(|f| f.num_scans as u64).sum()
    }

    pub fn instrument_name(&self) -> &str {
        &self.global.instrument_name
    }

    pub fn mz_range(&self) -> MzRange {
        self.global.mz_range
    }

    pub fn global_metadata(&self) -> &GlobalMetadata {
        &self.global
    }

    pub fn precursors_for_frame(&self, frame_id: i64) -> &[PrecursorInfo] {
        self.precursors_by_frame
            .get(&frame_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn maldi_spot(&self, frame_id: i64) -> Option<&MaldiSpot> {
        self.maldi_spots.get(&frame_id)
    }

    pub fn is_maldi(&self) -> bool {
        !self.maldi_spots.is_empty()
    }
}
