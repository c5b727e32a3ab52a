//! Unit conversions and Bruker code tables
//!
//! Index to m/z and scan number to 1/K0 conversions go through the calibration
//! engine. A failed conversion never aborts decoding: the output is zero-filled
//! and a warning is logged.

use crate::engine::{CalibrationEngine, EngineHandle};

// ============================================================================
// Engine-backed conversions
// ============================================================================

/// Convert raw TOF indices of a frame to m/z values
pub fn indices_to_mz<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame_id: i64,
    indices: &[u32],
) -> Vec<f64> {
    let input: Vec<f64> = indices.iter().map(|&i| i as f64).collect();
    let mut mzs = vec![0.0; indices.len()];
    if indices.is_empty() {
        return mzs;
    }

    if let Err(e) = engine.index_to_mz(handle, frame_id, &input, &mut mzs) {
        log::warn!(
            "Could not convert {} indices to m/z for frame {}: {}",
            indices.len(),
            frame_id,
            e
        );
        mzs.iter_mut().for_each(|mz| *mz = 0.0);
    }

    mzs
}

/// Convert scan numbers of a frame to inverse reduced ion mobility (1/K0)
pub fn scan_nums_to_mobility<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame_id: i64,
    scan_nums: &[u32],
) -> Vec<f64> {
    let input: Vec<f64> = scan_nums.iter().map(|&s| s as f64).collect();
    let mut mobilities = vec![0.0; scan_nums.len()];
    if scan_nums.is_empty() {
        return mobilities;
    }

    if let Err(e) = engine.scan_num_to_one_over_k0(handle, frame_id, &input, &mut mobilities) {
        log::warn!(
            "Could not convert {} scan numbers to mobility for frame {}: {}",
            scan_nums.len(),
            frame_id,
            e
        );
        mobilities.iter_mut().for_each(|m| *m = 0.0);
    }

    mobilities
}

/// `[offset, offset + 1, ..., offset + size - 1]`
pub fn populated_array(size: u32, offset: u32) -> Vec<u32> {
    (0..size).map(|i| i + offset).collect()
}

// ============================================================================
// Code tables
// ============================================================================

/// MS level of a frame given its `Frames.MsMsType` code.
///
/// Returns 0 for codes that do not describe an MS1 or fragmentation frame;
/// callers use it to exclude such frames.
pub fn ms_level_from_msms_type(msms_type: u32) -> u8 {
    match msms_type {
        0 => 1,
        2 | 8 | 9 | 10 => 2,
        _ => 0,
    }
}

/// Acquisition mode of a frame, from the `Frames.ScanMode` column
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum BrukerScanMode {
    #[strum(serialize = "MS^1")]
    Ms1,
    #[strum(serialize = "Auto MS/MS")]
    AutoMsMs,
    #[strum(serialize = "MRM")]
    Mrm,
    #[strum(serialize = "in-source CID")]
    InSourceCid,
    #[strum(serialize = "broadband CID")]
    BroadbandCid,
    #[strum(serialize = "PASEF")]
    Pasef,
    #[strum(serialize = "DIA")]
    Dia,
    #[strum(serialize = "PRM")]
    Prm,
    #[strum(serialize = "MALDI")]
    Maldi,
    #[strum(serialize = "Unknown scan mode")]
    Unknown,
}

impl BrukerScanMode {
    pub fn from_scan_mode(scan_mode: u32) -> Self {
        match scan_mode {
            0 => BrukerScanMode::Ms1,
            1 => BrukerScanMode::AutoMsMs,
            2 => BrukerScanMode::Mrm,
            3 => BrukerScanMode::InSourceCid,
            4 => BrukerScanMode::BroadbandCid,
            8 => BrukerScanMode::Pasef,
            9 => BrukerScanMode::Dia,
            10 => BrukerScanMode::Prm,
            20 => BrukerScanMode::Maldi,
            _ => BrukerScanMode::Unknown,
        }
    }
}

impl From<u32> for BrukerScanMode {
    fn from(scan_mode: u32) -> Self {
        Self::from_scan_mode(scan_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyntheticEngine;
    use std::path::Path;

    #[test]
    fn test_ms_level_mapping() {
        assert_eq!(ms_level_from_msms_type(0), 1);
        for code in [2, 8, 9, 10] {
            assert_eq!(ms_level_from_msms_type(code), 2);
        }
        assert_eq!(ms_level_from_msms_type(1), 0);
        assert_eq!(ms_level_from_msms_type(99), 0);
    }

    #[test]
    fn test_scan_mode_descriptions() {
        assert_eq!(BrukerScanMode::from_scan_mode(0).to_string(), "MS^1");
        assert_eq!(BrukerScanMode::from_scan_mode(8).to_string(), "PASEF");
        assert_eq!(BrukerScanMode::from(20).to_string(), "MALDI");
        assert_eq!(BrukerScanMode::from_scan_mode(5).to_string(), "Unknown scan mode");
    }

    #[test]
    fn test_populated_array() {
        assert_eq!(populated_array(4, 0), vec![0, 1, 2, 3]);
        assert_eq!(populated_array(3, 1), vec![1, 2, 3]);
        assert!(populated_array(0, 5).is_empty());
    }

    #[test]
    fn test_index_conversion_round_trip() {
        let engine = SyntheticEngine::new();
        let handle = engine.open(Path::new("run.d"), true).unwrap();
        let indices = [0u32, 17, 90_000];
        let mzs = indices_to_mz(&engine, handle, 1, &indices);
        for (&index, &mz) in indices.iter().zip(mzs.iter()) {
            assert!((engine.mz_to_index_value(mz) - index as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn test_conversion_failure_yields_zeros() {
        let mut engine = SyntheticEngine::new();
        engine.fail_conversions(4);
        let handle = engine.open(Path::new("run.d"), true).unwrap();
        assert_eq!(indices_to_mz(&engine, handle, 4, &[1, 2, 3]), vec![0.0; 3]);
        assert_eq!(scan_nums_to_mobility(&engine, handle, 4, &[0, 1]), vec![0.0; 2]);
        assert_eq!(scan_nums_to_mobility(&engine, handle, 5, &[0]).len(), 1);
    }
}
