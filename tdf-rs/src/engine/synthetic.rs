//! Deterministic calibration engine backed by in-memory frames
//!
//! Calibration is linear: `mz = mz_offset + mz_slope * index` and
//! `1/K0 = mobility_start - mobility_step * scan_num`, so every conversion has an
//! exact inverse. Read and conversion failures can be injected per frame or per batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::BufMut;
use itertools::Itertools;

use super::{CalibrationEngine, EngineError, EngineHandle};
use crate::model::{CentroidData, ProfileData, RawSubScan};

const CCS_CONVERSION_FACTOR: f64 = 18509.8632163405;
const N2_GAS_MASS: f64 = 28.013;
const TEMPERATURE_KELVIN: f64 = 305.0;

/// Sub-scans of one synthetic frame, in mobility order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyntheticFrame {
    pub sub_scans: Vec<RawSubScan>,
}

impl SyntheticFrame {
    pub fn new(sub_scans: Vec<RawSubScan>) -> Self {
        Self { sub_scans }
    }

    /// Build a frame from `(indices, intensities)` pairs
    pub fn from_pairs(pairs: Vec<(Vec<u32>, Vec<u32>)>) -> Self {
        let sub_scans = pairs
            .into_iter()
            .map(|(indices, intensities)| RawSubScan { indices, intensities })
            .collect();
        Self { sub_scans }
    }

    pub fn num_scans(&self) -> u32 {
        self.sub_scans.len() as u32
    }
}

/// In-memory [`CalibrationEngine`]
///
/// ```
/// use tdf::engine::{SyntheticEngine, SyntheticFrame};
///
/// let mut engine = SyntheticEngine::new();
/// engine.add_frame(1, SyntheticFrame::from_pairs(vec![(vec![10, 20], vec![5, 6])]));
/// assert_eq!(engine.index_to_mz_value(10), 100.0 + 0.01 * 10.0);
/// ```
#[derive(Debug)]
pub struct SyntheticEngine {
    frames: HashMap<i64, SyntheticFrame>,
    precursors: HashMap<i64, Vec<(i64, u32, u32)>>,
    pub mz_offset: f64,
    pub mz_slope: f64,
    pub mobility_start: f64,
    pub mobility_step: f64,
    failing_batches: HashSet<(i64, u32)>,
    failing_conversions: HashSet<i64>,
    fail_open: bool,
    next_handle: AtomicU64,
    open_handles: Mutex<HashSet<u64>>,
    read_calls: AtomicUsize,
}

impl Default for SyntheticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            precursors: HashMap::new(),
            mz_offset: 100.0,
            mz_slope: 0.01,
            mobility_start: 1.6,
            mobility_step: 0.001,
            failing_batches: HashSet::new(),
            failing_conversions: HashSet::new(),
            fail_open: false,
            next_handle: AtomicU64::new(1),
            open_handles: Mutex::new(HashSet::new()),
            read_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_frame(&mut self, frame_id: i64, frame: SyntheticFrame) {
        self.frames.insert(frame_id, frame);
    }

    /// Register sub-scans `scan_begin..scan_end` of a frame as fragments of a precursor
    pub fn add_precursor(&mut self, precursor_id: i64, frame_id: i64, scan_begin: u32, scan_end: u32) {
        self.precursors
            .entry(precursor_id)
            .or_default()
            .push((frame_id, scan_begin, scan_end));
    }

    /// Make the read of the batch starting at `scan_begin` fail
    pub fn fail_batch(&mut self, frame_id: i64, scan_begin: u32) {
        self.failing_batches.insert((frame_id, scan_begin));
    }

    /// Make every index and scan-number conversion of a frame fail
    pub fn fail_conversions(&mut self, frame_id: i64) {
        self.failing_conversions.insert(frame_id);
    }

    pub fn fail_open(&mut self) {
        self.fail_open = true;
    }

    /// Number of `read_scans` calls served so far
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::Relaxed)
    }

    pub fn open_handle_count(&self) -> usize {
        self.open_handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn index_to_mz_value(&self, index: u32) -> f64 {
        self.mz_offset + self.mz_slope * index as f64
    }

    /// Inverse of the index calibration
    pub fn mz_to_index_value(&self, mz: f64) -> f64 {
        (mz - self.mz_offset) / self.mz_slope
    }

    pub fn scan_num_to_one_over_k0_value(&self, scan_num: u32) -> f64 {
        self.mobility_start - self.mobility_step * scan_num as f64
    }

    fn check_handle(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let known = self
            .open_handles
            .lock()
            .map(|h| h.contains(&handle.get()))
            .unwrap_or(false);
        if known {
            Ok(())
        } else {
            Err(EngineError::UnknownHandle(handle.get()))
        }
    }

    fn frame(&self, call: &'static str, frame_id: i64) -> Result<&SyntheticFrame, EngineError> {
        self.frames.get(&frame_id).ok_or_else(|| EngineError::CallFailed {
            call,
            frame_id,
            message: "frame not found".to_string(),
        })
    }

    fn scan_range<'a>(
        &self,
        call: &'static str,
        frame_id: i64,
        frame: &'a SyntheticFrame,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<&'a [RawSubScan], EngineError> {
        if scan_begin > scan_end || scan_end > frame.num_scans() {
            return Err(EngineError::CallFailed {
                call,
                frame_id,
                message: format!(
                    "invalid scan range {}-{} for {} scans",
                    scan_begin,
                    scan_end,
                    frame.num_scans()
                ),
            });
        }
        Ok(&frame.sub_scans[scan_begin as usize..scan_end as usize])
    }

    /// Sum intensities per index over the given sub-scans, sorted by index
    fn merge_sub_scans<'a>(sub_scans: impl Iterator<Item = &'a RawSubScan>) -> BTreeMap<u32, u64> {
        let mut merged = BTreeMap::new();
        for sub_scan in sub_scans {
            for (&index, &intensity) in sub_scan.indices.iter().zip_eq(sub_scan.intensities.iter()) {
                *merged.entry(index).or_insert(0u64) += intensity as u64;
            }
        }
        merged
    }

    fn centroid_from_merged(&self, merged: BTreeMap<u32, u64>) -> CentroidData {
        let mut data = CentroidData::default();
        for (index, intensity) in merged {
            data.mzs.push(self.index_to_mz_value(index));
            data.intensities.push(intensity as f32);
        }
        data
    }
}

impl CalibrationEngine for SyntheticEngine {
    fn open(&self, dir: &Path, _use_recalibrated_state: bool) -> Result<EngineHandle, EngineError> {
        if self.fail_open {
            return Err(EngineError::Open {
                path: dir.display().to_string(),
                message: "synthetic open failure".to_string(),
            });
        }
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = EngineHandle::new(raw).ok_or_else(|| EngineError::Open {
            path: dir.display().to_string(),
            message: "handle counter overflow".to_string(),
        })?;
        if let Ok(mut handles) = self.open_handles.lock() {
            handles.insert(raw);
        }
        Ok(handle)
    }

    fn close(&self, handle: EngineHandle) {
        if let Ok(mut handles) = self.open_handles.lock() {
            handles.remove(&handle.get());
        }
    }

    fn read_scans(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
        buffer: &mut [u8],
    ) -> Result<usize, EngineError> {
        self.check_handle(handle)?;
        self.read_calls.fetch_add(1, Ordering::Relaxed);

        if self.failing_batches.contains(&(frame_id, scan_begin)) {
            return Ok(0);
        }

        let frame = self.frame("tims_read_scans_v2", frame_id)?;
        let sub_scans = self.scan_range("tims_read_scans_v2", frame_id, frame, scan_begin, scan_end)?;

        let values: usize = sub_scans.len() + sub_scans.iter().map(|s| 2 * s.peak_count()).sum::<usize>();
        let required = 4 * values;
        if required > buffer.len() {
            return Ok(required);
        }

        let mut out = &mut buffer[..required];
        for sub_scan in sub_scans {
            out.put_u32_le(sub_scan.peak_count() as u32);
        }
        for sub_scan in sub_scans {
            for &index in &sub_scan.indices {
                out.put_u32_le(index);
            }
            for &intensity in &sub_scan.intensities {
                out.put_u32_le(intensity);
            }
        }

        Ok(required)
    }

    fn index_to_mz(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        indices: &[f64],
        mzs: &mut [f64],
    ) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        if self.failing_conversions.contains(&frame_id) {
            return Err(EngineError::CallFailed {
                call: "tims_index_to_mz",
                frame_id,
                message: "synthetic conversion failure".to_string(),
            });
        }
        for (mz, &index) in mzs.iter_mut().zip(indices.iter()) {
            *mz = self.mz_offset + self.mz_slope * index;
        }
        Ok(())
    }

    fn scan_num_to_one_over_k0(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_nums: &[f64],
        mobilities: &mut [f64],
    ) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        if self.failing_conversions.contains(&frame_id) {
            return Err(EngineError::CallFailed {
                call: "tims_scannum_to_oneoverk0",
                frame_id,
                message: "synthetic conversion failure".to_string(),
            });
        }
        for (mobility, &scan_num) in mobilities.iter_mut().zip(scan_nums.iter()) {
            *mobility = self.mobility_start - self.mobility_step * scan_num;
        }
        Ok(())
    }

    fn extract_centroided_spectrum_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<CentroidData, EngineError> {
        self.check_handle(handle)?;
        let call = "tims_extract_centroided_spectrum_for_frame_v2";
        let frame = self.frame(call, frame_id)?;
        let sub_scans = self.scan_range(call, frame_id, frame, scan_begin, scan_end)?;
        Ok(self.centroid_from_merged(Self::merge_sub_scans(sub_scans.iter())))
    }

    fn extract_profile_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<ProfileData, EngineError> {
        self.check_handle(handle)?;
        let call = "tims_extract_profile_for_frame";
        let frame = self.frame(call, frame_id)?;
        let sub_scans = self.scan_range(call, frame_id, frame, scan_begin, scan_end)?;
        let merged = Self::merge_sub_scans(sub_scans.iter());
        let grid_size = merged.keys().next_back().map(|&max| max as usize + 1).unwrap_or(0);
        let mut intensities = vec![0i32; grid_size];
        for (index, intensity) in merged {
            intensities[index as usize] = intensity.min(i32::MAX as u64) as i32;
        }
        Ok(ProfileData { intensities })
    }

    fn read_pasef_msms(
        &self,
        handle: EngineHandle,
        precursor_ids: &[i64],
    ) -> Result<CentroidData, EngineError> {
        self.check_handle(handle)?;
        let call = "tims_read_pasef_msms_v2";
        let mut selected: Vec<&RawSubScan> = Vec::new();
        for precursor_id in precursor_ids {
            let ranges = self.precursors.get(precursor_id).ok_or_else(|| EngineError::CallFailed {
                call,
                frame_id: 0,
                message: format!("precursor {} not found", precursor_id),
            })?;
            for &(frame_id, scan_begin, scan_end) in ranges {
                let frame = self.frame(call, frame_id)?;
                let end = scan_end.min(frame.num_scans());
                selected.extend(self.scan_range(call, frame_id, frame, scan_begin.min(end), end)?);
            }
        }
        Ok(self.centroid_from_merged(Self::merge_sub_scans(selected.into_iter())))
    }

    fn one_over_k0_to_ccs(&self, one_over_k0: f64, charge: u32, mz: f64) -> f64 {
        let charge = charge as f64;
        let reduced_mass = (mz * charge * N2_GAS_MASS) / (mz * charge + N2_GAS_MASS);
        one_over_k0 * charge / (reduced_mass * TEMPERATURE_KELVIN).sqrt() * CCS_CONVERSION_FACTOR
    }

    fn ccs_to_one_over_k0(&self, ccs: f64, charge: u32, mz: f64) -> f64 {
        let charge = charge as f64;
        let reduced_mass = (mz * charge * N2_GAS_MASS) / (mz * charge + N2_GAS_MASS);
        ccs * (reduced_mass * TEMPERATURE_KELVIN).sqrt() / (charge * CCS_CONVERSION_FACTOR)
    }
}
