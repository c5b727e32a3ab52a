//! Calibration engine boundary
//!
//! Bruker's native `timsdata` library owns the `.tdf_bin` file: it decompresses
//! frames, converts raw indices to m/z and scan numbers to 1/K0, and offers
//! its own centroiding. This module reduces it to the [`CalibrationEngine`] trait
//! so the decoding logic can run against any implementation:
//!
//! - [`SyntheticEngine`]: deterministic in-process engine for tests and demos
//! - `TimsDataEngine` (feature `native`): dynamic binding to the vendor library
//!
//! The native library must not be used concurrently through the same handle.
//! Independent handles may be used from different threads.

mod synthetic;
#[cfg(feature = "native")]
mod timsdata;

use std::num::NonZeroU64;
use std::path::Path;

use crate::model::{CentroidData, ProfileData};

pub use synthetic::{SyntheticEngine, SyntheticFrame};
#[cfg(feature = "native")]
pub use timsdata::TimsDataEngine;

/// Handle of an acquisition opened by a [`CalibrationEngine`].
///
/// The native library signals failure with a zero handle, which is why zero
/// is not representable here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle(NonZeroU64);

impl EngineHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(EngineHandle)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("cannot load timsdata library: {0}")]
    LibraryLoad(String),

    #[error("cannot open {path}: {message}")]
    Open { path: String, message: String },

    #[error("unknown engine handle {0}")]
    UnknownHandle(u64),

    #[error("{call} failed for frame {frame_id}: {message}")]
    CallFailed {
        call: &'static str,
        frame_id: i64,
        message: String,
    },

    #[error("scan buffer too small: {required} bytes required, {capacity} available")]
    BufferTooSmall { required: usize, capacity: usize },
}

/// Operations consumed from the vendor calibration/decoding library.
///
/// Index and scan-number arrays are passed as `f64` because that is how the
/// native conversion routines take them.
pub trait CalibrationEngine {
    /// Open the acquisition directory (the `.d` folder).
    fn open(&self, dir: &Path, use_recalibrated_state: bool) -> Result<EngineHandle, EngineError>;

    fn close(&self, handle: EngineHandle);

    /// Read sub-scans `[scan_begin, scan_end)` of a frame into `buffer`.
    ///
    /// Returns the number of bytes the layout occupies. A return of zero means the
    /// read failed; a value larger than `buffer.len()` means the buffer was too
    /// small and its content must not be used.
    fn read_scans(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
        buffer: &mut [u8],
    ) -> Result<usize, EngineError>;

    fn index_to_mz(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        indices: &[f64],
        mzs: &mut [f64],
    ) -> Result<(), EngineError>;

    fn scan_num_to_one_over_k0(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_nums: &[f64],
        mobilities: &mut [f64],
    ) -> Result<(), EngineError>;

    /// Merge sub-scans `[scan_begin, scan_end)` of a frame into one centroided spectrum.
    fn extract_centroided_spectrum_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<CentroidData, EngineError>;

    /// Sum sub-scans `[scan_begin, scan_end)` of a frame into a profile on the index grid.
    fn extract_profile_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<ProfileData, EngineError>;

    /// Centroided MS/MS spectrum of PASEF precursors, merged over all their frames.
    fn read_pasef_msms(
        &self,
        handle: EngineHandle,
        precursor_ids: &[i64],
    ) -> Result<CentroidData, EngineError>;

    fn one_over_k0_to_ccs(&self, one_over_k0: f64, charge: u32, mz: f64) -> f64;

    fn ccs_to_one_over_k0(&self, ccs: f64, charge: u32, mz: f64) -> f64;
}

impl<E: CalibrationEngine + ?Sized> CalibrationEngine for std::sync::Arc<E> {
    fn open(&self, dir: &Path, use_recalibrated_state: bool) -> Result<EngineHandle, EngineError> {
        (**self).open(dir, use_recalibrated_state)
    }

    fn close(&self, handle: EngineHandle) {
        (**self).close(handle)
    }

    fn read_scans(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
        buffer: &mut [u8],
    ) -> Result<usize, EngineError> {
        (**self).read_scans(handle, frame_id, scan_begin, scan_end, buffer)
    }

    fn index_to_mz(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        indices: &[f64],
        mzs: &mut [f64],
    ) -> Result<(), EngineError> {
        (**self).index_to_mz(handle, frame_id, indices, mzs)
    }

    fn scan_num_to_one_over_k0(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_nums: &[f64],
        mobilities: &mut [f64],
    ) -> Result<(), EngineError> {
        (**self).scan_num_to_one_over_k0(handle, frame_id, scan_nums, mobilities)
    }

    fn extract_centroided_spectrum_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<CentroidData, EngineError> {
        (**self).extract_centroided_spectrum_for_frame(handle, frame_id, scan_begin, scan_end)
    }

    fn extract_profile_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<ProfileData, EngineError> {
        (**self).extract_profile_for_frame(handle, frame_id, scan_begin, scan_end)
    }

    fn read_pasef_msms(
        &self,
        handle: EngineHandle,
        precursor_ids: &[i64],
    ) -> Result<CentroidData, EngineError> {
        (**self).read_pasef_msms(handle, precursor_ids)
    }

    fn one_over_k0_to_ccs(&self, one_over_k0: f64, charge: u32, mz: f64) -> f64 {
        (**self).one_over_k0_to_ccs(one_over_k0, charge, mz)
    }

    fn ccs_to_one_over_k0(&self, ccs: f64, charge: u32, mz: f64) -> f64 {
        (**self).ccs_to_one_over_k0(ccs, charge, mz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handle_is_rejected() {
        assert!(EngineHandle::new(0).is_none());
        assert_eq!(EngineHandle::new(7).map(EngineHandle::get), Some(7));
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::BufferTooSmall { required: 300, capacity: 200 };
        assert_eq!(
            err.to_string(),
            "scan buffer too small: 300 bytes required, 200 available"
        );
    }
}
