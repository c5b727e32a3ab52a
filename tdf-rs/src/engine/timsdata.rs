//! Dynamic binding to Bruker's `timsdata` shared library
//!
//! Symbols are resolved on every call from the loaded [`Library`]. Callback-based
//! extraction routines collect their results into Rust-owned buffers passed
//! through the `user_data` pointer.

use std::ffi::{CString, OsStr, c_char, c_void};
use std::path::Path;

use libloading::{Library, Symbol};

use super::{CalibrationEngine, EngineError, EngineHandle};
use crate::model::{CentroidData, ProfileData};

type TimsOpen = unsafe extern "C" fn(*const c_char, u32) -> u64;
type TimsClose = unsafe extern "C" fn(u64);
type TimsGetLastErrorString = unsafe extern "C" fn(*mut c_char, u32) -> u32;
type TimsSetNumThreads = unsafe extern "C" fn(u32);
type TimsReadScans = unsafe extern "C" fn(u64, i64, u32, u32, *mut c_void, u32) -> u32;
type TimsConvert = unsafe extern "C" fn(u64, i64, *const f64, *mut f64, u32) -> u32;
type TimsCcsConvert = unsafe extern "C" fn(f64, i32, f64) -> f64;

type CentroidCallback = unsafe extern "C" fn(i64, u32, *const f64, *const f32, *mut c_void);
type ProfileCallback = unsafe extern "C" fn(i64, u32, *const i32, *mut c_void);

type TimsExtractCentroided =
    unsafe extern "C" fn(u64, i64, u32, u32, CentroidCallback, *mut c_void) -> u32;
type TimsExtractProfile = unsafe extern "C" fn(u64, i64, u32, u32, ProfileCallback, *mut c_void) -> u32;
type TimsReadPasefMsMs = unsafe extern "C" fn(u64, *const i64, u32, CentroidCallback, *mut c_void) -> u32;

const LAST_ERROR_CAPACITY: usize = 1024;

unsafe extern "C" fn collect_centroids(
    _id: i64,
    num_peaks: u32,
    mzs: *const f64,
    intensities: *const f32,
    user_data: *mut c_void,
) {
    if user_data.is_null() || num_peaks == 0 || mzs.is_null() || intensities.is_null() {
        return;
    }
    let n = num_peaks as usize;
    // SAFETY: user_data points to the CentroidData owned by the calling frame, the
    // library guarantees both arrays hold num_peaks values for the duration of the call
    unsafe {
        let data = &mut *(user_data as *mut CentroidData);
        data.mzs.extend_from_slice(std::slice::from_raw_parts(mzs, n));
        data.intensities.extend_from_slice(std::slice::from_raw_parts(intensities, n));
    }
}

unsafe extern "C" fn collect_profile(
    _id: i64,
    num_points: u32,
    intensities: *const i32,
    user_data: *mut c_void,
) {
    if user_data.is_null() || num_points == 0 || intensities.is_null() {
        return;
    }
    // SAFETY: see collect_centroids
    unsafe {
        let data = &mut *(user_data as *mut ProfileData);
        data.intensities
            .extend_from_slice(std::slice::from_raw_parts(intensities, num_points as usize));
    }
}

/// [`CalibrationEngine`] calling into `timsdata.dll` / `libtimsdata.so`
pub struct TimsDataEngine {
    library: Library,
}

impl std::fmt::Debug for TimsDataEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimsDataEngine").finish_non_exhaustive()
    }
}

impl TimsDataEngine {
    /// Load the library and restrict it to a single worker thread
    pub fn load<P: AsRef<OsStr>>(library_path: P) -> Result<Self, EngineError> {
        // SAFETY: loading runs the library's initialisers, timsdata has no unsound ones
        let library = unsafe { Library::new(library_path.as_ref()) }
            .map_err(|e| EngineError::LibraryLoad(e.to_string()))?;
        let engine = Self { library };

        let set_num_threads: Symbol<TimsSetNumThreads> = engine.symbol(b"tims_set_num_threads\0")?;
        unsafe { set_num_threads(1) };
        log::info!("Loaded timsdata library from {:?}", library_path.as_ref());

        Ok(engine)
    }

    /// Load the library from its platform-specific default file name
    pub fn load_default() -> Result<Self, EngineError> {
        let name = if cfg!(windows) { "timsdata.dll" } else { "libtimsdata.so" };
        Self::load(name)
    }

    fn symbol<T>(&self, name: &[u8]) -> Result<Symbol<'_, T>, EngineError> {
        // SAFETY: every alias above matches the C prototype of the symbol it is used with
        unsafe { self.library.get::<T>(name) }.map_err(|e| EngineError::LibraryLoad(e.to_string()))
    }

    fn last_error(&self) -> String {
        let Ok(get_last_error) = self.symbol::<TimsGetLastErrorString>(b"tims_get_last_error_string\0")
        else {
            return "unknown error".to_string();
        };
        let mut buffer = vec![0u8; LAST_ERROR_CAPACITY];
        let len = unsafe { get_last_error(buffer.as_mut_ptr() as *mut c_char, buffer.len() as u32) };
        let len = (len as usize).min(buffer.len()).saturating_sub(1);
        String::from_utf8_lossy(&buffer[..len]).trim_end_matches('\0').to_string()
    }

    fn call_failed(&self, call: &'static str, frame_id: i64) -> EngineError {
        EngineError::CallFailed {
            call,
            frame_id,
            message: self.last_error(),
        }
    }

    fn convert(
        &self,
        symbol: &'static str,
        handle: EngineHandle,
        frame_id: i64,
        input: &[f64],
        output: &mut [f64],
    ) -> Result<(), EngineError> {
        if input.is_empty() {
            return Ok(());
        }
        let name = format!("{}\0", symbol);
        let convert: Symbol<TimsConvert> = self.symbol(name.as_bytes())?;
        let count = input.len().min(output.len()) as u32;
        let res = unsafe { convert(handle.get(), frame_id, input.as_ptr(), output.as_mut_ptr(), count) };
        if res == 0 {
            return Err(self.call_failed(symbol, frame_id));
        }
        Ok(())
    }
}

impl CalibrationEngine for TimsDataEngine {
    fn open(&self, dir: &Path, use_recalibrated_state: bool) -> Result<EngineHandle, EngineError> {
        let path_str = dir.to_str().ok_or_else(|| EngineError::Open {
            path: dir.display().to_string(),
            message: "path is not valid UTF-8".to_string(),
        })?;
        let c_path = CString::new(path_str).map_err(|e| EngineError::Open {
            path: path_str.to_string(),
            message: e.to_string(),
        })?;

        let open: Symbol<TimsOpen> = self.symbol(b"tims_open\0")?;
        let raw = unsafe { open(c_path.as_ptr(), use_recalibrated_state as u32) };

        EngineHandle::new(raw).ok_or_else(|| EngineError::Open {
            path: path_str.to_string(),
            message: self.last_error(),
        })
    }

    fn close(&self, handle: EngineHandle) {
        match self.symbol::<TimsClose>(b"tims_close\0") {
            Ok(close) => unsafe { close(handle.get()) },
            Err(e) => log::warn!("Cannot close handle {}: {}", handle.get(), e),
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
        let read_scans: Symbol<TimsReadScans> = self.symbol(b"tims_read_scans_v2\0")?;
        let capacity = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
        let required = unsafe {
            read_scans(
                handle.get(),
                frame_id,
                scan_begin,
                scan_end,
                buffer.as_mut_ptr() as *mut c_void,
                capacity,
            )
        };
        if required == 0 {
            return Err(self.call_failed("tims_read_scans_v2", frame_id));
        }
        Ok(required as usize)
    }

    fn index_to_mz(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        indices: &[f64],
        mzs: &mut [f64],
    ) -> Result<(), EngineError> {
        self.convert("tims_index_to_mz", handle, frame_id, indices, mzs)
    }

    fn scan_num_to_one_over_k0(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_nums: &[f64],
        mobilities: &mut [f64],
    ) -> Result<(), EngineError> {
        self.convert("tims_scannum_to_oneoverk0", handle, frame_id, scan_nums, mobilities)
    }

    fn extract_centroided_spectrum_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<CentroidData, EngineError> {
        let extract: Symbol<TimsExtractCentroided> =
            self.symbol(b"tims_extract_centroided_spectrum_for_frame_v2\0")?;
        let mut data = CentroidData::default();
        let res = unsafe {
            extract(
                handle.get(),
                frame_id,
                scan_begin,
                scan_end,
                collect_centroids,
                &mut data as *mut CentroidData as *mut c_void,
            )
        };
        if res == 0 {
            return Err(self.call_failed("tims_extract_centroided_spectrum_for_frame_v2", frame_id));
        }
        Ok(data)
    }

    fn extract_profile_for_frame(
        &self,
        handle: EngineHandle,
        frame_id: i64,
        scan_begin: u32,
        scan_end: u32,
    ) -> Result<ProfileData, EngineError> {
        let extract: Symbol<TimsExtractProfile> = self.symbol(b"tims_extract_profile_for_frame\0")?;
        let mut data = ProfileData::default();
        let res = unsafe {
            extract(
                handle.get(),
                frame_id,
                scan_begin,
                scan_end,
                collect_profile,
                &mut data as *mut ProfileData as *mut c_void,
            )
        };
        if res == 0 {
            return Err(self.call_failed("tims_extract_profile_for_frame", frame_id));
        }
        Ok(data)
    }

    fn read_pasef_msms(
        &self,
        handle: EngineHandle,
        precursor_ids: &[i64],
    ) -> Result<CentroidData, EngineError> {
        let read_pasef: Symbol<TimsReadPasefMsMs> = self.symbol(b"tims_read_pasef_msms_v2\0")?;
        let mut data = CentroidData::default();
        let res = unsafe {
            read_pasef(
                handle.get(),
                precursor_ids.as_ptr(),
                precursor_ids.len() as u32,
                collect_centroids,
                &mut data as *mut CentroidData as *mut c_void,
            )
        };
        if res == 0 {
            return Err(self.call_failed("tims_read_pasef_msms_v2", 0));
        }
        Ok(data)
    }

    fn one_over_k0_to_ccs(&self, one_over_k0: f64, charge: u32, mz: f64) -> f64 {
        match self.symbol::<TimsCcsConvert>(b"tims_oneoverk0_to_ccs_for_mz\0") {
            Ok(convert) => unsafe { convert(one_over_k0, charge as i32, mz) },
            Err(e) => {
                log::warn!("{}", e);
                0.0
            }
        }
    }

    fn ccs_to_one_over_k0(&self, ccs: f64, charge: u32, mz: f64) -> f64 {
        match self.symbol::<TimsCcsConvert>(b"tims_ccs_to_oneoverk0_for_mz\0") {
            Ok(convert) => unsafe { convert(ccs, charge as i32, mz) },
            Err(e) => {
                log::warn!("{}", e);
                0.0
            }
        }
    }
}
