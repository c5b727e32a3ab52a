//! tdf-rs: A Rust library for decoding Bruker timsTOF (TDF) acquisitions
//!
//! A `.d` acquisition directory holds an `analysis.tdf` SQLite database describing
//! every frame and an `analysis.tdf_bin` file with the compressed frame data. The
//! binary data is only readable through Bruker's calibration library, abstracted
//! here as a [`CalibrationEngine`]. This library rebuilds the mobility-resolved
//! scans of each frame from the packed buffers the engine returns.
//!
//! # Features
//!
//! - **Frame decoding**: batched reads of sub-scans with index to m/z conversion
//! - **Scan reconstruction**: scan numbers, MS level, polarity, precursor and 1/K0 per scan
//! - **Frame spectra**: centroided whole-frame spectra and PASEF precursor spectra
//! - **MALDI imaging**: spot coordinates for imaging acquisitions
//! - **Metadata**: Frames, GlobalMetadata, PASEF precursor and MALDI tables
//!
//! # Quick Start
//!
//! ```no_run
//! use fallible_iterator::FallibleIterator;
//! use tdf::TdfReader;
//! use tdf::engine::SyntheticEngine;
//!
//! let mut reader = TdfReader::open("path/to/run.d", SyntheticEngine::new()).unwrap();
//!
//! println!("Instrument: {}", reader.metadata().instrument_name());
//!
//! // Decode a single frame
//! let decode = reader.decode_frame(1).unwrap();
//! for scan in decode.scans() {
//!     println!("Scan {} (1/K0 {:.3}): {} peaks", scan.scan_number, scan.mobility, scan.data_points.len());
//! }
//!
//! // Iterate over all MS1 frames
//! let mut frames = reader.frames_at_ms_level(1);
//! while let Some(decoded) = frames.next().unwrap() {
//!     println!("Frame {}: {:?}", decoded.frame.id, decoded.decode.is_skipped());
//! }
//! ```
//!
//! With the `native` feature, `tdf::engine::TimsDataEngine` loads the vendor library.
//!
//! # Module Organization
//!
//! - [`model`]: Core data structures (scans, frames, precursors)
//! - [`engine`]: Calibration engine trait and implementations
//! - [`decoder`]: Native scan buffer layout and batched reads
//! - [`conversion`]: Unit conversions and Bruker code tables
//! - [`reconstruct`]: Mobility-resolved scan reconstruction
//! - [`extract`]: Whole-frame and precursor spectra
//! - [`metadata`]: Metadata tables of `analysis.tdf`
//! - [`iterator`]: Frame iteration

pub mod config;
pub mod conversion;
pub mod decoder;
pub mod engine;
pub mod extract;
pub mod iterator;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod query_utils;
pub mod reconstruct;

// Re-export main types for convenience
pub use config::DecoderConfig;
pub use decoder::LoadedSubScans;
pub use conversion::BrukerScanMode;
pub use engine::{CalibrationEngine, EngineError, EngineHandle};
pub use iterator::{DecodedFrame, FrameIter};
pub use metadata::{GlobalMetadata, MetadataTables};
pub use model::{
    CentroidData, DataPoint, FrameDecode, FrameDescriptor, FrameSpectrum, MaldiSpot, MobilityType,
    MzRange, Polarity, PrecursorInfo, ProfileData, RawSubScan, ReconstructedScan, SpectralArrays,
    SpectrumType,
};
pub use paths::TdfPaths;
pub use reconstruct::ScanContext;

use std::path::Path;

use anyhow::anyhow;
use anyhow_ext::{Context, Result};
use rusqlite::{Connection, OpenFlags};

use crate::conversion::{populated_array, scan_nums_to_mobility};
use crate::decoder::load_data_points_for_frame;
use crate::reconstruct::{reconstruct_frame_scans, reconstruct_maldi_frame_scans};

/// Main entry point for decoding a TDF acquisition
///
/// The reader owns the engine handle of one `.d` directory, its metadata and the
/// scan buffer. Decoding methods take `&mut self`, so a handle is never used by
/// two callers at once. A reader is `Send` when its engine is, which allows
/// decoding distinct acquisitions on distinct threads.
///
/// # Example
///
/// ```no_run
/// use tdf::{DecoderConfig, TdfReader};
/// use tdf::engine::SyntheticEngine;
///
/// let config = DecoderConfig::default().scans_per_batch(25);
/// let mut reader = TdfReader::open_with_config("run.d", SyntheticEngine::new(), config).unwrap();
///
/// // Frame-level metadata
/// println!("Frames: {}", reader.metadata().frame_count());
///
/// // Merged spectrum of the first frame
/// let spectrum = reader.centroid_frame_spectrum(1).unwrap();
/// println!("{}: {} peaks", spectrum.scan_definition, spectrum.data_points.len());
/// ```
pub struct TdfReader<E: CalibrationEngine> {
    engine: E,
    handle: EngineHandle,
    connection: Connection,
    metadata: MetadataTables,
    context: ScanContext,
    config: DecoderConfig,
    paths: TdfPaths,
    buffer: Vec<u8>,
}

impl<E: CalibrationEngine> TdfReader<E> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Open a `.d` directory (or any file inside it) with the default configuration
    pub fn open<P: AsRef<Path>>(path: P, engine: E) -> Result<Self> {
        Self::open_with_config(path, engine, DecoderConfig::default())
    }

    /// Open a `.d` directory with a custom decoder configuration.
    ///
    /// Fails if a file is missing, the metadata cannot be read or the engine cannot
    /// open the acquisition.
    pub fn open_with_config<P: AsRef<Path>>(path: P, engine: E, config: DecoderConfig) -> Result<Self> {
        config.validate().dot()?;
        let paths = TdfPaths::locate(path).dot()?;

        let connection = Connection::open_with_flags(
            &paths.tdf,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .dot()?;
        let metadata = MetadataTables::load(&connection).dot()?;

        let handle = engine
            .open(&paths.dir, config.use_recalibrated_state)
            .dot()?;

        log::info!(
            "Opened {} ({} frames, {} sub-scans, instrument {})",
            paths.dir.display(),
            metadata.frame_count(),
            metadata.total_scan_count(),
            metadata.instrument_name()
        );

        let context = ScanContext::new(metadata.instrument_name(), metadata.mz_range());
        let buffer = vec![0u8; config.buffer_capacity];

        Ok(Self {
            engine,
            handle,
            connection,
            metadata,
            context,
            config,
            paths,
            buffer,
        })
    }

    /// Close the engine handle
    pub fn close(self) {
        drop(self)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn metadata(&self) -> &MetadataTables {
        &self.metadata
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn paths(&self) -> &TdfPaths {
        &self.paths
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    /// Connection to `analysis.tdf`, for tables this library does not load
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn scan_context(&self) -> &ScanContext {
        &self.context
    }

    fn frame(&self, frame_id: i64) -> Result<FrameDescriptor> {
        self.metadata
            .frame(frame_id)
            .cloned()
            .ok_or_else(|| anyhow!("frame {} not found in {}", frame_id, self.paths.tdf.display()))
    }

    // ========================================================================
    // Mobility-resolved scans
    // ========================================================================

    /// Decoded sub-scans `[scan_begin, scan_end)` of a frame, one entry per sub-scan
    pub fn load_sub_scans(&mut self, frame_id: i64, scan_begin: u32, scan_end: u32) -> Result<LoadedSubScans> {
        self.frame(frame_id).dot()?;
        Ok(load_data_points_for_frame(
            &self.engine,
            self.handle,
            frame_id,
            scan_begin,
            scan_end,
            &self.config,
            &mut self.buffer,
        ))
    }

    /// 1/K0 of every sub-scan index of a frame
    pub fn mobilities(&mut self, frame_id: i64) -> Result<Vec<f64>> {
        let frame = self.frame(frame_id).dot()?;
        Ok(scan_nums_to_mobility(
            &self.engine,
            self.handle,
            frame_id,
            &populated_array(frame.num_scans, 0),
        ))
    }

    /// Decode the mobility-resolved scans of a frame.
    ///
    /// Only an unknown frame id is an error. Unreadable batches yield empty
    /// sub-scans. A frame none of whose batches could be read, or whose scan
    /// count does not match, yields [`FrameDecode::Skipped`].
    pub fn decode_frame(&mut self, frame_id: i64) -> Result<FrameDecode> {
        let frame = self.frame(frame_id).dot()?;
        let sub_scans = self.load_sub_scans(frame_id, 0, frame.num_scans).dot()?;
        let mobilities = self.mobilities(frame_id).dot()?;

        Ok(reconstruct_frame_scans(
            &frame,
            &self.context,
            sub_scans,
            &mobilities,
            self.metadata.precursors_for_frame(frame_id),
        ))
    }

    /// Decode the scans of a MALDI imaging frame
    pub fn decode_maldi_frame(&mut self, frame_id: i64) -> Result<FrameDecode> {
        let frame = self.frame(frame_id).dot()?;
        let spot = self
            .metadata
            .maldi_spot(frame_id)
            .cloned()
            .ok_or_else(|| anyhow!("frame {} has no MALDI spot information", frame_id))?;

        let sub_scans = self.load_sub_scans(frame_id, 0, frame.num_scans).dot()?;
        let mobilities = self.mobilities(frame_id).dot()?;

        Ok(reconstruct_maldi_frame_scans(
            &frame,
            &self.context,
            &spot,
            sub_scans,
            &mobilities,
        ))
    }

    /// Iterate over all frames in table order
    pub fn frames(&mut self) -> FrameIter<'_, E> {
        FrameIter::new(self, None)
    }

    /// Iterate over the frames of one MS level
    pub fn frames_at_ms_level(&mut self, ms_level: u8) -> FrameIter<'_, E> {
        FrameIter::new(self, Some(ms_level))
    }

    // ========================================================================
    // Merged spectra
    // ========================================================================

    /// Centroided spectrum merged over the sub-scans `[scan_begin, scan_end)` of a frame
    pub fn centroid_for_frame(&mut self, frame_id: i64, scan_begin: u32, scan_end: u32) -> Result<Vec<DataPoint>> {
        self.frame(frame_id).dot()?;
        Ok(extract::centroid_for_frame(
            &self.engine,
            self.handle,
            frame_id,
            scan_begin,
            scan_end,
        ))
    }

    /// Centroided MS/MS spectrum of a PASEF precursor
    pub fn centroid_for_precursor(&mut self, precursor_id: i64) -> Vec<DataPoint> {
        extract::centroid_for_precursor(&self.engine, self.handle, precursor_id)
    }

    /// All sub-scans of a frame merged into one centroided spectrum
    pub fn centroid_frame_spectrum(&mut self, frame_id: i64) -> Result<FrameSpectrum> {
        let frame = self.frame(frame_id).dot()?;
        Ok(extract::centroid_frame_spectrum(
            &self.engine,
            self.handle,
            &frame,
            &self.context,
            self.metadata.maldi_spot(frame_id),
        ))
    }

    /// All sub-scans of a frame merged into one pseudo profile spectrum
    #[deprecated(note = "profile extraction yields incorrect m/z values, use centroid_frame_spectrum")]
    pub fn profile_frame_spectrum(&mut self, frame_id: i64) -> Result<Option<FrameSpectrum>> {
        let frame = self.frame(frame_id).dot()?;
        #[allow(deprecated)]
        let spectrum = extract::profile_frame_spectrum(
            &self.engine,
            self.handle,
            &frame,
            &self.context,
            self.metadata.maldi_spot(frame_id),
        );
        Ok(spectrum)
    }

    // ========================================================================
    // Collision cross section
    // ========================================================================

    pub fn one_over_k0_to_ccs(&self, one_over_k0: f64, charge: u32, mz: f64) -> f64 {
        self.engine.one_over_k0_to_ccs(one_over_k0, charge, mz)
    }

    pub fn ccs_to_one_over_k0(&self, ccs: f64, charge: u32, mz: f64) -> f64 {
        self.engine.ccs_to_one_over_k0(ccs, charge, mz)
    }
}

impl<E: CalibrationEngine> Drop for TdfReader<E> {
    fn drop(&mut self) {
        self.engine.close(self.handle);
        log::info!("Closed {}", self.paths.dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyntheticEngine;
    use std::sync::Arc;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_reader_is_send() {
        assert_send::<TdfReader<SyntheticEngine>>();
        assert_send::<TdfReader<Arc<SyntheticEngine>>>();
    }

    #[test]
    fn test_exports() {
        let _: Option<ReconstructedScan> = None;
        let _: Option<FrameSpectrum> = None;
        let _: Option<PrecursorInfo> = None;
        let _: Option<MaldiSpot> = None;
        let _: Option<DecodedFrame> = None;
        let _: Option<EngineError> = None;
    }
}
