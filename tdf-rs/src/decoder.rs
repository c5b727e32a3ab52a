//! Frame buffer decoder
//!
//! The native scan reader fills a caller-provided buffer with the sub-scans of a
//! frame in the following layout of little-endian 32-bit integers:
//!
//! ```text
//! [peakCount_0 .. peakCount_{n-1}][indices_0][intensities_0][indices_1][intensities_1]...
//! ```
//!
//! where `indices_i` and `intensities_i` both hold `peakCount_i` values. Frames are
//! read in batches of [`DecoderConfig::scans_per_batch`] sub-scans so that one batch
//! fits into a buffer of [`DecoderConfig::buffer_capacity`] bytes.
//!
//! # Example
//!
//! ```
//! use tdf::decoder::parse_scan_buffer;
//!
//! let words: [u32; 5] = [1, 0, 42, 7, 0];
//! let bytes: Vec<u8> = words[..4].iter().flat_map(|w| w.to_le_bytes()).collect();
//! let sub_scans = parse_scan_buffer(&bytes, 2).unwrap();
//! assert_eq!(sub_scans[0].indices, vec![42]);
//! assert_eq!(sub_scans[0].intensities, vec![7]);
//! assert!(sub_scans[1].indices.is_empty());
//! ```

use anyhow::bail;
use anyhow_ext::Result;
use bytes::Buf;
use itertools::Itertools;

use crate::config::DecoderConfig;
use crate::conversion::indices_to_mz;
use crate::engine::{CalibrationEngine, EngineError, EngineHandle};
use crate::model::{RawSubScan, SpectralArrays};

/// Parse the packed layout of `num_scans` sub-scans.
///
/// Fails when the peak counts declare more values than `bytes` holds.
pub fn parse_scan_buffer(bytes: &[u8], num_scans: usize) -> Result<Vec<RawSubScan>> {
    let mut buf = bytes;

    let header_size = num_scans.checked_mul(4).unwrap_or(usize::MAX);
    if buf.remaining() < header_size {
        bail!(
            "scan buffer of {} bytes cannot hold the peak counts of {} sub-scans",
            bytes.len(),
            num_scans
        );
    }

    let peak_counts = (0..num_scans).map(|_| buf.get_u32_le() as usize).collect_vec();

    let mut sub_scans = Vec::with_capacity(num_scans);
    for (i, &peak_count) in peak_counts.iter().enumerate() {
        let needed = peak_count.checked_mul(8).unwrap_or(usize::MAX);
        if buf.remaining() < needed {
            bail!(
                "sub-scan {} declares {} peaks but only {} bytes remain in the scan buffer",
                i,
                peak_count,
                buf.remaining()
            );
        }

        let indices = (0..peak_count).map(|_| buf.get_u32_le()).collect_vec();
        let intensities = (0..peak_count).map(|_| buf.get_u32_le()).collect_vec();
        sub_scans.push(RawSubScan { indices, intensities });
    }

    Ok(sub_scans)
}

/// Read one batch of sub-scans, `None` when the batch has to be treated as failed
fn read_batch<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame_id: i64,
    batch_begin: u32,
    batch_end: u32,
    buffer: &mut [u8],
) -> Option<Vec<RawSubScan>> {
    let written = match engine.read_scans(handle, frame_id, batch_begin, batch_end, buffer) {
        Ok(written) => written,
        Err(e) => {
            log::warn!(
                "Could not read scans {}-{} for frame {}: {}",
                batch_begin,
                batch_end,
                frame_id,
                e
            );
            return None;
        }
    };

    if written == 0 {
        log::warn!(
            "Could not read scans {}-{} for frame {}: no data returned",
            batch_begin,
            batch_end,
            frame_id
        );
        return None;
    }

    if written > buffer.len() {
        let e = EngineError::BufferTooSmall {
            required: written,
            capacity: buffer.len(),
        };
        log::warn!(
            "Could not read scans {}-{} for frame {}: {}",
            batch_begin,
            batch_end,
            frame_id,
            e
        );
        return None;
    }

    match parse_scan_buffer(&buffer[..written], (batch_end - batch_begin) as usize) {
        Ok(sub_scans) => Some(sub_scans),
        Err(e) => {
            log::warn!(
                "Corrupt scan buffer for scans {}-{} of frame {}: {}",
                batch_begin,
                batch_end,
                frame_id,
                e
            );
            None
        }
    }
}

/// Sub-scans of a batched read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedSubScans {
    /// One entry per requested sub-scan, empty for the sub-scans of failed batches
    pub spectra: Vec<SpectralArrays>,
    /// Number of sub-scans that came from batches the engine actually returned
    pub read_count: u32,
}

impl LoadedSubScans {
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// True when sub-scans were requested but no batch could be read
    pub fn is_unreadable(&self) -> bool {
        self.read_count == 0 && !self.spectra.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpectralArrays> {
        self.spectra.iter()
    }
}

impl From<Vec<SpectralArrays>> for LoadedSubScans {
    fn from(spectra: Vec<SpectralArrays>) -> Self {
        let read_count = spectra.len() as u32;
        Self { spectra, read_count }
    }
}

/// Load the sub-scans `[scan_begin, scan_end)` of a frame with m/z converted peaks.
///
/// Returns exactly one entry per requested sub-scan in ascending order. Batches
/// that cannot be read are never retried: their sub-scans come back empty and
/// are left out of [`LoadedSubScans::read_count`].
pub fn load_data_points_for_frame<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame_id: i64,
    scan_begin: u32,
    scan_end: u32,
    config: &DecoderConfig,
    buffer: &mut Vec<u8>,
) -> LoadedSubScans {
    if scan_begin >= scan_end {
        return LoadedSubScans::default();
    }

    if buffer.len() != config.buffer_capacity {
        buffer.resize(config.buffer_capacity, 0);
    }

    let scans_per_batch = config.scans_per_batch.max(1);
    let mut spectra = Vec::with_capacity((scan_end - scan_begin) as usize);
    let mut read_count = 0;
    let mut batch_begin = scan_begin;

    while batch_begin < scan_end {
        let batch_end = batch_begin.saturating_add(scans_per_batch).min(scan_end);
        log::trace!("Reading scans {}-{} of frame {}", batch_begin, batch_end, frame_id);

        match read_batch(engine, handle, frame_id, batch_begin, batch_end, buffer) {
            Some(sub_scans) => {
                read_count += batch_end - batch_begin;
                for sub_scan in sub_scans {
                    let mzs = indices_to_mz(engine, handle, frame_id, &sub_scan.indices);
                    let intensities = sub_scan.intensities.iter().map(|&i| i as f64).collect_vec();
                    spectra.push(SpectralArrays::new(mzs, intensities));
                }
            }
            None => {
                spectra.extend((batch_begin..batch_end).map(|_| SpectralArrays::empty()));
            }
        }

        batch_begin = batch_end;
    }

    LoadedSubScans { spectra, read_count }
}
