//! Whole-frame and precursor spectra extracted by the calibration engine
//!
//! These routines let the engine merge sub-scans into a single spectrum instead
//! of decoding every sub-scan. Failures are logged and produce empty results.
//!
//! The profile routines are experimental: the engine's profile grid is known to
//! map to physically incorrect m/z values.

use crate::conversion::{indices_to_mz, ms_level_from_msms_type, populated_array, scan_nums_to_mobility};
use crate::engine::{CalibrationEngine, EngineHandle};
use crate::model::{
    DataPoint, FrameDescriptor, FrameSpectrum, MaldiSpot, MobilityType, ProfileData, SpectrumType,
};
use crate::reconstruct::ScanContext;

// ============================================================================
// Engine extraction calls
// ============================================================================

/// Centroided spectrum merged over the sub-scans `[scan_begin, scan_end)` of a frame
pub fn centroid_for_frame<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame_id: i64,
    scan_begin: u32,
    scan_end: u32,
) -> Vec<DataPoint> {
    match engine.extract_centroided_spectrum_for_frame(handle, frame_id, scan_begin, scan_end) {
        Ok(data) => data.to_data_points(),
        Err(e) => {
            log::warn!(
                "Could not extract centroid scan for frame {} for scans {} to {}: {}",
                frame_id,
                scan_begin,
                scan_end,
                e
            );
            Vec::new()
        }
    }
}

/// Summed profile over the sub-scans `[scan_begin, scan_end)` of a frame.
///
/// Experimental, see the module documentation.
pub fn profile_for_frame<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame_id: i64,
    scan_begin: u32,
    scan_end: u32,
) -> Option<ProfileData> {
    match engine.extract_profile_for_frame(handle, frame_id, scan_begin, scan_end) {
        Ok(data) => Some(data),
        Err(e) => {
            log::warn!("Could not extract profile for frame {}: {}", frame_id, e);
            None
        }
    }
}

/// Centroided MS/MS spectrum of a PASEF precursor, merged over all its frames
pub fn centroid_for_precursor<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    precursor_id: i64,
) -> Vec<DataPoint> {
    match engine.read_pasef_msms(handle, &[precursor_id]) {
        Ok(data) => data.to_data_points(),
        Err(e) => {
            log::warn!("Could not extract MS/MS spectrum of precursor {}: {}", precursor_id, e);
            Vec::new()
        }
    }
}

// ============================================================================
// Frame spectra
// ============================================================================

/// Grid indices and intensities of a profile without its inner zero runs.
///
/// A point is kept when it or one of its neighbours is non-zero. The first and
/// last points are always kept.
pub fn remove_zero_runs(intensities: &[i32]) -> (Vec<u32>, Vec<f64>) {
    let n = intensities.len();
    let mut indices = Vec::new();
    let mut values = Vec::new();

    for i in 0..n {
        let keep = i == 0
            || i == n - 1
            || intensities[i - 1] != 0
            || intensities[i] != 0
            || intensities[i + 1] != 0;
        if keep {
            indices.push(i as u32);
            values.push(intensities[i] as f64);
        }
    }

    (indices, values)
}

fn frame_scan_definition(frame: &FrameDescriptor, context: &ScanContext, spot: Option<&MaldiSpot>) -> String {
    let mut definition = format!(
        "{} Frame #{} RT: {:.2}",
        context.scan_definition(frame.scan_mode),
        frame.id,
        frame.retention_time_minutes()
    );
    if let Some(spot) = spot {
        definition.push(' ');
        definition.push_str(&spot.spot_name);
    }
    definition
}

fn frame_spectrum<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame: &FrameDescriptor,
    context: &ScanContext,
    spot: Option<&MaldiSpot>,
    spectrum_type: SpectrumType,
    data_points: Vec<DataPoint>,
) -> FrameSpectrum {
    let mobilities = scan_nums_to_mobility(engine, handle, frame.id, &populated_array(frame.num_scans, 1));

    FrameSpectrum {
        frame_id: frame.id,
        ms_level: ms_level_from_msms_type(frame.msms_type),
        retention_time: frame.retention_time_minutes(),
        polarity: frame.polarity,
        spectrum_type,
        scan_definition: frame_scan_definition(frame, context, spot),
        mz_range: context.mz_range,
        accumulation_time: frame.accumulation_time,
        data_points,
        mobilities,
        mobility_type: MobilityType::Tims,
        coordinates: spot.map(|s| (s.x_index, s.y_index)),
    }
}

/// Merge all sub-scans of a frame into one centroided spectrum
pub fn centroid_frame_spectrum<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame: &FrameDescriptor,
    context: &ScanContext,
    spot: Option<&MaldiSpot>,
) -> FrameSpectrum {
    let data_points = centroid_for_frame(engine, handle, frame.id, 0, frame.num_scans);
    frame_spectrum(engine, handle, frame, context, spot, SpectrumType::Centroided, data_points)
}

/// Merge all sub-scans of a frame into one pseudo profile spectrum.
///
/// Returns `None` when the engine cannot extract the profile.
#[deprecated(note = "profile extraction yields incorrect m/z values, use centroid_frame_spectrum")]
pub fn profile_frame_spectrum<E: CalibrationEngine + ?Sized>(
    engine: &E,
    handle: EngineHandle,
    frame: &FrameDescriptor,
    context: &ScanContext,
    spot: Option<&MaldiSpot>,
) -> Option<FrameSpectrum> {
    let profile = profile_for_frame(engine, handle, frame.id, 0, frame.num_scans)?;
    let (indices, intensities) = remove_zero_runs(&profile.intensities);
    let mzs = indices_to_mz(engine, handle, frame.id, &indices);

    let data_points = mzs
        .into_iter()
        .zip(intensities)
        .map(|(mz, intensity)| DataPoint::new(mz, intensity))
        .collect();

    Some(frame_spectrum(engine, handle, frame, context, spot, SpectrumType::Profile, data_points))
}
