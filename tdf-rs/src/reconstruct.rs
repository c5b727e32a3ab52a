//! Scan reconstruction
//!
//! Turns the decoded sub-scans of a frame into mobility-resolved scans carrying
//! the frame metadata. Empty sub-scans produce no scan but still consume a scan
//! number, so scan numbers stay aligned with `first_scan_number + sub-scan index`.

use crate::conversion::{BrukerScanMode, ms_level_from_msms_type};
use crate::decoder::LoadedSubScans;
use crate::model::{
    FrameDecode, FrameDescriptor, MaldiSpot, MobilityType, MzRange, PrecursorInfo,
    ReconstructedScan, SpectrumType,
};

/// Acquisition-wide values copied into every reconstructed scan
#[derive(Clone, Debug, PartialEq)]
pub struct ScanContext {
    pub instrument_name: String,
    pub mz_range: MzRange,
}

impl ScanContext {
    pub fn new(instrument_name: impl Into<String>, mz_range: MzRange) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            mz_range,
        }
    }

    /// `"<instrument> - <scan mode>"`
    pub fn scan_definition(&self, scan_mode: u32) -> String {
        format!(
            "{} - {}",
            self.instrument_name,
            BrukerScanMode::from_scan_mode(scan_mode)
        )
    }
}

/// `Skipped` when the loaded sub-scans cannot stand for the whole frame
fn check_loaded_sub_scans(frame: &FrameDescriptor, sub_scans: &LoadedSubScans) -> Option<FrameDecode> {
    let loaded = sub_scans.len() as u32;
    if loaded != frame.num_scans {
        log::warn!(
            "Number of scans for frame {} in tdf ({}) does not match number of loaded scans ({})",
            frame.id,
            frame.num_scans,
            loaded
        );
        return Some(FrameDecode::Skipped {
            declared: frame.num_scans,
            decoded: loaded,
        });
    }

    if sub_scans.is_unreadable() {
        log::warn!("No scan batch of frame {} could be read, skipping frame", frame.id);
        return Some(FrameDecode::Skipped {
            declared: frame.num_scans,
            decoded: sub_scans.read_count,
        });
    }

    None
}

/// Precursor isolated while sub-scan `sub_scan` was acquired
pub fn precursor_at_scan(precursors: &[PrecursorInfo], sub_scan: u32) -> Option<&PrecursorInfo> {
    precursors.iter().find(|info| info.contains_scan(sub_scan))
}

fn build_scans<F>(
    frame: &FrameDescriptor,
    context: &ScanContext,
    sub_scans: LoadedSubScans,
    mobilities: &[f64],
    ms_level: u8,
    scan_definition: String,
    mut precursor_of: F,
) -> FrameDecode
where
    F: FnMut(u32) -> (f64, u32),
{
    let retention_time = frame.retention_time_minutes();
    let mut scans = Vec::new();

    for (i, arrays) in sub_scans.spectra.into_iter().enumerate() {
        if arrays.is_empty() {
            continue;
        }
        let sub_scan = i as u32;
        let (precursor_mz, precursor_charge) = precursor_of(sub_scan);

        scans.push(ReconstructedScan {
            scan_number: frame.first_scan_number + sub_scan,
            frame_id: frame.id,
            mobility_scan_index: sub_scan,
            ms_level,
            retention_time,
            precursor_mz,
            precursor_charge,
            data_points: arrays.to_data_points(),
            spectrum_type: SpectrumType::Centroided,
            polarity: frame.polarity,
            scan_definition: scan_definition.clone(),
            mz_range: context.mz_range,
            mobility: mobilities.get(i).copied().unwrap_or(0.0),
            mobility_type: MobilityType::Tims,
        });
    }

    if scans.is_empty() {
        FrameDecode::Empty
    } else {
        FrameDecode::Scans(scans)
    }
}

/// Rebuild the mobility-resolved scans of a frame.
///
/// `sub_scans` must hold one entry per sub-scan of the frame and `mobilities` the
/// 1/K0 of each sub-scan index. `precursors` are the PASEF selections of the
/// frame, consulted for MS levels of 2 and above.
pub fn reconstruct_frame_scans(
    frame: &FrameDescriptor,
    context: &ScanContext,
    sub_scans: LoadedSubScans,
    mobilities: &[f64],
    precursors: &[PrecursorInfo],
) -> FrameDecode {
    if let Some(skipped) = check_loaded_sub_scans(frame, &sub_scans) {
        return skipped;
    }

    let ms_level = ms_level_from_msms_type(frame.msms_type);
    let scan_definition = context.scan_definition(frame.scan_mode);

    build_scans(
        frame,
        context,
        sub_scans,
        mobilities,
        ms_level,
        scan_definition,
        |sub_scan| {
            if ms_level < 2 {
                return (0.0, 0);
            }
            match precursor_at_scan(precursors, sub_scan) {
                Some(info) => (info.largest_peak_mz, info.charge),
                None => {
                    log::debug!(
                        "No precursor info for sub-scan {} of frame {}",
                        sub_scan,
                        frame.id
                    );
                    (0.0, 0)
                }
            }
        },
    )
}

/// Rebuild the scans of a MALDI imaging frame.
///
/// The scan definition carries the spot coordinates, the MS level is always 1
/// and no precursor is attached.
pub fn reconstruct_maldi_frame_scans(
    frame: &FrameDescriptor,
    context: &ScanContext,
    spot: &MaldiSpot,
    sub_scans: LoadedSubScans,
    mobilities: &[f64],
) -> FrameDecode {
    if let Some(skipped) = check_loaded_sub_scans(frame, &sub_scans) {
        return skipped;
    }

    let scan_definition = format!("x: {} y: {}", spot.x_index, spot.y_index);
    build_scans(frame, context, sub_scans, mobilities, 1, scan_definition, |_| (0.0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Polarity, SpectralArrays};

    fn frame(num_scans: u32, msms_type: u32) -> FrameDescriptor {
        FrameDescriptor {
            id: 5,
            num_scans,
            first_scan_number: 101,
            time: 120.0,
            polarity: Polarity::Positive,
            scan_mode: 8,
            msms_type,
            accumulation_time: 100.0,
        }
    }

    fn context() -> ScanContext {
        ScanContext::new("timsTOF Pro", MzRange::new(100.0, 1700.0))
    }

    fn three_sub_scans() -> LoadedSubScans {
        vec![
            SpectralArrays::new(vec![200.0, 300.0], vec![5.0, 6.0]),
            SpectralArrays::empty(),
            SpectralArrays::new(vec![400.0], vec![7.0]),
        ]
        .into()
    }

    #[test]
    fn test_empty_sub_scan_consumes_scan_number() {
        let decode = reconstruct_frame_scans(
            &frame(3, 0),
            &context(),
            three_sub_scans(),
            &[1.3, 1.2, 1.1],
            &[],
        );
        let scans = decode.scans();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].scan_number, 101);
        assert_eq!(scans[1].scan_number, 103);
        assert_eq!(scans[1].mobility, 1.1);
        assert_eq!(scans[0].ms_level, 1);
        assert_eq!(scans[0].retention_time, 2.0);
        assert_eq!(scans[0].scan_definition, "timsTOF Pro - PASEF");
        assert_eq!(scans[0].data_points.len(), 2);
    }

    #[test]
    fn test_scan_count_mismatch_is_skipped() {
        let mut sub_scans = three_sub_scans().spectra;
        sub_scans.pop();
        let decode = reconstruct_frame_scans(&frame(3, 0), &context(), sub_scans.into(), &[], &[]);
        assert_eq!(decode, FrameDecode::Skipped { declared: 3, decoded: 2 });
    }

    #[test]
    fn test_all_empty_sub_scans() {
        let sub_scans = vec![SpectralArrays::empty(); 4];
        let decode = reconstruct_frame_scans(&frame(4, 0), &context(), sub_scans.into(), &[0.0; 4], &[]);
        assert_eq!(decode, FrameDecode::Empty);
    }

    #[test]
    fn test_unreadable_frame_is_skipped_not_empty() {
        let sub_scans = LoadedSubScans {
            spectra: vec![SpectralArrays::empty(); 4],
            read_count: 0,
        };
        let decode = reconstruct_frame_scans(&frame(4, 0), &context(), sub_scans.clone(), &[0.0; 4], &[]);
        assert_eq!(decode, FrameDecode::Skipped { declared: 4, decoded: 0 });

        let spot = MaldiSpot {
            frame_id: 5,
            spot_name: "R00X001Y001".to_string(),
            x_index: 1,
            y_index: 1,
        };
        let decode = reconstruct_maldi_frame_scans(&frame(4, 0), &context(), &spot, sub_scans, &[0.0; 4]);
        assert!(decode.is_skipped());
    }

    #[test]
    fn test_precursor_attached_to_fragment_scans() {
        let precursors = vec![PrecursorInfo {
            frame_id: 5,
            precursor_id: 9,
            scan_num_begin: 2,
            scan_num_end: 3,
            isolation_mz: 650.0,
            isolation_width: 2.0,
            collision_energy: 25.0,
            largest_peak_mz: 650.3,
            charge: 2,
        }];
        let decode = reconstruct_frame_scans(
            &frame(3, 8),
            &context(),
            three_sub_scans(),
            &[1.3, 1.2, 1.1],
            &precursors,
        );
        let scans = decode.scans();
        assert_eq!(scans[0].ms_level, 2);
        assert_eq!((scans[0].precursor_mz, scans[0].precursor_charge), (0.0, 0));
        assert_eq!((scans[1].precursor_mz, scans[1].precursor_charge), (650.3, 2));
    }

    #[test]
    fn test_unknown_msms_type_keeps_level_zero() {
        let decode = reconstruct_frame_scans(&frame(3, 99), &context(), three_sub_scans(), &[], &[]);
        assert!(decode.scans().iter().all(|s| s.ms_level == 0 && s.mobility == 0.0));
    }

    #[test]
    fn test_maldi_scan_definition() {
        let spot = MaldiSpot {
            frame_id: 5,
            spot_name: "R00X003Y004".to_string(),
            x_index: 3,
            y_index: 4,
        };
        let decode = reconstruct_maldi_frame_scans(
            &frame(3, 8),
            &context(),
            &spot,
            three_sub_scans(),
            &[1.0, 1.0, 1.0],
        );
        let scans = decode.scans();
        assert_eq!(scans[0].scan_definition, "x: 3 y: 4");
        assert_eq!(scans[0].ms_level, 1);
        assert_eq!(scans[0].precursor_charge, 0);
    }
}
