//! Core data structures shared by the decoder, the reconstructor and the extractors.

use serde::{Deserialize, Serialize};

// ============================================================================
// Peaks
// ============================================================================

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub mz: f64,
    pub intensity: f64,
}

impl DataPoint {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self { mz, intensity }
    }
}

/// Parallel m/z and intensity arrays of one mobility sub-scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralArrays {
    pub mzs: Vec<f64>,
    pub intensities: Vec<f64>,
}

impl SpectralArrays {
    pub fn new(mzs: Vec<f64>, intensities: Vec<f64>) -> Self {
        Self { mzs, intensities }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }

    pub fn to_data_points(&self) -> Vec<DataPoint> {
        self.mzs
            .iter()
            .zip(self.intensities.iter())
            .map(|(&mz, &intensity)| DataPoint { mz, intensity })
            .collect()
    }
}

/// Raw content of one sub-scan as laid out in the native scan buffer.
/// Indices are instrument coordinates, not masses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSubScan {
    pub indices: Vec<u32>,
    pub intensities: Vec<u32>,
}

impl RawSubScan {
    pub fn peak_count(&self) -> usize {
        self.indices.len()
    }
}

// ============================================================================
// Native extraction results
// ============================================================================

/// Merged centroided spectrum returned by the native whole-frame or
/// PASEF precursor extraction routines.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CentroidData {
    pub mzs: Vec<f64>,
    pub intensities: Vec<f32>,
}

impl CentroidData {
    pub fn to_data_points(&self) -> Vec<DataPoint> {
        self.mzs
            .iter()
            .zip(self.intensities.iter())
            .map(|(&mz, &intensity)| DataPoint::new(mz, intensity as f64))
            .collect()
    }
}

/// Summed profile intensities on the frame's index grid.
///
/// The native profile routine is known to yield wrong m/z values once the grid
/// is mapped to masses; treat anything derived from it as experimental.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileData {
    pub intensities: Vec<i32>,
}

// ============================================================================
// Scan attributes
// ============================================================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum Polarity {
    #[strum(serialize = "+")]
    Positive,
    #[strum(serialize = "-")]
    Negative,
    #[strum(serialize = "?")]
    Unknown,
}

impl Polarity {
    /// Parses the single-character code stored in the `Frames.Polarity` column.
    pub fn from_single_char(code: &str) -> Self {
        match code.trim() {
            "+" | "p" | "P" => Polarity::Positive,
            "-" | "n" | "N" => Polarity::Negative,
            _ => Polarity::Unknown,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectrumType {
    Centroided,
    Profile,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobilityType {
    Tims,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MzRange {
    pub min_mz: f64,
    pub max_mz: f64,
}

impl MzRange {
    pub fn new(min_mz: f64, max_mz: f64) -> Self {
        Self { min_mz, max_mz }
    }
}

// ============================================================================
// Metadata records
// ============================================================================

/// One row of the `Frames` table, enriched with the number of the first scan
/// of the frame in the run-wide scan numbering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub id: i64,
    pub num_scans: u32,
    pub first_scan_number: u32,
    /// Retention time in seconds
    pub time: f64,
    pub polarity: Polarity,
    pub scan_mode: u32,
    pub msms_type: u32,
    /// Accumulation time in milliseconds
    pub accumulation_time: f64,
}

impl FrameDescriptor {
    pub fn retention_time_minutes(&self) -> f64 {
        self.time / 60.0
    }
}

/// Precursor selected in a PASEF MS/MS frame over the sub-scans
/// `scan_num_begin..scan_num_end`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecursorInfo {
    pub frame_id: i64,
    pub precursor_id: i64,
    pub scan_num_begin: u32,
    pub scan_num_end: u32,
    pub isolation_mz: f64,
    pub isolation_width: f64,
    pub collision_energy: f64,
    pub largest_peak_mz: f64,
    pub charge: u32,
}

impl PrecursorInfo {
    pub fn contains_scan(&self, sub_scan: u32) -> bool {
        sub_scan >= self.scan_num_begin && sub_scan < self.scan_num_end
    }
}

/// Spot coordinates of a MALDI imaging frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaldiSpot {
    pub frame_id: i64,
    pub spot_name: String,
    pub x_index: i32,
    pub y_index: i32,
}

// ============================================================================
// Decoding results
// ============================================================================

/// Mobility-resolved scan rebuilt from one non-empty sub-scan of a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructedScan {
    pub scan_number: u32,
    pub frame_id: i64,
    /// Position of the sub-scan within its frame
    pub mobility_scan_index: u32,
    pub ms_level: u8,
    /// Retention time in minutes
    pub retention_time: f64,
    pub precursor_mz: f64,
    pub precursor_charge: u32,
    pub data_points: Vec<DataPoint>,
    pub spectrum_type: SpectrumType,
    pub polarity: Polarity,
    pub scan_definition: String,
    pub mz_range: MzRange,
    /// 1/K0
    pub mobility: f64,
    pub mobility_type: MobilityType,
}

/// Outcome of decoding the mobility-resolved scans of one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameDecode {
    /// At least one sub-scan carried peaks
    Scans(Vec<ReconstructedScan>),
    /// All sub-scans decoded but none of them carried peaks
    Empty,
    /// The number of decoded sub-scans does not match the frame table
    Skipped { declared: u32, decoded: u32 },
}

impl FrameDecode {
    pub fn scans(&self) -> &[ReconstructedScan] {
        match self {
            FrameDecode::Scans(scans) => scans,
            _ => &[],
        }
    }

    pub fn into_scans(self) -> Vec<ReconstructedScan> {
        match self {
            FrameDecode::Scans(scans) => scans,
            _ => Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FrameDecode::Skipped { .. })
    }
}

/// A whole frame merged into a single spectrum by the native extraction routines.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSpectrum {
    pub frame_id: i64,
    pub ms_level: u8,
    /// Retention time in minutes
    pub retention_time: f64,
    pub polarity: Polarity,
    pub spectrum_type: SpectrumType,
    pub scan_definition: String,
    pub mz_range: MzRange,
    pub accumulation_time: f64,
    pub data_points: Vec<DataPoint>,
    /// 1/K0 of every sub-scan of the frame
    pub mobilities: Vec<f64>,
    pub mobility_type: MobilityType,
    /// Pixel coordinates for imaging frames
    pub coordinates: Option<(i32, i32)>,
}
