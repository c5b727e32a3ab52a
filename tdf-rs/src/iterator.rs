//! Iteration over the frames of an acquisition
//!
//! Frames are decoded lazily in `Frames` table order. Stopping the iteration
//! between two frames is the way to interrupt a long decoding run.
//!
//! # Example
//! ```no_run
//! use fallible_iterator::FallibleIterator;
//! use tdf::TdfReader;
//! use tdf::engine::SyntheticEngine;
//!
//! let mut reader = TdfReader::open("run.d", SyntheticEngine::new()).unwrap();
//!
//! let mut frames = reader.frames_at_ms_level(1);
//! while let Some(decoded) = frames.next().unwrap() {
//!     println!("Frame {}: {} scans", decoded.frame.id, decoded.decode.scans().len());
//! }
//! ```

use anyhow_ext::{Context, Result};
use fallible_iterator::FallibleIterator;

use crate::TdfReader;
use crate::conversion::ms_level_from_msms_type;
use crate::engine::CalibrationEngine;
use crate::model::{FrameDecode, FrameDescriptor};

/// A frame together with the outcome of decoding its sub-scans
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    pub frame: FrameDescriptor,
    pub decode: FrameDecode,
}

/// Lazy frame decoder borrowing a [`TdfReader`]
pub struct FrameIter<'r, E: CalibrationEngine> {
    reader: &'r mut TdfReader<E>,
    position: usize,
    ms_level: Option<u8>,
}

impl<'r, E: CalibrationEngine> FrameIter<'r, E> {
    /// Create a new frame iterator
    ///
    /// # Arguments
    /// * `reader` - Reader owning the engine handle
    /// * `ms_level` - Optional MS level filter (e.g. Some(1) for MS1 frames only, None for all frames)
    pub fn new(reader: &'r mut TdfReader<E>, ms_level: Option<u8>) -> Self {
        Self {
            reader,
            position: 0,
            ms_level,
        }
    }

    fn next_frame(&mut self) -> Option<FrameDescriptor> {
        let metadata = self.reader.metadata();
        while let Some(frame) = metadata.frames().get(self.position) {
            self.position += 1;
            // MALDI frames are decoded as MS1 whatever their MS/MS type
            let level = if metadata.maldi_spot(frame.id).is_some() {
                1
            } else {
                ms_level_from_msms_type(frame.msms_type)
            };
            if self.ms_level.is_none_or(|wanted| wanted == level) {
                return Some(frame.clone());
            }
        }
        None
    }
}

impl<E: CalibrationEngine> FallibleIterator for FrameIter<'_, E> {
    type Item = DecodedFrame;
    type Error = anyhow::Error;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        let Some(frame) = self.next_frame() else {
            return Ok(None);
        };

        let decode = if self.reader.metadata().maldi_spot(frame.id).is_some() {
            self.reader.decode_maldi_frame(frame.id).dot()?
        } else {
            self.reader.decode_frame(frame.id).dot()?
        };

        Ok(Some(DecodedFrame { frame, decode }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.metadata().frame_count().saturating_sub(self.position);
        (0, Some(remaining))
    }
}

/// Decode every frame, optionally restricted to one MS level, and pass it to `on_each_frame`
pub fn for_each_frame<E, F>(reader: &mut TdfReader<E>, ms_level: Option<u8>, mut on_each_frame: F) -> Result<()>
where
    E: CalibrationEngine,
    F: FnMut(&DecodedFrame) -> Result<()>,
{
    let mut iter = FrameIter::new(reader, ms_level);
    while let Some(decoded) = iter.next().dot()? {
        on_each_frame(&decoded).dot()?;
    }
    Ok(())
}
