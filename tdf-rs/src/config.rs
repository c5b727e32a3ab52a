//! Decoder configuration
//!
//! The native scan reader writes into a caller-provided buffer of fixed capacity,
//! so frames are read in batches of sub-scans small enough to fit into it.

use anyhow::bail;
use anyhow_ext::Result;
use serde::{Deserialize, Serialize};

/// Number of sub-scans requested per native read call
pub const DEFAULT_SCANS_PER_BATCH: u32 = 50;

/// Capacity in bytes of the scan buffer handed to the native reader
pub const DEFAULT_BUFFER_CAPACITY: usize = 200_000;

/// Settings for one [`crate::TdfReader`]
///
/// # Example
///
/// ```
/// use tdf::DecoderConfig;
///
/// let config = DecoderConfig::default()
///     .scans_per_batch(10)
///     .buffer_capacity(400_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub scans_per_batch: u32,
    pub buffer_capacity: usize,
    /// Open the acquisition with the recalibrated state when there is one
    pub use_recalibrated_state: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            scans_per_batch: DEFAULT_SCANS_PER_BATCH,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            use_recalibrated_state: true,
        }
    }
}

impl DecoderConfig {
    pub fn scans_per_batch(mut self, scans_per_batch: u32) -> Self {
        self.scans_per_batch = scans_per_batch;
        self
    }

    pub fn buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn use_recalibrated_state(mut self, use_recalibrated_state: bool) -> Self {
        self.use_recalibrated_state = use_recalibrated_state;
        self
    }

    /// Check that a batch's peak-count header always fits into the buffer
    pub fn validate(&self) -> Result<()> {
        if self.scans_per_batch == 0 {
            bail!("scans_per_batch must be greater than zero");
        }
        let header_size = 4 * self.scans_per_batch as usize;
        if self.buffer_capacity < header_size {
            bail!(
                "buffer_capacity ({} bytes) cannot hold the peak counts of {} sub-scans",
                self.buffer_capacity,
                self.scans_per_batch
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.scans_per_batch, 50);
        assert_eq!(config.buffer_capacity, 200_000);
        assert!(config.use_recalibrated_state);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(DecoderConfig::default().scans_per_batch(0).validate().is_err());
        assert!(DecoderConfig::default().scans_per_batch(50).buffer_capacity(199).validate().is_err());
        assert!(DecoderConfig::default().scans_per_batch(50).buffer_capacity(200).validate().is_ok());
    }
}
