//! Location of the files of a `.d` acquisition directory

use std::path::{Path, PathBuf};

use anyhow::bail;
use anyhow_ext::Result;

/// SQLite metadata database
pub const TDF_FILE_NAME: &str = "analysis.tdf";
/// Binary frame data read by the calibration engine
pub const TDF_BIN_FILE_NAME: &str = "analysis.tdf_bin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TdfPaths {
    /// The `.d` directory, as handed to the calibration engine
    pub dir: PathBuf,
    pub tdf: PathBuf,
    pub tdf_bin: PathBuf,
}

impl TdfPaths {
    /// Resolve the acquisition files from the `.d` directory or from any file inside it.
    pub fn locate<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let dir = if path.is_dir() {
            path.to_path_buf()
        } else if path.is_file() {
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        } else {
            bail!("{} does not exist", path.display());
        };

        let tdf = dir.join(TDF_FILE_NAME);
        let tdf_bin = dir.join(TDF_BIN_FILE_NAME);

        if !tdf.is_file() {
            bail!("{} does not contain {}", dir.display(), TDF_FILE_NAME);
        }
        if !tdf_bin.is_file() {
            bail!("{} does not contain {}", dir.display(), TDF_BIN_FILE_NAME);
        }

        Ok(Self { dir, tdf, tdf_bin })
    }
}
