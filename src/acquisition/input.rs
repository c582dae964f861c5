//! Input path classification.
//!
//! An acquisition is given as a path that is either one ND2 file or a
//! directory of ND2 files. Directories whose files all carry a well marker
//! are plates; any other directory is a flat folder of independent images.

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::well::parse_well_info;
use crate::error::AcquisitionError;

/// File extension of ND2 files (case-sensitive)
pub const ND2_EXTENSION: &str = "nd2";

/// How the files of an acquisition map to outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// One file
    Single,

    /// Directory of unrelated files, one output each
    Folder,

    /// Directory of well-coded files sharing one plate
    Plate,
}

impl AcquisitionMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::Single => "single",
            AcquisitionMode::Folder => "folder",
            AcquisitionMode::Plate => "plate",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified acquisition path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionPath {
    path: PathBuf,
    mode: AcquisitionMode,
    files: Vec<PathBuf>,
}

impl AcquisitionPath {
    /// The path as given.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// ND2 files in lexicographic order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Classify an acquisition path.
///
/// # Errors
/// - `UnsupportedFileKind` for a file without the `.nd2` extension
/// - `NoFilesFound` for a directory without ND2 files
/// - `PathNotFound` for anything that is neither a file nor a directory
pub fn parse_input_path(path: impl AsRef<Path>) -> Result<AcquisitionPath, AcquisitionError> {
    let path = path.as_ref();

    let (files, mode) = if path.is_dir() {
        let files = list_nd2_files(path)?;
        if files.is_empty() {
            return Err(AcquisitionError::NoFilesFound(path.to_path_buf()));
        }

        // All-or-nothing: one file without a well marker makes it a folder
        let mode = if files.iter().all(|f| parse_well_info(f).is_ok()) {
            AcquisitionMode::Plate
        } else {
            AcquisitionMode::Folder
        };
        (files, mode)
    } else if path.is_file() {
        if !has_nd2_extension(path) {
            return Err(AcquisitionError::UnsupportedFileKind(path.to_path_buf()));
        }
        (vec![path.to_path_buf()], AcquisitionMode::Single)
    } else {
        return Err(AcquisitionError::PathNotFound(path.to_path_buf()));
    };

    debug!(
        path = %path.display(),
        mode = %mode,
        files = files.len(),
        "Classified acquisition path"
    );

    Ok(AcquisitionPath {
        path: path.to_path_buf(),
        mode,
        files,
    })
}

fn has_nd2_extension(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(ND2_EXTENSION))
}

fn list_nd2_files(dir: &Path) -> Result<Vec<PathBuf>, AcquisitionError> {
    let io_error = |e: std::io::Error| AcquisitionError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && has_nd2_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
