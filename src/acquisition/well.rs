//! Well coordinates encoded in plate filenames.
//!
//! Plate acquisitions name each file after its well, e.g.
//! `WellB02_ChannelSD DAPI- EM,SD GFP - EM_Seq0000.nd2` is row `B`, column 2.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AcquisitionError;

/// Row letter followed by the column number, anywhere in the stem
const WELL_PATTERN: &str = r"Well([A-Z])([0-9]+)";

/// Position of a well on a plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WellCoordinate {
    /// Row letter (`A`-`Z`)
    pub row: char,

    /// Column number as written in the filename (leading zeros dropped)
    pub column: u32,
}

impl fmt::Display for WellCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

fn well_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(WELL_PATTERN).ok()).as_ref()
}

/// Extract the well coordinate from a filename.
///
/// Only the file stem is searched, so directories named like wells do not
/// count.
///
/// # Errors
/// `WellInfoMissing` when the stem contains no `Well<Row><Column>` marker.
pub fn parse_well_info(filename: impl AsRef<Path>) -> Result<WellCoordinate, AcquisitionError> {
    let filename = filename.as_ref();
    let missing = || AcquisitionError::WellInfoMissing(filename.display().to_string());

    let stem = filename
        .file_stem()
        .map(|s| s.to_string_lossy())
        .ok_or_else(missing)?;
    let captures = well_regex()
        .and_then(|re| re.captures(&stem))
        .ok_or_else(missing)?;

    let row = captures[1].chars().next().ok_or_else(missing)?;
    let column = captures[2].parse::<u32>().map_err(|_| missing())?;

    Ok(WellCoordinate { row, column })
}
