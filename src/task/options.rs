//! Conversion options handed through to the image writer.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of pyramid levels.
pub const DEFAULT_NUM_LEVELS: u32 = 5;

/// Default upper bound for the XY chunk size.
pub const DEFAULT_MAX_XY_CHUNK: u32 = 4096;

/// Default Z chunk size.
pub const DEFAULT_Z_CHUNK: u32 = 10;

/// Default C chunk size.
pub const DEFAULT_C_CHUNK: u32 = 1;

/// Default T chunk size.
pub const DEFAULT_T_CHUNK: u32 = 1;

// =============================================================================
// TilingMode
// =============================================================================

/// How tile positions are reconciled when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TilingMode {
    /// Let the writer decide
    #[default]
    Auto,

    /// Snap tiles to a regular grid
    Grid,

    /// Remove overlaps by snapping to corners
    Free,

    /// Use stage positions as recorded
    None,
}

impl fmt::Display for TilingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TilingMode::Auto => "auto",
            TilingMode::Grid => "grid",
            TilingMode::Free => "free",
            TilingMode::None => "none",
        };
        f.write_str(name)
    }
}

// =============================================================================
// AdvancedOptions
// =============================================================================

/// Writer options carried by every parallelization entry.
///
/// `invert_y` defaults to `true`, which matches stage coordinates of Nikon
/// spinning-disk systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedOptions {
    /// Number of resolution levels in the pyramid
    pub num_levels: u32,

    pub tiling_mode: TilingMode,

    /// Swap x and y stage coordinates
    pub swap_xy: bool,

    /// Invert x stage coordinates
    pub invert_x: bool,

    /// Invert y stage coordinates
    pub invert_y: bool,

    /// XY chunk size is the smaller of this and the tile size
    pub max_xy_chunk: u32,

    pub z_chunk: u32,
    pub c_chunk: u32,
    pub t_chunk: u32,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            num_levels: DEFAULT_NUM_LEVELS,
            tiling_mode: TilingMode::Auto,
            swap_xy: false,
            invert_x: false,
            invert_y: true,
            max_xy_chunk: DEFAULT_MAX_XY_CHUNK,
            z_chunk: DEFAULT_Z_CHUNK,
            c_chunk: DEFAULT_C_CHUNK,
            t_chunk: DEFAULT_T_CHUNK,
        }
    }
}

impl AdvancedOptions {
    /// Validate the options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_levels == 0 {
            return Err("num_levels must be at least 1".to_string());
        }
        if self.max_xy_chunk == 0 {
            return Err("max_xy_chunk must be greater than 0".to_string());
        }

        for (name, value) in [
            ("z_chunk", self.z_chunk),
            ("c_chunk", self.c_chunk),
            ("t_chunk", self.t_chunk),
        ] {
            if value == 0 {
                return Err(format!("{} must be greater than 0", name));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
