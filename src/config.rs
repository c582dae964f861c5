//! Command-line configuration for the ND2 converter.
//!
//! Two subcommands are available:
//! - `inspect` parses one acquisition and prints its tiled image descriptors
//! - `init` runs the conversion init task over one or more acquisitions
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use nd2_omezarr_converter::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.into_command() {
//!     Command::Inspect(config) => println!("Inspecting {}", config.path.display()),
//!     Command::Init(config) => println!("Writing to {}", config.zarr_dir.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! Options can also be set via environment variables with the `ND2_` prefix:
//!
//! - `ND2_PLATE_NAME` - Output name override
//! - `ND2_ACQUISITION_ID` - Acquisition round for plates
//! - `ND2_ZARR_DIR` - Output directory of `init`
//! - `ND2_OVERWRITE` - Replace existing outputs (default: false)
//! - `ND2_NUM_LEVELS` - Pyramid levels (default: 5)
//! - `ND2_TILING_MODE` - auto, grid, free or none (default: auto)
//! - `ND2_SWAP_XY`, `ND2_INVERT_X`, `ND2_INVERT_Y` - Stage axis fixes
//! - `ND2_MAX_XY_CHUNK`, `ND2_Z_CHUNK`, `ND2_C_CHUNK`, `ND2_T_CHUNK` - Chunking

use std::fs;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::task::{
    AdvancedOptions, Nd2InputModel, TilingMode, DEFAULT_C_CHUNK, DEFAULT_MAX_XY_CHUNK,
    DEFAULT_NUM_LEVELS, DEFAULT_T_CHUNK, DEFAULT_Z_CHUNK,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// nd2-omezarr - Parse Nikon ND2 acquisitions for OME-Zarr conversion.
#[derive(Parser, Debug, Clone)]
#[command(name = "nd2-omezarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Resolve the subcommand, propagating global flags into it.
    pub fn into_command(self) -> Command {
        match self.command {
            Command::Inspect(mut config) => {
                config.verbose |= self.verbose;
                Command::Inspect(config)
            }
            Command::Init(mut config) => {
                config.verbose |= self.verbose;
                Command::Init(config)
            }
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse an acquisition and print its tiled image descriptors as JSON.
    Inspect(InspectConfig),

    /// Prepare the conversion of one or more acquisitions.
    Init(InitConfig),
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// ND2 file or directory of ND2 files.
    pub path: PathBuf,

    /// Output name (plate name, or image name for single files).
    #[arg(long, env = "ND2_PLATE_NAME")]
    pub plate_name: Option<String>,

    /// Acquisition round; only used for plates.
    #[arg(long, env = "ND2_ACQUISITION_ID")]
    pub acquisition_id: Option<u32>,

    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    #[arg(skip)]
    pub verbose: bool,
}

impl InspectConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("path must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Init
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InitConfig {
    /// Directory receiving the OME-Zarr outputs.
    #[arg(long, env = "ND2_ZARR_DIR")]
    pub zarr_dir: PathBuf,

    /// JSON file with a list of acquisitions (`path`, `plate_name`, `acquisition_id`).
    #[arg(long, conflicts_with = "path")]
    pub acquisitions: Option<PathBuf>,

    /// Acquisition path; may be repeated.
    #[arg(long, action = ArgAction::Append)]
    pub path: Vec<PathBuf>,

    /// Output name applied to every `--path` acquisition.
    #[arg(long, env = "ND2_PLATE_NAME")]
    pub plate_name: Option<String>,

    /// Acquisition round applied to every `--path` acquisition.
    #[arg(long, default_value_t = 0, env = "ND2_ACQUISITION_ID")]
    pub acquisition_id: u32,

    /// Replace existing outputs.
    #[arg(long, default_value_t = false, env = "ND2_OVERWRITE")]
    pub overwrite: bool,

    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    #[command(flatten)]
    pub advanced: AdvancedArgs,

    #[arg(skip)]
    pub verbose: bool,
}

impl InitConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.acquisitions.is_none() && self.path.is_empty() {
            return Err(
                "No acquisitions given. Set --acquisitions <JSON> or at least one --path"
                    .to_string(),
            );
        }
        self.advanced.to_options().validate()
    }

    /// Acquisitions from the JSON file, or one per `--path`.
    pub fn input_models(&self) -> Result<Vec<Nd2InputModel>, String> {
        if let Some(ref file) = self.acquisitions {
            let text = fs::read_to_string(file)
                .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
            return serde_json::from_str(&text)
                .map_err(|e| format!("Invalid acquisitions in {}: {}", file.display(), e));
        }

        Ok(self
            .path
            .iter()
            .map(|path| Nd2InputModel {
                path: path.clone(),
                plate_name: self.plate_name.clone(),
                acquisition_id: self.acquisition_id,
            })
            .collect())
    }
}

/// Writer options of `init`.
#[derive(Args, Debug, Clone)]
pub struct AdvancedArgs {
    /// Number of resolution levels in the pyramid.
    #[arg(long, default_value_t = DEFAULT_NUM_LEVELS, env = "ND2_NUM_LEVELS")]
    pub num_levels: u32,

    /// Tiling mode used when placing tiles.
    #[arg(long, value_enum, default_value_t = TilingMode::Auto, env = "ND2_TILING_MODE")]
    pub tiling_mode: TilingMode,

    /// Swap x and y stage coordinates.
    #[arg(long, default_value_t = false, env = "ND2_SWAP_XY")]
    pub swap_xy: bool,

    /// Invert x stage coordinates.
    #[arg(long, default_value_t = false, env = "ND2_INVERT_X")]
    pub invert_x: bool,

    /// Invert y stage coordinates (`--invert-y=false` to disable).
    #[arg(
        long,
        default_value_t = true,
        env = "ND2_INVERT_Y",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub invert_y: bool,

    /// Upper bound for the XY chunk size.
    #[arg(long, default_value_t = DEFAULT_MAX_XY_CHUNK, env = "ND2_MAX_XY_CHUNK")]
    pub max_xy_chunk: u32,

    /// Z chunk size.
    #[arg(long, default_value_t = DEFAULT_Z_CHUNK, env = "ND2_Z_CHUNK")]
    pub z_chunk: u32,

    /// C chunk size.
    #[arg(long, default_value_t = DEFAULT_C_CHUNK, env = "ND2_C_CHUNK")]
    pub c_chunk: u32,

    /// T chunk size.
    #[arg(long, default_value_t = DEFAULT_T_CHUNK, env = "ND2_T_CHUNK")]
    pub t_chunk: u32,
}

impl AdvancedArgs {
    pub fn to_options(&self) -> AdvancedOptions {
        AdvancedOptions {
            num_levels: self.num_levels,
            tiling_mode: self.tiling_mode,
            swap_xy: self.swap_xy,
            invert_x: self.invert_x,
            invert_y: self.invert_y,
            max_xy_chunk: self.max_xy_chunk,
            z_chunk: self.z_chunk,
            c_chunk: self.c_chunk,
            t_chunk: self.t_chunk,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
