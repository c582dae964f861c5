//! # ND2 OME-Zarr Converter
//!
//! Parses Nikon ND2 microscopy acquisitions into tiled image descriptors for
//! conversion to OME-Zarr.
//!
//! The library reads ND2 files natively and describes every output image
//! without loading pixel data: where it goes, which channels it has and where
//! each stage position sits. Pixels are loaded later, per tile, by the writer.
//!
//! ## Features
//!
//! - **Native ND2 reader**: chunk map, CLX Lite metadata, raw and zlib frames
//! - **Acquisition layouts**: single files, folders and well-coded plates
//! - **Deferred loading**: tiles carry a small loader, never pixel data
//! - **Init task**: validates a batch and writes descriptor hand-off files
//!
//! ## Architecture
//!
//! - [`io`] - Synchronous range readers over files and memory
//! - [`mod@format`] - ND2 container, metadata decoding and frame access
//! - [`acquisition`] - Input classification, tile geometry and descriptors
//! - [`task`] - Batch init task and writer options
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use nd2_omezarr_converter::parse_nd2_acquisition;
//!
//! let images = parse_nd2_acquisition("/data/20250506_124144_018", Some("test_plate"), Some(1))?;
//! for image in &images {
//!     println!("{} ({} tiles)", image.path(), image.tiles().len());
//! }
//! # Ok::<(), nd2_omezarr_converter::AcquisitionError>(())
//! ```

pub mod acquisition;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod task;

// Re-export commonly used types
pub use acquisition::{
    build_tiled_image, build_tiles, parse_input_path, parse_nd2_acquisition, parse_well_info,
    AcquisitionMetadata, AcquisitionMode, AcquisitionPath, Nd2TileLoader, PathBuilder, PixelSize,
    Point, Tile, TileData, TiledImage, Tiles, Vector, WellCoordinate,
};
pub use config::{AdvancedArgs, Cli, Command, InitConfig, InspectConfig};
pub use error::{AcquisitionError, IoError, Nd2Error, TaskError};
pub use format::nd2::{
    read_attributes, Attributes, Axis, ChannelInfo, Compression, DataType, ExperimentLoop, Nd2File, Sizes,
    StagePosition, VoxelSize,
};
pub use format::{detect_format, is_nd2_header, Nd2Format};
pub use io::{LocalFileReader, MemoryReader, RangeReader};
pub use task::{
    convert_nd2_init_task, AdvancedOptions, InitOutput, Nd2InputModel, ParallelizationEntry,
    PlateLayout, TilingMode,
};
