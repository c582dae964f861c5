//! Acquisition parsing.
//!
//! ```text
//!  acquisition path
//!        │
//!        ▼
//!  parse_input_path ──▶ (files, single | folder | plate)
//!        │
//!        ▼  per file
//!  build_tiled_image ──▶ Nd2File ──▶ channels + build_tiles
//!        │
//!        ▼
//!  Vec<TiledImage>   (tiles carry an Nd2TileLoader for later loading)
//! ```

mod image;
mod input;
mod loader;
mod parse;
mod tiles;
mod well;

pub use image::{PathBuilder, TiledImage};
pub use input::{parse_input_path, AcquisitionMode, AcquisitionPath, ND2_EXTENSION};
pub use loader::{Nd2TileLoader, TileData};
pub use parse::{build_tiled_image, parse_nd2_acquisition};
pub use tiles::{build_tiles, AcquisitionMetadata, PixelSize, Point, Tile, Tiles, Vector};
pub use well::{parse_well_info, WellCoordinate};
