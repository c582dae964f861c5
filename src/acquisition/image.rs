//! Tiled image descriptors.
//!
//! A [`TiledImage`] is everything the downstream writer needs for one ND2
//! file: where the output goes, the channel labels and the ordered tiles.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::tiles::Tile;

/// Relative location of an output image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PathBuilder {
    /// Image inside a plate: `{plate_name}.zarr/{row}/{column}/{acquisition_id}`
    Plate {
        plate_name: String,
        row: char,
        column: u32,
        acquisition_id: u32,
    },

    /// Standalone image: `{path}.zarr`
    Simple { path: String },
}

impl PathBuilder {
    /// Render the relative output path.
    pub fn path(&self) -> String {
        match self {
            PathBuilder::Plate {
                plate_name,
                row,
                column,
                acquisition_id,
            } => format!("{}.zarr/{}/{}/{}", plate_name, row, column, acquisition_id),
            PathBuilder::Simple { path } => format!("{}.zarr", path),
        }
    }
}

/// Descriptor of one output image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiledImage {
    name: PathBuf,
    path_builder: PathBuilder,
    channel_names: Vec<String>,
    wavelength_ids: Vec<String>,
    tiles: Vec<Tile>,
}

impl TiledImage {
    pub fn new(
        name: impl Into<PathBuf>,
        path_builder: PathBuilder,
        channel_names: Vec<String>,
        wavelength_ids: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path_builder,
            channel_names,
            wavelength_ids,
            tiles: Vec::new(),
        }
    }

    pub fn add_tile(&mut self, tile: Tile) {
        self.tiles.push(tile);
    }

    /// Source file of the image.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Relative output path.
    pub fn path(&self) -> String {
        self.path_builder.path()
    }

    pub fn path_builder(&self) -> &PathBuilder {
        &self.path_builder
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn wavelength_ids(&self) -> &[String] {
        &self.wavelength_ids
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_plate(&self) -> bool {
        matches!(self.path_builder, PathBuilder::Plate { .. })
    }
}
