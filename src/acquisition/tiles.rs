//! Tile geometry.
//!
//! Each stage position of an acquisition becomes one [`Tile`]: its top-left
//! anchor on the stage, its physical extent and a loader for its pixels.
//!
//! ```text
//!   stage (µm)
//!   ┼────────────────────────────▶ x
//!   │   top_l ┌──────────┐
//!   │         │  tile p  │ diag.y = Y * voxel.y
//!   │         └──────────┘
//!   ▼ y        diag.x = X * voxel.x
//! ```
//!
//! The z anchor is always 0 and the time scale is 1: downstream tile
//! placement only handles planar layouts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::loader::Nd2TileLoader;
use crate::error::{AcquisitionError, Nd2Error};
use crate::format::nd2::{ExperimentLoop, Nd2File, Sizes, StagePosition, VoxelSize, Axis};
use crate::io::RangeReader;

/// Physical seconds per time step
const TIME_SCALE: f64 = 1.0;

// =============================================================================
// Geometry Types
// =============================================================================

/// Anchor of a tile in (x, y, z, c, t).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub c: f64,
    pub t: f64,
}

/// Extent of a tile in (x, y, z, c, t).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub c: f64,
    pub t: f64,
}

/// Physical pixel size in µm per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<VoxelSize> for PixelSize {
    fn from(voxel: VoxelSize) -> Self {
        PixelSize {
            x: voxel.x,
            y: voxel.y,
            z: voxel.z,
        }
    }
}

/// One field of view with its placement and pixel loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub top_l: Point,
    pub diag: Vector,
    pub pixel_size: PixelSize,
    pub data_loader: Nd2TileLoader,
}

// =============================================================================
// AcquisitionMetadata
// =============================================================================

/// Metadata needed to lay out the tiles of one acquisition file.
pub trait AcquisitionMetadata {
    /// Path of the source file, recorded in the tile loaders.
    fn path(&self) -> &Path;

    /// Ordered axis extents.
    fn sizes(&self) -> Sizes;

    /// Physical voxel size in µm.
    fn voxel_size(&self) -> VoxelSize;

    /// Experiment loops, outermost first.
    fn experiment(&self) -> &[ExperimentLoop];

    /// Stage position of a frame.
    fn frame_position(&self, index: usize) -> Result<StagePosition, Nd2Error>;
}

impl<R: RangeReader> AcquisitionMetadata for Nd2File<R> {
    fn path(&self) -> &Path {
        Nd2File::path(self)
    }

    fn sizes(&self) -> Sizes {
        Nd2File::sizes(self)
    }

    fn voxel_size(&self) -> VoxelSize {
        Nd2File::voxel_size(self)
    }

    fn experiment(&self) -> &[ExperimentLoop] {
        Nd2File::experiment(self)
    }

    fn frame_position(&self, index: usize) -> Result<StagePosition, Nd2Error> {
        Nd2File::frame_position(self, index)
    }
}

// =============================================================================
// Tile Building
// =============================================================================

/// One-pass iterator over the tiles of an acquisition file.
///
/// The iterator owns everything it needs; the file may be closed while it is
/// consumed. Rebuild it with [`build_tiles`] to iterate again.
#[derive(Debug)]
pub struct Tiles {
    path: PathBuf,
    anchors: std::vec::IntoIter<(Option<usize>, StagePosition)>,
    diag: Vector,
    pixel_size: PixelSize,
}

impl Iterator for Tiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        let (position, stage) = self.anchors.next()?;
        Some(Tile {
            top_l: Point {
                x: stage.x,
                y: stage.y,
                z: 0.0,
                c: 0.0,
                t: 0.0,
            },
            diag: self.diag,
            pixel_size: self.pixel_size,
            data_loader: Nd2TileLoader::new(self.path.clone(), position),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.anchors.size_hint()
    }
}

impl ExactSizeIterator for Tiles {}

/// Lay out the tiles of an acquisition file.
///
/// Files with a position axis yield one tile per stage point, anchored at the
/// point's (x, y). Other files yield a single tile anchored at the first
/// frame's stage position.
///
/// # Errors
/// - `UnsupportedPositionMetadata` when the file has a position axis but no
///   recognized stage point list
/// - `Nd2` when the first frame position cannot be read
pub fn build_tiles<M: AcquisitionMetadata + ?Sized>(meta: &M) -> Result<Tiles, AcquisitionError> {
    let sizes = meta.sizes();
    let voxel = meta.voxel_size();

    let shape_x = sizes.get_or_one(Axis::X) as f64;
    let shape_y = sizes.get_or_one(Axis::Y) as f64;
    let shape_z = sizes.get_or_one(Axis::Z) as f64;
    let shape_c = sizes.get_or_one(Axis::C) as f64;
    let shape_t = sizes.get_or_one(Axis::T) as f64;

    let diag = Vector {
        x: shape_x * voxel.x,
        y: shape_y * voxel.y,
        z: shape_z * voxel.z,
        c: shape_c,
        t: shape_t * TIME_SCALE,
    };

    let anchors: Vec<(Option<usize>, StagePosition)> = if sizes.contains(Axis::P) {
        let points = meta
            .experiment()
            .iter()
            .find_map(|l| match l {
                ExperimentLoop::Positions { points } => Some(points),
                _ => None,
            })
            .ok_or_else(|| AcquisitionError::UnsupportedPositionMetadata(meta.path().to_path_buf()))?;

        points.iter().cloned().enumerate().map(|(p, point)| (Some(p), point)).collect()
    } else {
        let first = meta
            .frame_position(0)
            .map_err(AcquisitionError::nd2(meta.path()))?;
        vec![(None, first)]
    };

    Ok(Tiles {
        path: meta.path().to_path_buf(),
        anchors: anchors.into_iter(),
        diag,
        pixel_size: voxel.into(),
    })
}
