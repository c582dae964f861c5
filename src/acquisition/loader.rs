//! Deferred tile pixel loading.
//!
//! [`Nd2TileLoader`] is only a reference to (file, position). Pixels are read
//! when [`Nd2TileLoader::load`] is called, which the downstream writer does
//! long after the acquisition was parsed. Nothing is cached.
//!
//! The loaded array always has the axes (T, C, Z, Y, X); axes missing from
//! the source get extent 1.

use std::path::{Path, PathBuf};

use ndarray::Array5;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AcquisitionError, Nd2Error};
use crate::format::nd2::{read_attributes, Axis, DataType, Nd2File, Sizes};
use crate::io::{LocalFileReader, RangeReader};

// =============================================================================
// TileData
// =============================================================================

/// Dense (T, C, Z, Y, X) pixel array of one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum TileData {
    Uint8(Array5<u8>),
    Uint16(Array5<u16>),
    Uint32(Array5<u32>),
    Int8(Array5<i8>),
    Int16(Array5<i16>),
    Int32(Array5<i32>),
    Float32(Array5<f32>),
    Float64(Array5<f64>),
}

impl TileData {
    pub fn dtype(&self) -> DataType {
        match self {
            TileData::Uint8(_) => DataType::Uint8,
            TileData::Uint16(_) => DataType::Uint16,
            TileData::Uint32(_) => DataType::Uint32,
            TileData::Int8(_) => DataType::Int8,
            TileData::Int16(_) => DataType::Int16,
            TileData::Int32(_) => DataType::Int32,
            TileData::Float32(_) => DataType::Float32,
            TileData::Float64(_) => DataType::Float64,
        }
    }

    /// Extents in (T, C, Z, Y, X) order.
    pub fn shape(&self) -> [usize; 5] {
        let shape = match self {
            TileData::Uint8(a) => a.shape(),
            TileData::Uint16(a) => a.shape(),
            TileData::Uint32(a) => a.shape(),
            TileData::Int8(a) => a.shape(),
            TileData::Int16(a) => a.shape(),
            TileData::Int32(a) => a.shape(),
            TileData::Float32(a) => a.shape(),
            TileData::Float64(a) => a.shape(),
        };
        [shape[0], shape[1], shape[2], shape[3], shape[4]]
    }
}

/// Component types that can be decoded from little-endian frame bytes.
trait Pixel: Copy + Default {
    const SIZE: usize;

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_pixel {
    ($($t:ty),*) => {
        $(
            impl Pixel for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_pixel!(u8, u16, u32, i8, i16, i32, f32, f64);

// =============================================================================
// Nd2TileLoader
// =============================================================================

/// Reference to the pixels of one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nd2TileLoader {
    path: PathBuf,
    position: Option<usize>,
}

/// Extents and frame selection resolved from the file metadata.
struct LoadPlan {
    position: Option<usize>,
    t: usize,
    c: usize,
    z: usize,
    y: usize,
    x: usize,
}

impl Nd2TileLoader {
    pub fn new(path: impl Into<PathBuf>, position: Option<usize>) -> Self {
        Self {
            path: path.into(),
            position,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage position index, if the file has a position axis.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Pixel data type, read from the image attributes only.
    pub fn dtype(&self) -> Result<DataType, AcquisitionError> {
        LocalFileReader::open(&self.path)
            .map_err(Nd2Error::from)
            .and_then(|reader| read_attributes(&reader))
            .and_then(|attributes| attributes.data_type())
            .map_err(AcquisitionError::nd2(&self.path))
    }

    /// Read the tile pixels as a (T, C, Z, Y, X) array.
    ///
    /// # Errors
    /// - `UnexpectedAxes` when the file has axes outside T, C, Z, Y, X after
    ///   position selection (an unselected position axis included)
    /// - `PositionOutOfRange` when the position index exceeds the stage loop
    /// - `Nd2` for read and decode failures
    pub fn load(&self) -> Result<TileData, AcquisitionError> {
        let file = Nd2File::open(&self.path).map_err(AcquisitionError::nd2(&self.path))?;
        self.load_from(&file)
    }

    /// Read the tile pixels from an already open file.
    pub fn load_from<R: RangeReader>(&self, file: &Nd2File<R>) -> Result<TileData, AcquisitionError> {
        let plan = self.plan(file)?;
        let dtype = file.dtype().map_err(AcquisitionError::nd2(&self.path))?;

        debug!(
            path = %self.path.display(),
            position = ?self.position,
            shape = ?[plan.t, plan.c, plan.z, plan.y, plan.x],
            dtype = %dtype,
            "Loading tile"
        );

        read_tile_data(file, &plan, dtype).map_err(AcquisitionError::nd2(&self.path))
    }

    fn plan<R: RangeReader>(&self, file: &Nd2File<R>) -> Result<LoadPlan, AcquisitionError> {
        let sizes = file.sizes();

        let position = match (sizes.get(Axis::P), self.position) {
            (Some(count), Some(p)) if p >= count => {
                return Err(AcquisitionError::PositionOutOfRange {
                    path: self.path.clone(),
                    index: p,
                    count,
                })
            }
            (Some(_), Some(p)) => Some(p),
            (Some(_), None) => return Err(AcquisitionError::UnexpectedAxes(format_axes(&sizes))),
            (None, Some(p)) if p > 0 => {
                return Err(AcquisitionError::PositionOutOfRange {
                    path: self.path.clone(),
                    index: p,
                    count: 1,
                })
            }
            (None, _) => None,
        };

        let unexpected = sizes
            .axes()
            .any(|axis| !axis.is_image_axis() && !(axis == Axis::P && position.is_some()));
        if unexpected {
            return Err(AcquisitionError::UnexpectedAxes(format_axes(&sizes)));
        }

        Ok(LoadPlan {
            position,
            t: sizes.get_or_one(Axis::T),
            c: file.channels().len().max(1),
            z: sizes.get_or_one(Axis::Z),
            y: sizes.get_or_one(Axis::Y),
            x: sizes.get_or_one(Axis::X),
        })
    }
}

/// Render axes like `(P, C, Y, X)`.
fn format_axes(sizes: &Sizes) -> String {
    let names: Vec<String> = sizes.axes().map(|a| a.to_string()).collect();
    format!("({})", names.join(", "))
}

fn read_tile_data<R: RangeReader>(
    file: &Nd2File<R>,
    plan: &LoadPlan,
    dtype: DataType,
) -> Result<TileData, Nd2Error> {
    let data = match dtype {
        DataType::Uint8 => TileData::Uint8(read_array(file, plan)?),
        DataType::Uint16 => TileData::Uint16(read_array(file, plan)?),
        DataType::Uint32 => TileData::Uint32(read_array(file, plan)?),
        DataType::Int8 => TileData::Int8(read_array(file, plan)?),
        DataType::Int16 => TileData::Int16(read_array(file, plan)?),
        DataType::Int32 => TileData::Int32(read_array(file, plan)?),
        DataType::Float32 => TileData::Float32(read_array(file, plan)?),
        DataType::Float64 => TileData::Float64(read_array(file, plan)?),
    };
    Ok(data)
}

/// Read every (t, z) frame of the plan and scatter its interleaved components
/// into the channel axis.
fn read_array<T: Pixel, R: RangeReader>(
    file: &Nd2File<R>,
    plan: &LoadPlan,
) -> Result<Array5<T>, Nd2Error> {
    let LoadPlan { t, c, z, y, x, .. } = *plan;
    [t, c, z, y, x]
        .iter()
        .try_fold(T::SIZE, |acc, &n| acc.checked_mul(n))
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or_else(|| {
            Nd2Error::InvalidMetadata(format!(
                "tile of shape ({}, {}, {}, {}, {}) is too large",
                t, c, z, y, x
            ))
        })?;
    let mut data = Array5::from_elem((t, c, z, y, x), T::default());
    let components = y * x * c;

    for ti in 0..t {
        for zi in 0..z {
            let mut coords = vec![(Axis::T, ti), (Axis::Z, zi)];
            if let Some(p) = plan.position {
                coords.push((Axis::P, p));
            }
            let index = file.frame_index(&coords);
            let frame = file.read_frame(index)?;

            if frame.len() < components * T::SIZE {
                return Err(Nd2Error::InvalidMetadata(format!(
                    "frame {} holds {} bytes, expected {}",
                    index,
                    frame.len(),
                    components * T::SIZE
                )));
            }

            for (i, bytes) in frame.chunks_exact(T::SIZE).take(components).enumerate() {
                let ci = i % c;
                let pixel = i / c;
                data[[ti, ci, zi, pixel / x, pixel % x]] = T::read_le(bytes);
            }
        }
    }

    Ok(data)
}
