//! ND2 file handle.
//!
//! [`Nd2File`] opens a modern ND2 container, decodes the metadata chunks once
//! and then serves frame positions and raw frame buffers on demand.
//!
//! # Frame Order
//!
//! Frames are stored in experiment loop order with the innermost loop varying
//! fastest. Channels are not a loop: all channels of a frame are interleaved
//! per pixel inside the frame buffer.
//!
//! ```text
//! T=2, P=3:   seq 0 -> (t0, p0)   seq 1 -> (t0, p1)   seq 2 -> (t0, p2)
//!             seq 3 -> (t1, p0)   ...
//! ```

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Nd2Error;
use crate::format::detect::{detect_format, Nd2Format};
use crate::io::{LocalFileReader, RangeReader};

use super::chunk::{
    frame_chunk_name, read_chunk, ChunkMap, ATTRIBUTES_CHUNK, EXPERIMENT_CHUNK,
    PICTURE_METADATA_CHUNK,
};
use super::clx;
use super::metadata::{
    parse_experiment, Attributes, Axis, ChannelInfo, Compression, DataType, ExperimentLoop,
    PictureMetadata, Sizes, StagePosition, VoxelSize,
};

/// Bytes of the per-frame timestamp preceding the pixel data
const FRAME_TIMESTAMP_SIZE: usize = 8;

// =============================================================================
// Nd2File
// =============================================================================

/// An open ND2 file with decoded metadata.
pub struct Nd2File<R: RangeReader = LocalFileReader> {
    path: PathBuf,
    reader: R,
    chunk_map: ChunkMap,
    attributes: Attributes,
    experiment: Vec<ExperimentLoop>,
    picture: PictureMetadata,
    channels: Vec<ChannelInfo>,
}

impl Nd2File<LocalFileReader> {
    /// Open an ND2 file from disk.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    /// - `LegacyFormat` for JPEG2000-based files
    /// - any metadata error raised while decoding the header chunks
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Nd2Error> {
        let path = path.as_ref();
        let reader = LocalFileReader::open(path)?;
        Self::from_reader(path, reader)
    }
}

impl<R: RangeReader> Nd2File<R> {
    /// Parse an ND2 file from any range reader.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R) -> Result<Self, Nd2Error> {
        let path = path.into();

        let chunk_map = read_chunk_map(&reader)?;
        let attributes = read_attributes_chunk(&reader, &chunk_map)?;

        let experiment = if chunk_map.contains(EXPERIMENT_CHUNK) {
            parse_experiment(&read_metadata(&reader, &chunk_map, EXPERIMENT_CHUNK)?)?
        } else {
            Vec::new()
        };

        let picture = if chunk_map.contains(PICTURE_METADATA_CHUNK) {
            let root = read_metadata(&reader, &chunk_map, PICTURE_METADATA_CHUNK)?;
            PictureMetadata::from_clx(&root)?
        } else {
            PictureMetadata {
                calibration_um: None,
                stage_position: StagePosition::new(0.0, 0.0, 0.0),
                channels: Vec::new(),
            }
        };

        let channels = resolve_channels(&picture, attributes.component_count as usize)?;
        check_loop_axes(&experiment)?;

        let file = Nd2File {
            path,
            reader,
            chunk_map,
            attributes,
            experiment,
            picture,
            channels,
        };

        let expected_frames: usize = file.loop_extents().iter().product();
        if expected_frames != file.frame_count() {
            debug!(
                path = %file.path.display(),
                expected = expected_frames,
                actual = file.frame_count(),
                "Frame count differs from experiment loops"
            );
        }

        debug!(
            path = %file.path.display(),
            sizes = %file.sizes(),
            frames = file.frame_count(),
            "Opened ND2 file"
        );

        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Experiment loops, outermost first.
    pub fn experiment(&self) -> &[ExperimentLoop] {
        &self.experiment
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn dtype(&self) -> Result<DataType, Nd2Error> {
        self.attributes.data_type()
    }

    /// Number of frames stored in the file.
    pub fn frame_count(&self) -> usize {
        self.attributes.sequence_count as usize
    }

    /// Ordered axis extents: loops with more than one element, then `C` when
    /// there are several channels, then `Y` and `X`.
    pub fn sizes(&self) -> Sizes {
        let mut entries: Vec<(Axis, usize)> = self
            .experiment
            .iter()
            .filter(|l| l.count() > 1)
            .map(|l| (l.axis(), l.count()))
            .collect();

        if self.channels.len() > 1 {
            entries.push((Axis::C, self.channels.len()));
        }
        entries.push((Axis::Y, self.attributes.height as usize));
        entries.push((Axis::X, self.attributes.width as usize));

        Sizes::new(entries)
    }

    /// Physical voxel size in µm.
    ///
    /// X and Y use the calibration (1 when uncalibrated); Z uses the Z loop
    /// step (1 without a Z loop).
    pub fn voxel_size(&self) -> VoxelSize {
        let xy = self.picture.calibration_um.unwrap_or(1.0);
        let z = self
            .experiment
            .iter()
            .find_map(|l| match l {
                ExperimentLoop::ZStack { step_um, .. } if *step_um > 0.0 => Some(*step_um),
                _ => None,
            })
            .unwrap_or(1.0);

        VoxelSize { x: xy, y: xy, z }
    }

    /// Loop coordinates of frame `index`, for loops with more than one element.
    pub fn frame_coords(&self, index: usize) -> Vec<(Axis, usize)> {
        let loops = self.experiment.iter().filter(|l| l.count() > 1);

        loops
            .zip(unravel(index, &self.loop_extents()))
            .map(|(l, i)| (l.axis(), i))
            .collect()
    }

    /// Frame index for the given loop coordinates; missing axes count as 0.
    pub fn frame_index(&self, coords: &[(Axis, usize)]) -> usize {
        let mut index = 0;
        for l in self.experiment.iter().filter(|l| l.count() > 1) {
            let axis = l.axis();
            let i = coords
                .iter()
                .find(|(a, _)| *a == axis)
                .map(|(_, i)| *i)
                .unwrap_or(0);
            index = index * l.count() + i;
        }
        index
    }

    /// Stage position of frame `index`.
    ///
    /// Frames inside an XY loop take their point's position; otherwise the
    /// stage position recorded with the first frame is returned.
    pub fn frame_position(&self, index: usize) -> Result<StagePosition, Nd2Error> {
        if index >= self.frame_count() {
            return Err(Nd2Error::FrameOutOfRange {
                index,
                count: self.frame_count(),
            });
        }

        let point = self.experiment.iter().find_map(|l| match l {
            ExperimentLoop::Positions { points } => Some(points),
            _ => None,
        });

        let position = match point {
            Some(points) if points.len() > 1 => {
                let p = self
                    .frame_coords(index)
                    .into_iter()
                    .find(|(axis, _)| *axis == Axis::P)
                    .map(|(_, i)| i)
                    .unwrap_or(0);
                points[p].clone()
            }
            Some(points) => points[0].clone(),
            None => self.picture.stage_position.clone(),
        };

        Ok(position)
    }

    /// Read frame `index` as packed bytes.
    ///
    /// The result holds `height * width * components` interleaved components
    /// in native little-endian order with row padding removed.
    pub fn read_frame(&self, index: usize) -> Result<Vec<u8>, Nd2Error> {
        if index >= self.frame_count() {
            return Err(Nd2Error::FrameOutOfRange {
                index,
                count: self.frame_count(),
            });
        }

        let name = frame_chunk_name(index);
        let location = self
            .chunk_map
            .get(&name)
            .ok_or_else(|| Nd2Error::MissingChunk(name.clone()))?;
        let data = read_chunk(&self.reader, &name, location)?;

        if data.len() < FRAME_TIMESTAMP_SIZE {
            return Err(Nd2Error::InvalidChunk {
                name,
                message: format!("frame chunk of {} bytes has no pixel data", data.len()),
            });
        }

        let payload: Cow<'_, [u8]> = match self.attributes.compression {
            Compression::None => Cow::Borrowed(&data[FRAME_TIMESTAMP_SIZE..]),
            Compression::Lossless => Cow::Owned(clx::inflate(&data[FRAME_TIMESTAMP_SIZE..])?),
            Compression::Lossy => {
                return Err(Nd2Error::UnsupportedCompression(
                    "lossy frame compression".to_string(),
                ))
            }
        };

        trace!(frame = index, bytes = payload.len(), "Read frame");

        strip_row_padding(
            &payload,
            self.attributes.row_bytes(),
            self.attributes.width_bytes as usize,
            self.attributes.height as usize,
        )
        .map_err(|message| Nd2Error::InvalidChunk { name, message })
    }

    /// Names of all chunks in the file.
    pub fn chunk_names(&self) -> impl Iterator<Item = &str> {
        self.chunk_map.names()
    }

    fn loop_extents(&self) -> Vec<usize> {
        self.experiment
            .iter()
            .filter(|l| l.count() > 1)
            .map(ExperimentLoop::count)
            .collect()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Decode only the image attributes of an ND2 file.
///
/// Reads the chunk map and `ImageAttributesLV!`; experiment and picture
/// metadata are not touched.
pub fn read_attributes<R: RangeReader>(reader: &R) -> Result<Attributes, Nd2Error> {
    let chunk_map = read_chunk_map(reader)?;
    read_attributes_chunk(reader, &chunk_map)
}

fn read_chunk_map<R: RangeReader>(reader: &R) -> Result<ChunkMap, Nd2Error> {
    if detect_format(reader)? == Nd2Format::Legacy {
        return Err(Nd2Error::LegacyFormat);
    }

    let chunk_map = ChunkMap::read(reader)?;
    trace!(chunks = chunk_map.len(), "Read chunk map");
    Ok(chunk_map)
}

fn read_attributes_chunk<R: RangeReader>(
    reader: &R,
    chunk_map: &ChunkMap,
) -> Result<Attributes, Nd2Error> {
    Attributes::from_clx(&read_metadata(reader, chunk_map, ATTRIBUTES_CHUNK)?)
}

fn read_metadata<R: RangeReader>(
    reader: &R,
    chunk_map: &ChunkMap,
    name: &str,
) -> Result<Value, Nd2Error> {
    let location = chunk_map
        .get(name)
        .ok_or_else(|| Nd2Error::MissingChunk(name.to_string()))?;
    let data = read_chunk(reader, name, location)?;

    if data.first() == Some(&b'<') {
        return Err(Nd2Error::InvalidVariant(format!(
            "{} holds XML metadata, which is not supported",
            name
        )));
    }

    clx::decode(&data)
}

/// Channel list matching the component count of each pixel.
fn resolve_channels(
    picture: &PictureMetadata,
    component_count: usize,
) -> Result<Vec<ChannelInfo>, Nd2Error> {
    if picture.channels.is_empty() {
        return Ok((0..component_count)
            .map(|i| ChannelInfo {
                name: format!("Channel {}", i),
                emission_nm: None,
            })
            .collect());
    }

    if picture.channels.len() != component_count {
        return Err(Nd2Error::InvalidMetadata(format!(
            "{} channel planes but {} components per pixel",
            picture.channels.len(),
            component_count
        )));
    }

    Ok(picture.channels.clone())
}

/// Reject experiments where two loops map to the same axis.
fn check_loop_axes(experiment: &[ExperimentLoop]) -> Result<(), Nd2Error> {
    let mut seen = HashSet::new();
    for l in experiment.iter().filter(|l| l.count() > 1) {
        if !seen.insert(l.axis()) {
            return Err(Nd2Error::InvalidMetadata(format!(
                "experiment has more than one {} loop",
                l.axis()
            )));
        }
    }
    Ok(())
}

/// Row-major coordinates of `index` within `extents` (last extent fastest).
fn unravel(mut index: usize, extents: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; extents.len()];
    for (coord, extent) in coords.iter_mut().zip(extents).rev() {
        if *extent > 0 {
            *coord = index % extent;
            index /= extent;
        }
    }
    coords
}

/// Copy `height` rows of `row_bytes` out of a buffer with row stride `stride`.
fn strip_row_padding(
    payload: &[u8],
    row_bytes: usize,
    stride: usize,
    height: usize,
) -> Result<Vec<u8>, String> {
    let stride = stride.max(row_bytes);
    let required = match height {
        0 => 0,
        h => stride * (h - 1) + row_bytes,
    };
    if payload.len() < required {
        return Err(format!(
            "frame holds {} bytes, expected at least {}",
            payload.len(),
            required
        ));
    }

    if stride == row_bytes {
        return Ok(payload[..required].to_vec());
    }

    let mut out = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        out.extend_from_slice(&payload[start..start + row_bytes]);
    }
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
