//! Typed ND2 metadata.
//!
//! Converts decoded CLX Lite trees into the handful of structures the
//! acquisition layer needs: image attributes, experiment loops, channel
//! planes, calibration and stage positions.
//!
//! # Source Sections
//!
//! | Chunk                    | Root entry            | Used for                          |
//! |--------------------------|-----------------------|-----------------------------------|
//! | `ImageAttributesLV!`     | `SLxImageAttributes`  | frame shape, bit depth, layout    |
//! | `ImageMetadataLV!`       | `SLxExperiment`       | time / XY / Z loops               |
//! | `ImageMetadataSeqLV\|0!` | `SLxPictureMetadata`  | calibration, channels, stage pos  |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Nd2Error;

// =============================================================================
// Constants
// =============================================================================

/// Experiment loop over time points
pub const LOOP_TIME: u32 = 1;

/// Experiment loop over stage positions
pub const LOOP_XY_POSITIONS: u32 = 2;

/// Experiment loop over focal planes
pub const LOOP_Z_STACK: u32 = 4;

/// Experiment loop over time with non-equidistant phases
pub const LOOP_NE_TIME: u32 = 8;

const PIXEL_TYPE_UNSIGNED: u32 = 1;
const PIXEL_TYPE_SIGNED: u32 = 2;
const PIXEL_TYPE_FLOAT: u32 = 3;

/// Upper bound on nested experiment levels
const MAX_LOOP_DEPTH: usize = 16;

// =============================================================================
// DataType
// =============================================================================

/// Numeric type of a pixel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Resolve the component type from the in-memory bit depth and the
    /// `ePixelType` attribute.
    pub fn from_pixel_layout(bits: u32, pixel_type: u32) -> Result<Self, Nd2Error> {
        let data_type = match (pixel_type, bits) {
            (PIXEL_TYPE_UNSIGNED, 8) => DataType::Uint8,
            (PIXEL_TYPE_UNSIGNED, 16) => DataType::Uint16,
            (PIXEL_TYPE_UNSIGNED, 32) => DataType::Uint32,
            (PIXEL_TYPE_SIGNED, 8) => DataType::Int8,
            (PIXEL_TYPE_SIGNED, 16) => DataType::Int16,
            (PIXEL_TYPE_SIGNED, 32) => DataType::Int32,
            (PIXEL_TYPE_FLOAT, 32) => DataType::Float32,
            (PIXEL_TYPE_FLOAT, 64) => DataType::Float64,
            _ => return Err(Nd2Error::UnsupportedPixelType { bits, pixel_type }),
        };
        Ok(data_type)
    }

    /// NumPy-style name (`uint16`, `float32`, ...).
    pub const fn name(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Size of one component in bytes.
    pub const fn size(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Frame compression declared in the image attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lossless,
    Lossy,
}

impl Compression {
    fn from_raw(raw: Option<u64>) -> Self {
        match raw {
            Some(0) => Compression::Lossless,
            Some(1) => Compression::Lossy,
            _ => Compression::None,
        }
    }
}

/// Contents of `SLxImageAttributes`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Row stride in bytes (rows may be padded)
    pub width_bytes: u32,

    /// Interleaved components per pixel
    pub component_count: u32,

    /// Bits per component as stored
    pub bits_per_component_in_memory: u32,

    /// Bits per component carrying signal
    pub bits_per_component_significant: u32,

    /// Number of frames in the file
    pub sequence_count: u32,

    /// Raw `ePixelType` (1 unsigned, 2 signed, 3 float)
    pub pixel_type: u32,

    /// Frame compression
    pub compression: Compression,
}

impl Attributes {
    const SECTION: &'static str = "SLxImageAttributes";

    /// Build attributes from a decoded `ImageAttributesLV!` chunk.
    pub fn from_clx(root: &Value) -> Result<Self, Nd2Error> {
        let attrs = section(root, Self::SECTION);
        let field = |name: &'static str| -> Result<u32, Nd2Error> {
            get_u64(attrs, name)
                .map(|v| v as u32)
                .ok_or(Nd2Error::MissingField {
                    section: Self::SECTION,
                    field: name,
                })
        };

        let width = field("uiWidth")?;
        let height = field("uiHeight")?;
        let component_count = field("uiComp")?;
        let bits = field("uiBpcInMemory")?;
        let sequence_count = field("uiSequenceCount")?;

        let pixel_type = get_u64(attrs, "ePixelType")
            .map(|v| v as u32)
            .unwrap_or(PIXEL_TYPE_UNSIGNED);
        let bytes_per_component = bits.div_ceil(8);
        let row_bytes = width
            .checked_mul(component_count)
            .and_then(|v| v.checked_mul(bytes_per_component))
            .ok_or_else(|| {
                Nd2Error::InvalidMetadata(format!(
                    "row of {} x {} components at {} bits overflows",
                    width, component_count, bits
                ))
            })?;
        let width_bytes = get_u64(attrs, "uiWidthBytes")
            .map(|v| v as u32)
            .unwrap_or(row_bytes);

        Ok(Attributes {
            width,
            height,
            width_bytes,
            component_count,
            bits_per_component_in_memory: bits,
            bits_per_component_significant: get_u64(attrs, "uiBpcSignificant")
                .map(|v| v as u32)
                .unwrap_or(bits),
            sequence_count,
            pixel_type,
            compression: Compression::from_raw(get_u64(attrs, "eCompression")),
        })
    }

    /// Component data type.
    pub fn data_type(&self) -> Result<DataType, Nd2Error> {
        DataType::from_pixel_layout(self.bits_per_component_in_memory, self.pixel_type)
    }

    /// Bytes of one unpadded row; bounded by `u32` when built by
    /// [`Attributes::from_clx`].
    pub fn row_bytes(&self) -> usize {
        self.width as usize
            * self.component_count as usize
            * self.bits_per_component_in_memory.div_ceil(8) as usize
    }
}

// =============================================================================
// Axes and Sizes
// =============================================================================

/// Named axis of an ND2 acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    T,
    P,
    Z,
    C,
    Y,
    X,
    /// Loop kind without a standard axis name (spectral, custom, ...)
    Loop(u32),
}

impl Axis {
    /// Whether the axis is one of T, C, Z, Y, X.
    pub const fn is_image_axis(&self) -> bool {
        matches!(self, Axis::T | Axis::C | Axis::Z | Axis::Y | Axis::X)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::T => f.write_str("T"),
            Axis::P => f.write_str("P"),
            Axis::Z => f.write_str("Z"),
            Axis::C => f.write_str("C"),
            Axis::Y => f.write_str("Y"),
            Axis::X => f.write_str("X"),
            Axis::Loop(kind) => write!(f, "L{}", kind),
        }
    }
}

/// Ordered axis extents of an acquisition.
///
/// Loop axes with a single element are squeezed; `Y` and `X` are always
/// present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sizes(Vec<(Axis, usize)>);

impl Sizes {
    pub fn new(entries: Vec<(Axis, usize)>) -> Self {
        Sizes(entries)
    }

    /// Extent of an axis, if present.
    pub fn get(&self, axis: Axis) -> Option<usize> {
        self.0.iter().find(|(a, _)| *a == axis).map(|(_, n)| *n)
    }

    /// Extent of an axis, defaulting to 1 when absent.
    pub fn get_or_one(&self, axis: Axis) -> usize {
        self.get(axis).unwrap_or(1)
    }

    pub fn contains(&self, axis: Axis) -> bool {
        self.get(axis).is_some()
    }

    pub fn axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.0.iter().map(|(a, _)| *a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, usize)> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Sizes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (axis, n)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", axis, n)?;
        }
        f.write_str("}")
    }
}

/// Physical pixel size in µm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// =============================================================================
// Experiment Loops
// =============================================================================

/// A stage coordinate in µm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StagePosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            name: None,
        }
    }

    fn from_point(point: &Value) -> Option<Self> {
        Some(StagePosition {
            x: get_f64(point, "dPosX")?,
            y: get_f64(point, "dPosY")?,
            z: get_f64(point, "dPosZ").unwrap_or(0.0),
            name: get_str(point, "dPosName")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

/// One loop of the acquisition experiment, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentLoop {
    /// XY stage positions with recognized point metadata
    Positions { points: Vec<StagePosition> },

    /// Time lapse (equidistant or not)
    Time { count: usize, period_ms: Option<f64> },

    /// Z stack with its step in µm
    ZStack { count: usize, step_um: f64 },

    /// Any other loop, including XY loops whose points are not recognized
    Other { loop_type: u32, count: usize },
}

impl ExperimentLoop {
    /// Number of elements in the loop.
    pub fn count(&self) -> usize {
        match self {
            ExperimentLoop::Positions { points } => points.len(),
            ExperimentLoop::Time { count, .. }
            | ExperimentLoop::ZStack { count, .. }
            | ExperimentLoop::Other { count, .. } => *count,
        }
    }

    /// Axis the loop contributes to the acquisition shape.
    pub fn axis(&self) -> Axis {
        match self {
            ExperimentLoop::Positions { .. } => Axis::P,
            ExperimentLoop::Time { .. } => Axis::T,
            ExperimentLoop::ZStack { .. } => Axis::Z,
            ExperimentLoop::Other { loop_type, .. } => match *loop_type {
                LOOP_TIME | LOOP_NE_TIME => Axis::T,
                LOOP_XY_POSITIONS => Axis::P,
                LOOP_Z_STACK => Axis::Z,
                other => Axis::Loop(other),
            },
        }
    }

    fn from_clx(loop_type: u32, node: &Value) -> Self {
        let params = node.get("uLoopPars").unwrap_or(&Value::Null);
        let count = get_u64(params, "uiCount").unwrap_or(0) as usize;

        match loop_type {
            LOOP_TIME | LOOP_NE_TIME => ExperimentLoop::Time {
                count,
                period_ms: get_f64(params, "dPeriod"),
            },
            LOOP_Z_STACK => ExperimentLoop::ZStack {
                count,
                step_um: get_f64(params, "dZStep").unwrap_or(0.0).abs(),
            },
            LOOP_XY_POSITIONS => match parse_points(node, params) {
                Some(points) => ExperimentLoop::Positions { points },
                None => ExperimentLoop::Other { loop_type, count },
            },
            other => ExperimentLoop::Other {
                loop_type: other,
                count,
            },
        }
    }
}

/// Build the loop list from a decoded `ImageMetadataLV!` chunk.
///
/// Loops are nested through `ppNextLevelEx`; empty loops are dropped.
pub fn parse_experiment(root: &Value) -> Result<Vec<ExperimentLoop>, Nd2Error> {
    let mut loops = Vec::new();
    let mut node = Some(section(root, "SLxExperiment"));

    while let Some(level) = node {
        let Some(loop_type) = get_u64(level, "uiLoopType") else {
            break;
        };
        if loops.len() >= MAX_LOOP_DEPTH {
            return Err(Nd2Error::InvalidMetadata(format!(
                "experiment nests more than {} loops",
                MAX_LOOP_DEPTH
            )));
        }

        let parsed = ExperimentLoop::from_clx(loop_type as u32, level);
        if parsed.count() > 0 {
            loops.push(parsed);
        }

        node = level
            .get("ppNextLevelEx")
            .and_then(|next| children(next).into_iter().next());
    }

    Ok(loops)
}

/// Stage points of an XY loop, filtered by the validity mask.
fn parse_points(node: &Value, params: &Value) -> Option<Vec<StagePosition>> {
    let raw = children(params.get("Points")?);
    let points: Vec<StagePosition> = raw
        .iter()
        .map(|p| StagePosition::from_point(p))
        .collect::<Option<_>>()?;

    let mask = node
        .get("pItemValid")
        .or_else(|| params.get("pItemValid"))
        .and_then(Value::as_array)
        .filter(|mask| mask.len() == points.len());

    let points: Vec<StagePosition> = match mask {
        Some(mask) => points
            .into_iter()
            .zip(mask)
            .filter(|(_, valid)| valid.as_u64().map_or(true, |v| v != 0))
            .map(|(p, _)| p)
            .collect(),
        None => points,
    };

    (!points.is_empty()).then_some(points)
}

// =============================================================================
// Picture Metadata
// =============================================================================

/// Channel name and emission wavelength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub emission_nm: Option<f64>,
}

impl ChannelInfo {
    /// Wavelength identifier handed to the writer.
    ///
    /// Formatted like a Python float (`438.0`); falls back to the channel name
    /// when no emission wavelength is recorded.
    pub fn wavelength_id(&self) -> String {
        match self.emission_nm {
            Some(nm) => format!("{:?}", nm),
            None => self.name.clone(),
        }
    }
}

/// Contents of `SLxPictureMetadata` relevant for tiling.
#[derive(Debug, Clone, PartialEq)]
pub struct PictureMetadata {
    /// µm per pixel in X and Y, when calibrated
    pub calibration_um: Option<f64>,

    /// Stage position of the first frame
    pub stage_position: StagePosition,

    /// Channel planes in on-disk order
    pub channels: Vec<ChannelInfo>,
}

impl PictureMetadata {
    /// Build picture metadata from a decoded `ImageMetadataSeqLV|0!` chunk.
    pub fn from_clx(root: &Value) -> Result<Self, Nd2Error> {
        let picture = section(root, "SLxPictureMetadata");

        let calibration_um = get_f64(picture, "dCalibration").filter(|c| *c > 0.0);
        let stage_position = StagePosition::new(
            get_f64(picture, "dXPos").unwrap_or(0.0),
            get_f64(picture, "dYPos").unwrap_or(0.0),
            get_f64(picture, "dZPos").unwrap_or(0.0),
        );

        let planes = picture
            .get("sPicturePlanes")
            .and_then(|p| p.get("sPlaneNew").or_else(|| p.get("sPlane")))
            .map(children)
            .unwrap_or_default();

        let channels = planes
            .into_iter()
            .enumerate()
            .map(|(i, plane)| ChannelInfo {
                name: get_str(plane, "sDescription")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Channel {}", i)),
                emission_nm: emission_wavelength(plane),
            })
            .collect();

        Ok(PictureMetadata {
            calibration_um,
            stage_position,
            channels,
        })
    }
}

/// Peak emission of a plane: the fluorescent probe first, then the filters.
fn emission_wavelength(plane: &Value) -> Option<f64> {
    let probe = plane
        .get("pFluorescentProbe")
        .and_then(|probe| probe.get("m_EmissionSpectrum"))
        .and_then(spectrum_peak);

    probe.or_else(|| {
        let filters = plane.get("sFilterPath")?.get("m_pFilter")?;
        children(filters)
            .into_iter()
            .find_map(|filter| filter.get("m_EmissionSpectrum").and_then(spectrum_peak))
    })
}

/// Wavelength of the spectrum point with the highest transmission.
fn spectrum_peak(spectrum: &Value) -> Option<f64> {
    let points = children(spectrum.get("pPoint")?);
    let mut best: Option<(f64, f64)> = None;

    for point in points {
        let Some(wavelength) = get_f64(point, "dWavelength").filter(|w| *w > 0.0) else {
            continue;
        };
        let transmission = get_f64(point, "dTValue").unwrap_or(0.0);
        match best {
            Some((t, _)) if t >= transmission => {}
            _ => best = Some((transmission, wavelength)),
        }
    }

    best.map(|(_, wavelength)| wavelength)
}

// =============================================================================
// Value Helpers
// =============================================================================

/// Named root entry, or the value itself when the root is already unwrapped.
fn section<'a>(root: &'a Value, name: &str) -> &'a Value {
    root.get(name).unwrap_or(root)
}

/// Child objects of a level whose entries are keyed (`i0000000000`, `a0`) or
/// repeated under one name.
fn children(level: &Value) -> Vec<&Value> {
    match level {
        Value::Object(map) => map.values().flat_map(objects).collect(),
        Value::Array(_) => objects(level),
        _ => Vec::new(),
    }
}

fn objects(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| v.is_object()).collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

fn get_u64(obj: &Value, key: &str) -> Option<u64> {
    match obj.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }
}

fn get_f64(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key)?.as_f64()
}

fn get_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key)?.as_str()
}

// =============================================================================
// Tests
// =============================================================================
