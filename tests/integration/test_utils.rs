//! Test utilities for integration tests.
//!
//! This module writes synthetic ND2 files: a CLX Lite encoder for the
//! metadata chunks, a chunk writer with chunk map and file tail, and builders
//! for the acquisition layouts used across the tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;

const CHUNK_MAGIC: u32 = 0x0ABE_CEDA;
const CHUNK_MAP_SIGNATURE: &[u8; 32] = b"ND2 CHUNK MAP SIGNATURE 0000001!";
const FILE_MAP_NAME: &[u8; 32] = b"ND2 FILEMAP SIGNATURE NAME 0001!";

// =============================================================================
// CLX Lite Encoder
// =============================================================================

/// A CLX Lite value.
#[derive(Debug, Clone)]
pub enum Clx {
    Bool(bool),
    U32(u32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Level(Vec<(String, Clx)>),
    /// zlib-compressed run of entries
    Compressed(Vec<(String, Clx)>),
}

/// Build a level from borrowed names.
pub fn level(entries: Vec<(&str, Clx)>) -> Clx {
    Clx::Level(
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|u| u.to_le_bytes())
        .collect()
}

/// Encode a sequence of entries.
pub fn encode(entries: &[(String, Clx)]) -> Vec<u8> {
    entries
        .iter()
        .flat_map(|(name, value)| encode_entry(name, value))
        .collect()
}

fn encode_entry(name: &str, value: &Clx) -> Vec<u8> {
    let type_code = match value {
        Clx::Bool(_) => 1,
        Clx::U32(_) => 3,
        Clx::F64(_) => 6,
        Clx::Str(_) => 8,
        Clx::Bytes(_) => 9,
        Clx::Level(_) => 11,
        Clx::Compressed(_) => 76,
    };

    if let Clx::Compressed(entries) = value {
        let mut out = vec![type_code, 0];
        out.extend_from_slice(&[0u8; 10]);
        out.extend(zlib(&encode(entries)));
        return out;
    }

    let mut out = vec![type_code, (name.encode_utf16().count() + 1) as u8];
    out.extend(utf16z(name));

    match value {
        Clx::Bool(b) => out.push(u8::from(*b)),
        Clx::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Clx::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Clx::Str(s) => out.extend(utf16z(s)),
        Clx::Bytes(bytes) => {
            out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        Clx::Level(children) => {
            out.extend_from_slice(&(children.len() as u32).to_le_bytes());
            let length_at = out.len();
            out.extend_from_slice(&0u64.to_le_bytes());
            out.extend(encode(children));
            let length = out.len() as u64;
            out[length_at..length_at + 8].copy_from_slice(&length.to_le_bytes());
            out.extend(std::iter::repeat(0u8).take(children.len() * 8));
        }
        Clx::Compressed(_) => unreachable!(),
    }
    out
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

// =============================================================================
// Chunk Writer
// =============================================================================

/// Assemble chunks, the chunk map and the file tail.
pub fn write_chunks(chunks: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut file = Vec::new();
    let mut map = Vec::new();

    for (name, data) in chunks {
        let offset = file.len() as u64;
        file.extend_from_slice(&CHUNK_MAGIC.to_le_bytes());
        file.extend_from_slice(&(name.len() as u32).to_le_bytes());
        file.extend_from_slice(&(data.len() as u64).to_le_bytes());
        file.extend_from_slice(name.as_bytes());
        file.extend_from_slice(data);

        map.extend_from_slice(name.as_bytes());
        map.extend_from_slice(&offset.to_le_bytes());
        map.extend_from_slice(&((file.len() as u64) - offset).to_le_bytes());
    }

    let map_offset = file.len() as u64;
    map.extend_from_slice(CHUNK_MAP_SIGNATURE);
    map.extend_from_slice(&map_offset.to_le_bytes());

    file.extend_from_slice(&CHUNK_MAGIC.to_le_bytes());
    file.extend_from_slice(&(FILE_MAP_NAME.len() as u32).to_le_bytes());
    file.extend_from_slice(&(map.len() as u64).to_le_bytes());
    file.extend_from_slice(FILE_MAP_NAME);
    file.extend_from_slice(&map);

    file.extend_from_slice(CHUNK_MAP_SIGNATURE);
    file.extend_from_slice(&map_offset.to_le_bytes());
    file
}

/// A JPEG2000-signature file as written by the first ND2 generation.
pub fn legacy_nd2() -> Vec<u8> {
    let mut data = vec![0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A];
    data.extend_from_slice(&[0u8; 64]);
    data
}

// =============================================================================
// Nd2Builder
// =============================================================================

/// Value stored at (frame, channel, y, x) by [`Nd2Builder`].
pub fn pixel_value(seq: usize, c: usize, y: usize, x: usize) -> u16 {
    (seq * 1000 + c * 100 + y * 10 + x) as u16
}

/// Builder for synthetic 16-bit ND2 files.
///
/// Loops are nested as T, then XY positions, then Z, then the extra loop.
/// Pixel values follow [`pixel_value`].
#[derive(Debug, Clone)]
pub struct Nd2Builder {
    width: usize,
    height: usize,
    channels: Vec<(String, Option<f64>)>,
    declared_components: Option<usize>,
    positions: Vec<(f64, f64, f64)>,
    position_points: bool,
    valid_mask: Option<Vec<u8>>,
    z_count: usize,
    z_step: f64,
    t_count: usize,
    extra_loop: Option<(u32, usize)>,
    calibration: f64,
    stage: (f64, f64, f64),
    lossless: bool,
    compressed_metadata: bool,
}

impl Default for Nd2Builder {
    fn default() -> Self {
        Self {
            width: 6,
            height: 4,
            channels: vec![("Mono".to_string(), Some(520.0))],
            declared_components: None,
            positions: Vec::new(),
            position_points: true,
            valid_mask: None,
            z_count: 1,
            z_step: 0.0,
            t_count: 1,
            extra_loop: None,
            calibration: 0.65,
            stage: (100.0, 200.0, 300.0),
            lossless: false,
            compressed_metadata: false,
        }
    }
}

impl Nd2Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn channels(mut self, channels: &[(&str, Option<f64>)]) -> Self {
        self.channels = channels
            .iter()
            .map(|(name, emission)| (name.to_string(), *emission))
            .collect();
        self
    }

    /// Declare a component count in the attributes that differs from the
    /// channel planes.
    pub fn declared_components(mut self, components: usize) -> Self {
        self.declared_components = Some(components);
        self
    }

    pub fn positions(mut self, positions: &[(f64, f64, f64)]) -> Self {
        self.positions = positions.to_vec();
        self
    }

    /// Write the XY loop without its point list.
    pub fn without_position_points(mut self) -> Self {
        self.position_points = false;
        self
    }

    pub fn valid_mask(mut self, mask: &[u8]) -> Self {
        self.valid_mask = Some(mask.to_vec());
        self
    }

    pub fn z_stack(mut self, count: usize, step: f64) -> Self {
        self.z_count = count;
        self.z_step = step;
        self
    }

    pub fn time_points(mut self, count: usize) -> Self {
        self.t_count = count;
        self
    }

    /// Append a loop of another type inside the Z loop.
    pub fn extra_loop(mut self, loop_type: u32, count: usize) -> Self {
        self.extra_loop = Some((loop_type, count));
        self
    }

    pub fn calibration(mut self, calibration: f64) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn stage(mut self, x: f64, y: f64, z: f64) -> Self {
        self.stage = (x, y, z);
        self
    }

    pub fn lossless(mut self) -> Self {
        self.lossless = true;
        self
    }

    pub fn compressed_metadata(mut self) -> Self {
        self.compressed_metadata = true;
        self
    }

    fn row_stride(&self) -> usize {
        let row = self.width * self.channels.len() * 2;
        row.div_ceil(4) * 4
    }

    /// Number of frames written.
    pub fn frame_count(&self) -> usize {
        let extra = self.extra_loop.map_or(1, |(_, count)| count);
        self.t_count * self.positions.len().max(1) * self.z_count * extra
    }

    fn attributes(&self) -> Vec<(String, Clx)> {
        let components = self.declared_components.unwrap_or(self.channels.len()) as u32;
        let attrs = level(vec![
            ("uiWidth", Clx::U32(self.width as u32)),
            ("uiWidthBytes", Clx::U32(self.row_stride() as u32)),
            ("uiHeight", Clx::U32(self.height as u32)),
            ("uiComp", Clx::U32(components)),
            ("uiBpcInMemory", Clx::U32(16)),
            ("uiBpcSignificant", Clx::U32(12)),
            ("uiSequenceCount", Clx::U32(self.frame_count() as u32)),
            ("ePixelType", Clx::U32(1)),
            ("eCompression", Clx::U32(if self.lossless { 0 } else { 2 })),
            ("uiVirtualComponents", Clx::U32(components)),
        ]);
        vec![("SLxImageAttributes".to_string(), attrs)]
    }

    fn experiment(&self) -> Vec<(String, Clx)> {
        let mut loops: Vec<Vec<(&str, Clx)>> = Vec::new();

        if self.t_count > 1 {
            loops.push(vec![
                ("uiLoopType", Clx::U32(1)),
                (
                    "uLoopPars",
                    level(vec![
                        ("uiCount", Clx::U32(self.t_count as u32)),
                        ("dPeriod", Clx::F64(1000.0)),
                    ]),
                ),
            ]);
        }

        if !self.positions.is_empty() {
            let mut pars = vec![("uiCount", Clx::U32(self.positions.len() as u32))];
            if self.position_points {
                let points = self
                    .positions
                    .iter()
                    .enumerate()
                    .map(|(i, (x, y, z))| {
                        (
                            format!("i{:010}", i),
                            level(vec![
                                ("dPosX", Clx::F64(*x)),
                                ("dPosY", Clx::F64(*y)),
                                ("dPosZ", Clx::F64(*z)),
                                ("dPosName", Clx::Str(format!("#{}", i + 1))),
                            ]),
                        )
                    })
                    .collect();
                pars.push(("Points", Clx::Level(points)));
            }

            let mut xy = vec![("uiLoopType", Clx::U32(2)), ("uLoopPars", level(pars))];
            if let Some(ref mask) = self.valid_mask {
                xy.push(("pItemValid", Clx::Bytes(mask.clone())));
            }
            loops.push(xy);
        }

        if self.z_count > 1 {
            loops.push(vec![
                ("uiLoopType", Clx::U32(4)),
                (
                    "uLoopPars",
                    level(vec![
                        ("uiCount", Clx::U32(self.z_count as u32)),
                        ("dZStep", Clx::F64(self.z_step)),
                    ]),
                ),
            ]);
        }

        if let Some((loop_type, count)) = self.extra_loop {
            loops.push(vec![
                ("uiLoopType", Clx::U32(loop_type)),
                ("uLoopPars", level(vec![("uiCount", Clx::U32(count as u32))])),
            ]);
        }

        // Nest innermost first
        let mut nested: Option<Clx> = None;
        for mut entries in loops.into_iter().rev() {
            let next = match nested.take() {
                Some(inner) => level(vec![("i0000000000", inner)]),
                None => level(Vec::new()),
            };
            entries.push(("ppNextLevelEx", next));
            nested = Some(level(entries));
        }

        match nested {
            Some(root) => vec![("SLxExperiment".to_string(), root)],
            None => Vec::new(),
        }
    }

    fn picture_metadata(&self) -> Vec<(String, Clx)> {
        let planes = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, (name, emission))| {
                let mut plane = vec![("sDescription", Clx::Str(name.clone()))];
                if let Some(nm) = emission {
                    let spectrum = level(vec![
                        ("uiCount", Clx::U32(2)),
                        (
                            "pPoint",
                            level(vec![
                                (
                                    "Point0",
                                    level(vec![
                                        ("dWavelength", Clx::F64(nm - 20.0)),
                                        ("dTValue", Clx::F64(0.1)),
                                    ]),
                                ),
                                (
                                    "Point1",
                                    level(vec![
                                        ("dWavelength", Clx::F64(*nm)),
                                        ("dTValue", Clx::F64(1.0)),
                                    ]),
                                ),
                            ]),
                        ),
                    ]);
                    plane.push((
                        "pFluorescentProbe",
                        level(vec![("m_EmissionSpectrum", spectrum)]),
                    ));
                }
                (format!("a{}", i), level(plane))
            })
            .collect();

        let picture = level(vec![
            ("dCalibration", Clx::F64(self.calibration)),
            ("dXPos", Clx::F64(self.stage.0)),
            ("dYPos", Clx::F64(self.stage.1)),
            ("dZPos", Clx::F64(self.stage.2)),
            (
                "sPicturePlanes",
                level(vec![
                    ("uiCount", Clx::U32(self.channels.len() as u32)),
                    ("sPlaneNew", Clx::Level(planes)),
                ]),
            ),
        ]);

        let entries = vec![("SLxPictureMetadata".to_string(), picture)];
        if self.compressed_metadata {
            vec![(String::new(), Clx::Compressed(entries))]
        } else {
            entries
        }
    }

    fn frame(&self, seq: usize) -> Vec<u8> {
        let components = self.channels.len();
        let stride = self.row_stride();

        let mut pixels = vec![0u8; stride * self.height];
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..components {
                    let at = y * stride + (x * components + c) * 2;
                    pixels[at..at + 2].copy_from_slice(&pixel_value(seq, c, y, x).to_le_bytes());
                }
            }
        }

        let mut data = (seq as f64 * 10.0).to_le_bytes().to_vec();
        if self.lossless {
            data.extend(zlib(&pixels));
        } else {
            data.extend(pixels);
        }
        data
    }

    /// Encode the whole file.
    pub fn build(&self) -> Vec<u8> {
        let mut chunks = vec![(
            "ImageAttributesLV!".to_string(),
            encode(&self.attributes()),
        )];

        let experiment = self.experiment();
        if !experiment.is_empty() {
            chunks.push(("ImageMetadataLV!".to_string(), encode(&experiment)));
        }
        chunks.push((
            "ImageMetadataSeqLV|0!".to_string(),
            encode(&self.picture_metadata()),
        ));

        for seq in 0..self.frame_count() {
            chunks.push((format!("ImageDataSeq|{}!", seq), self.frame(seq)));
        }

        write_chunks(&chunks)
    }

    /// Write the file, creating parent directories.
    pub fn write(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

// =============================================================================
// Acquisition Layouts
// =============================================================================

/// First stage position of the plate fixture.
pub const PLATE_FIRST_POSITION: (f64, f64, f64) = (40162.8, -22751.2, 5720.22);

/// Directory name of the plate fixture.
pub const PLATE_DIR: &str = "20250506_124144_018";

/// Well files of the plate fixture, in sorted order.
pub const PLATE_FILES: [&str; 3] = [
    "WellB02_ChannelSD DAPI- EM,SD GFP - EM_Seq0000.nd2",
    "WellB03_ChannelSD DAPI- EM,SD GFP - EM_Seq0001.nd2",
    "WellC02_ChannelSD DAPI- EM,SD GFP - EM_Seq0002.nd2",
];

/// Directory name of the folder fixture.
pub const FOLDER_DIR: &str = "ND_Acquisitions_nd2";

/// Two-channel, six-position builder used for plate wells.
pub fn plate_well_builder() -> Nd2Builder {
    let (x0, y0, z0) = PLATE_FIRST_POSITION;
    let positions: Vec<(f64, f64, f64)> = (0..6)
        .map(|i| (x0 + 100.0 * (i % 3) as f64, y0 + 100.0 * (i / 3) as f64, z0))
        .collect();

    Nd2Builder::new()
        .size(8, 4)
        .channels(&[("SD DAPI- EM", Some(438.0)), ("SD GFP - EM", Some(511.0))])
        .positions(&positions)
        .stage(x0, y0, z0)
}

/// Write the plate fixture under `root/<dir_name>`.
pub fn create_plate(root: &Path, dir_name: &str) -> PathBuf {
    let dir = root.join(dir_name);
    for name in PLATE_FILES {
        plate_well_builder().write(&dir.join(name));
    }
    dir
}

/// Names of the thirteen folder fixture files, in sorted order.
pub fn folder_file_stems() -> Vec<String> {
    (1..=13).map(|i| format!("{:02}_0c_0z", i)).collect()
}

/// Write the folder fixture (no well markers) under `root/<dir_name>`.
pub fn create_folder(root: &Path, dir_name: &str) -> PathBuf {
    let dir = root.join(dir_name);
    for stem in folder_file_stems() {
        Nd2Builder::new().write(&dir.join(format!("{}.nd2", stem)));
    }
    dir
}
