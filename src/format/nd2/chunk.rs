//! ND2 chunk and chunk map parsing.
//!
//! # Chunk Structure
//!
//! ```text
//! Bytes 0-3:   Magic (0x0ABECEDA, little-endian)
//! Bytes 4-7:   Name length in bytes (may include zero padding)
//! Bytes 8-15:  Data length in bytes
//! Bytes 16-..: Name, then data
//! ```
//!
//! # Chunk Map
//!
//! The last 40 bytes of the file hold the chunk map signature followed by the
//! absolute offset of the chunk map chunk. Its data lists every chunk as
//! `name!` + offset (u64) + size (u64), terminated by the signature itself.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::Nd2Error;
use crate::io::{read_u32_le, read_u64_le, RangeReader};

// =============================================================================
// Constants
// =============================================================================

/// Magic number at the start of every chunk
pub const CHUNK_MAGIC: u32 = 0x0ABE_CEDA;

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 16;

/// Signature terminating the chunk map and opening the file tail
pub const CHUNK_MAP_SIGNATURE: &[u8; 32] = b"ND2 CHUNK MAP SIGNATURE 0000001!";

/// Name of the chunk holding the chunk map
pub const FILE_MAP_NAME: &[u8; 32] = b"ND2 FILEMAP SIGNATURE NAME 0001!";

/// Signature + chunk map offset
const TAIL_SIZE: usize = CHUNK_MAP_SIGNATURE.len() + 8;

/// Image attributes (width, height, components, bit depth)
pub const ATTRIBUTES_CHUNK: &str = "ImageAttributesLV!";

/// Experiment loops
pub const EXPERIMENT_CHUNK: &str = "ImageMetadataLV!";

/// Picture metadata (calibration, planes, stage position)
pub const PICTURE_METADATA_CHUNK: &str = "ImageMetadataSeqLV|0!";

/// Name of the chunk holding frame `index`.
pub fn frame_chunk_name(index: usize) -> String {
    format!("ImageDataSeq|{}!", index)
}

// =============================================================================
// ChunkHeader
// =============================================================================

/// Parsed chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Length of the name field in bytes
    pub name_length: u32,

    /// Length of the data field in bytes
    pub data_length: u64,
}

impl ChunkHeader {
    /// Parse a chunk header from at least 16 bytes.
    ///
    /// # Errors
    /// - `FileTooSmall` if fewer than 16 bytes are given
    /// - `InvalidMagic` if the magic number is wrong
    pub fn parse(bytes: &[u8]) -> Result<Self, Nd2Error> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(Nd2Error::FileTooSmall {
                required: CHUNK_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = read_u32_le(&bytes[0..4]);
        if magic != CHUNK_MAGIC {
            return Err(Nd2Error::InvalidMagic(magic));
        }

        Ok(ChunkHeader {
            name_length: read_u32_le(&bytes[4..8]),
            data_length: read_u64_le(&bytes[8..16]),
        })
    }

    /// Absolute offset of the data field for a chunk starting at `chunk_offset`.
    #[inline]
    pub fn data_offset(&self, chunk_offset: u64) -> u64 {
        chunk_offset + CHUNK_HEADER_SIZE as u64 + self.name_length as u64
    }
}

// =============================================================================
// ChunkMap
// =============================================================================

/// Location of a chunk as listed in the chunk map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Absolute offset of the chunk header
    pub offset: u64,

    /// Size recorded in the chunk map
    pub size: u64,
}

/// Index of all chunks in an ND2 file, keyed by chunk name (including the
/// trailing `!`).
#[derive(Debug, Clone, Default)]
pub struct ChunkMap {
    entries: BTreeMap<String, ChunkLocation>,
}

impl ChunkMap {
    /// Locate and parse the chunk map of a file.
    pub fn read<R: RangeReader>(reader: &R) -> Result<Self, Nd2Error> {
        let size = reader.size();
        if size < TAIL_SIZE as u64 {
            return Err(Nd2Error::FileTooSmall {
                required: TAIL_SIZE as u64,
                actual: size,
            });
        }

        let tail = reader.read_exact_at(size - TAIL_SIZE as u64, TAIL_SIZE)?;
        if &tail[..CHUNK_MAP_SIGNATURE.len()] != CHUNK_MAP_SIGNATURE {
            return Err(Nd2Error::InvalidChunkMap(
                "chunk map signature not found at end of file".to_string(),
            ));
        }

        let map_offset = read_u64_le(&tail[CHUNK_MAP_SIGNATURE.len()..]);
        if map_offset >= size {
            return Err(Nd2Error::InvalidChunkMap(format!(
                "chunk map offset {} beyond file size {}",
                map_offset, size
            )));
        }

        let location = ChunkLocation {
            offset: map_offset,
            size: 0,
        };
        let data = read_chunk(reader, "ND2 FILEMAP", location)?;
        Self::parse(&data)
    }

    /// Parse chunk map data.
    pub fn parse(data: &[u8]) -> Result<Self, Nd2Error> {
        let mut entries = BTreeMap::new();
        let mut pos = 0;

        loop {
            let bang = data[pos..]
                .iter()
                .position(|&b| b == b'!')
                .map(|i| pos + i)
                .ok_or_else(|| Nd2Error::InvalidChunkMap("missing terminator".to_string()))?;

            let name = &data[pos..=bang];
            if name == CHUNK_MAP_SIGNATURE {
                break;
            }

            let fields = bang + 1;
            if fields + 16 > data.len() {
                return Err(Nd2Error::InvalidChunkMap(format!(
                    "truncated entry for {}",
                    String::from_utf8_lossy(name)
                )));
            }

            let location = ChunkLocation {
                offset: read_u64_le(&data[fields..fields + 8]),
                size: read_u64_le(&data[fields + 8..fields + 16]),
            };
            entries.insert(String::from_utf8_lossy(name).into_owned(), location);
            pos = fields + 16;
        }

        Ok(ChunkMap { entries })
    }

    /// Look up a chunk by name.
    pub fn get(&self, name: &str) -> Option<ChunkLocation> {
        self.entries.get(name).copied()
    }

    /// Check whether a chunk is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Look up the chunk of frame `index`.
    pub fn frame(&self, index: usize) -> Option<ChunkLocation> {
        self.get(&frame_chunk_name(index))
    }

    /// Number of chunks in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map lists no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate chunk names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// =============================================================================
// Chunk Reading
// =============================================================================

/// Read the data field of the chunk at `location`.
///
/// `name` is only used for error messages.
pub fn read_chunk<R: RangeReader>(
    reader: &R,
    name: &str,
    location: ChunkLocation,
) -> Result<Bytes, Nd2Error> {
    let header_bytes = reader.read_exact_at(location.offset, CHUNK_HEADER_SIZE)?;
    let header = ChunkHeader::parse(&header_bytes).map_err(|e| Nd2Error::InvalidChunk {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let data_length = usize::try_from(header.data_length).map_err(|_| Nd2Error::InvalidChunk {
        name: name.to_string(),
        message: format!("data length {} does not fit in memory", header.data_length),
    })?;

    reader
        .read_exact_at(header.data_offset(location.offset), data_length)
        .map_err(|e| Nd2Error::InvalidChunk {
            name: name.to_string(),
            message: e.to_string(),
        })
}

// =============================================================================
// Tests
// =============================================================================
