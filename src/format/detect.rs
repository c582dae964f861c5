//! Format detection for ND2 files.
//!
//! Nikon has shipped two unrelated container layouts under the `.nd2`
//! extension:
//!
//! - **Modern ND2** (v2/v3): a sequence of magic-tagged chunks indexed by a
//!   chunk map at the end of the file. Metadata is stored in the CLX Lite
//!   binary variant.
//! - **Legacy ND2** (v1): a JPEG2000 box container. Not supported.
//!
//! Detection only needs the first four bytes.

use crate::error::Nd2Error;
use crate::io::{read_u32_le, RangeReader};

use super::nd2::CHUNK_MAGIC;

// =============================================================================
// Nd2Format
// =============================================================================

/// Detected container layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nd2Format {
    /// Chunk-map based container (ND2 v2 and v3)
    Modern,

    /// JPEG2000 box container (ND2 v1)
    Legacy,
}

impl Nd2Format {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            Nd2Format::Modern => "ND2 (chunk map)",
            Nd2Format::Legacy => "ND2 (legacy JPEG2000)",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Bytes needed to classify a file.
const MIN_HEADER_BYTES: usize = 4;

/// First word of a JPEG2000 signature box (`00 00 00 0C`) read as little-endian.
const LEGACY_MAGIC: u32 = 0x0C00_0000;

/// Detect the container layout of an ND2 file.
///
/// # Returns
/// * `Ok(Nd2Format)` - The detected layout
/// * `Err(Nd2Error::FileTooSmall)` - Fewer than 4 bytes available
/// * `Err(Nd2Error::InvalidMagic)` - Neither modern nor legacy magic
pub fn detect_format<R: RangeReader>(reader: &R) -> Result<Nd2Format, Nd2Error> {
    if reader.size() < MIN_HEADER_BYTES as u64 {
        return Err(Nd2Error::FileTooSmall {
            required: MIN_HEADER_BYTES as u64,
            actual: reader.size(),
        });
    }

    let header = reader.read_exact_at(0, MIN_HEADER_BYTES)?;
    format_from_magic(read_u32_le(&header))
}

fn format_from_magic(magic: u32) -> Result<Nd2Format, Nd2Error> {
    match magic {
        CHUNK_MAGIC => Ok(Nd2Format::Modern),
        LEGACY_MAGIC => Ok(Nd2Format::Legacy),
        other => Err(Nd2Error::InvalidMagic(other)),
    }
}

/// Check if bytes start with the modern ND2 chunk magic.
///
/// This is a quick check that can be used before attempting full parsing.
pub fn is_nd2_header(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_HEADER_BYTES && read_u32_le(bytes) == CHUNK_MAGIC
}

// =============================================================================
// Tests
// =============================================================================
