use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading from an acquisition file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system while reading
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(err.to_string())
        } else {
            IoError::File(err.to_string())
        }
    }
}

/// Errors that can occur when parsing ND2 files
#[derive(Debug, Clone, Error)]
pub enum Nd2Error {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid chunk magic at the start of the file or of a chunk
    #[error("Invalid ND2 magic: expected 0x0ABECEDA, got 0x{0:08X}")]
    InvalidMagic(u32),

    /// JPEG2000-based ND2 files predate the chunk map layout
    #[error("Legacy (JPEG2000) ND2 files are not supported")]
    LegacyFormat,

    /// File is too small to contain a chunk map
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Chunk map signature or entries are malformed
    #[error("Invalid chunk map: {0}")]
    InvalidChunkMap(String),

    /// A chunk header or payload is malformed
    #[error("Invalid chunk {name}: {message}")]
    InvalidChunk { name: String, message: String },

    /// A required chunk is not listed in the chunk map
    #[error("Missing chunk: {0}")]
    MissingChunk(String),

    /// CLX Lite metadata could not be decoded
    #[error("Invalid metadata variant: {0}")]
    InvalidVariant(String),

    /// Required metadata field is missing
    #[error("Missing metadata field {field} in {section}")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },

    /// Metadata is present but inconsistent
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Pixel layout has no matching numeric type
    #[error("Unsupported pixel type: {bits} bits per component, pixel type {pixel_type}")]
    UnsupportedPixelType { bits: u32, pixel_type: u32 },

    /// Frame compression scheme cannot be decoded
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// zlib stream could not be inflated
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Frame index beyond the sequence count
    #[error("Frame {index} out of range (sequence count {count})")]
    FrameOutOfRange { index: usize, count: usize },
}

/// Errors raised while classifying, parsing or loading an acquisition
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    /// Input path does not exist
    #[error("File not found: {0}")]
    PathNotFound(PathBuf),

    /// Directory contains no ND2 files
    #[error("No nd2 files found in directory {0}")]
    NoFilesFound(PathBuf),

    /// Single-file input without the ND2 extension
    #[error("File {0} is not an nd2 file")]
    UnsupportedFileKind(PathBuf),

    /// Filename does not follow the `Well<Row><Column>` convention
    #[error("Well info not found in filename {0}")]
    WellInfoMissing(String),

    /// Source declares axes outside T, C, Z, Y, X
    #[error("Data can only have dimensions T, C, Z, Y, X. Found: {0}")]
    UnexpectedAxes(String),

    /// Multi-position file without a recognizable XY position loop
    #[error(
        "The nd2 file {0} contains multiple positions, but no XYPosLoop was found in metadata"
    )]
    UnsupportedPositionMetadata(PathBuf),

    /// Option combination that is rejected for this kind of acquisition
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),

    /// Position index beyond the position loop
    #[error("Position {index} out of range for {path} ({count} positions)")]
    PositionOutOfRange {
        path: PathBuf,
        index: usize,
        count: usize,
    },

    /// Filesystem error while listing or inspecting paths
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// ND2 parsing error for a specific file
    #[error("Failed to read {path}: {source}")]
    Nd2 {
        path: PathBuf,
        #[source]
        source: Nd2Error,
    },
}

impl AcquisitionError {
    pub(crate) fn nd2(path: impl Into<PathBuf>) -> impl FnOnce(Nd2Error) -> Self {
        let path = path.into();
        move |source| AcquisitionError::Nd2 { path, source }
    }
}

/// Errors raised by the conversion init task
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// Task called with an empty acquisition list
    #[error("No acquisitions provided")]
    NoAcquisitions,

    /// Advanced options failed validation
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Some acquisitions are plates and some are not
    #[error(
        "Detected some plate acquisitions and some non-plate acquisitions. \
         This is currently not supported. Please run the task separately for \
         plate and non-plate acquisitions."
    )]
    MixedAcquisitionKinds,

    /// Output store already exists and overwrite is disabled
    #[error("Output {0} already exists (set overwrite to replace it)")]
    OutputExists(PathBuf),

    /// Filesystem error while preparing outputs
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Descriptor could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Parsing an acquisition failed
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}
