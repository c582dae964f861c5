//! Modern (chunk map) ND2 container support.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ chunk map    │──▶│ CLX Lite     │──▶│ typed         │
//! │ (file tail)  │   │ variant tree │   │ metadata      │
//! └──────────────┘   └──────────────┘   └───────────────┘
//!        │                                      │
//!        ▼                                      ▼
//!  ImageDataSeq|i!  ───────────────────▶   Nd2File::read_frame
//! ```

mod chunk;
pub mod clx;
mod file;
mod metadata;

pub use chunk::{
    frame_chunk_name, read_chunk, ChunkHeader, ChunkLocation, ChunkMap, ATTRIBUTES_CHUNK,
    CHUNK_HEADER_SIZE, CHUNK_MAGIC, CHUNK_MAP_SIGNATURE, EXPERIMENT_CHUNK, FILE_MAP_NAME,
    PICTURE_METADATA_CHUNK,
};
pub use file::{read_attributes, Nd2File};
pub use metadata::{
    parse_experiment, Attributes, Axis, ChannelInfo, Compression, DataType, ExperimentLoop,
    PictureMetadata, Sizes, StagePosition, VoxelSize, LOOP_NE_TIME, LOOP_TIME, LOOP_XY_POSITIONS,
    LOOP_Z_STACK,
};
