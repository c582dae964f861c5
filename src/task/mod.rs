//! Batch conversion task.

mod init;
mod options;

pub use init::{
    convert_nd2_init_task, plate_layouts, InitArgs, InitOutput, Nd2InputModel,
    ParallelizationEntry, PlateLayout, WellLayout, TMP_DIR_NAME,
};
pub use options::{
    AdvancedOptions, TilingMode, DEFAULT_C_CHUNK, DEFAULT_MAX_XY_CHUNK, DEFAULT_NUM_LEVELS,
    DEFAULT_T_CHUNK, DEFAULT_Z_CHUNK,
};
