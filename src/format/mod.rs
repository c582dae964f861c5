//! Format parsers for Nikon ND2 files.
//!
//! # Format Detection
//!
//! Use [`detect::detect_format`] to identify the container layout of a file.
//! Only the modern chunk-map layout can be opened with [`nd2::Nd2File`].

pub mod detect;
pub mod nd2;

pub use detect::{detect_format, is_nd2_header, Nd2Format};
