//! Acquisition assembly.
//!
//! Turns an acquisition path into ordered [`TiledImage`] descriptors.
//!
//! # Output Naming
//!
//! | Mode   | Name                                         | Path                                |
//! |--------|----------------------------------------------|-------------------------------------|
//! | plate  | `plate_name` or directory name               | `{name}.zarr/{row}/{col}/{acq_id}`  |
//! | folder | `{plate_name or directory name}_{file stem}` | `{name}.zarr`                       |
//! | single | `plate_name` or file stem                    | `{name}.zarr`                       |
//!
//! Spaces in names become underscores, except for an explicit plate name in
//! plate mode, which is used verbatim.

use std::path::Path;

use tracing::{debug, warn};

use super::image::{PathBuilder, TiledImage};
use super::input::{parse_input_path, AcquisitionMode};
use super::tiles::build_tiles;
use super::well::parse_well_info;
use crate::error::AcquisitionError;
use crate::format::nd2::Nd2File;

/// Build the descriptor of one ND2 file.
///
/// The file is opened for metadata only and closed before returning.
///
/// # Errors
/// - `UnsupportedCombination` when an acquisition id is given for a
///   non-plate image
/// - `WellInfoMissing` in plate mode when the filename has no well marker
/// - `Nd2` / `UnsupportedPositionMetadata` from reading the file
pub fn build_tiled_image(
    nd2_path: &Path,
    zarr_name: &str,
    acquisition_id: Option<u32>,
    plate: bool,
) -> Result<TiledImage, AcquisitionError> {
    let path_builder = if plate {
        let well = parse_well_info(nd2_path)?;
        PathBuilder::Plate {
            plate_name: zarr_name.to_string(),
            row: well.row,
            column: well.column,
            acquisition_id: acquisition_id.unwrap_or(0),
        }
    } else {
        if acquisition_id.is_some() {
            return Err(AcquisitionError::UnsupportedCombination(
                "acquisition_id is not yet supported for non-plate data".to_string(),
            ));
        }
        PathBuilder::Simple {
            path: zarr_name.to_string(),
        }
    };

    let file = Nd2File::open(nd2_path).map_err(AcquisitionError::nd2(nd2_path))?;

    let channel_names = file.channels().iter().map(|c| c.name.clone()).collect();
    let wavelength_ids = file.channels().iter().map(|c| c.wavelength_id()).collect();

    let mut image = TiledImage::new(nd2_path, path_builder, channel_names, wavelength_ids);
    for tile in build_tiles(&file)? {
        image.add_tile(tile);
    }

    debug!(
        file = %nd2_path.display(),
        path = %image.path(),
        tiles = image.tiles().len(),
        "Built tiled image"
    );

    Ok(image)
}

/// Parse an acquisition path into tiled image descriptors, in sorted file
/// order.
///
/// An empty `plate_name` counts as absent. A non-zero `acquisition_id` is
/// discarded with a warning unless the acquisition is a plate; plates default
/// to acquisition 0.
pub fn parse_nd2_acquisition(
    acquisition_path: impl AsRef<Path>,
    plate_name: Option<&str>,
    acquisition_id: Option<u32>,
) -> Result<Vec<TiledImage>, AcquisitionError> {
    let acquisition_path = acquisition_path.as_ref();
    if !acquisition_path.exists() {
        return Err(AcquisitionError::PathNotFound(acquisition_path.to_path_buf()));
    }

    let acquisition = parse_input_path(acquisition_path)?;
    let mode = acquisition.mode();
    let plate_name = plate_name.filter(|name| !name.is_empty());
    let dir_name = stem(acquisition_path);

    let acquisition_id = match (mode, acquisition_id) {
        (AcquisitionMode::Plate, id) => id,
        (_, Some(id)) if id != 0 => {
            warn!(
                path = %acquisition_path.display(),
                acquisition_id = id,
                "acquisition_id is not supported for non-plate data, ignoring it"
            );
            None
        }
        (_, _) => None,
    };

    let mut images = Vec::with_capacity(acquisition.files().len());
    for file in acquisition.files() {
        let zarr_name = match mode {
            AcquisitionMode::Plate => match plate_name {
                Some(name) => name.to_string(),
                None => underscored(&dir_name),
            },
            AcquisitionMode::Folder => {
                let prefix = plate_name.map_or_else(|| dir_name.clone(), str::to_string);
                underscored(&format!("{}_{}", prefix, stem(file)))
            }
            AcquisitionMode::Single => {
                underscored(&plate_name.map_or_else(|| stem(file), str::to_string))
            }
        };

        images.push(build_tiled_image(
            file,
            &zarr_name,
            acquisition_id,
            mode == AcquisitionMode::Plate,
        )?);
    }

    debug!(
        path = %acquisition_path.display(),
        mode = %mode,
        images = images.len(),
        "Parsed acquisition"
    );

    Ok(images)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn underscored(name: &str) -> String {
    name.replace(' ', "_")
}
