//! Conversion init task.
//!
//! Parses every requested acquisition, checks that the batch can be written
//! as a whole and hands one parallelization entry per image to the writer.
//!
//! ```text
//! zarr_dir/
//! ├── _nd2_converter_tmp/
//! │   ├── 0000_test_plate.zarr_B_2_1.json   (serialized TiledImage)
//! │   └── ...
//! └── test_plate.zarr/B/2/1                 (zarr_url, written later)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::options::AdvancedOptions;
use crate::acquisition::{parse_nd2_acquisition, PathBuilder, TiledImage};
use crate::error::TaskError;

/// Directory under `zarr_dir` holding serialized descriptors
pub const TMP_DIR_NAME: &str = "_nd2_converter_tmp";

// =============================================================================
// Models
// =============================================================================

/// One acquisition to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nd2InputModel {
    /// ND2 file, or directory of ND2 files
    pub path: PathBuf,

    /// Output name; inferred from the file or directory name when absent
    #[serde(default)]
    pub plate_name: Option<String>,

    /// Acquisition round within a plate
    #[serde(default)]
    pub acquisition_id: u32,
}

impl Nd2InputModel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            plate_name: None,
            acquisition_id: 0,
        }
    }
}

/// Arguments of the per-image conversion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitArgs {
    /// Serialized [`TiledImage`] descriptor
    pub tiled_image_path: PathBuf,
    pub overwrite: bool,
    pub advanced_options: AdvancedOptions,
}

/// One image to convert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelizationEntry {
    /// Output location of the image
    pub zarr_url: PathBuf,
    pub init_args: InitArgs,
}

/// Acquisitions written to one well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellLayout {
    pub row: char,
    pub column: u32,
    pub acquisitions: Vec<u32>,
}

/// Wells of one plate, for the plate initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateLayout {
    pub name: String,
    pub wells: Vec<WellLayout>,
}

/// Result of the init task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitOutput {
    pub parallelization_list: Vec<ParallelizationEntry>,

    /// Present when every image belongs to a plate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plates: Vec<PlateLayout>,
}

// =============================================================================
// Task
// =============================================================================

/// Prepare the conversion of a batch of acquisitions.
///
/// # Errors
/// - `NoAcquisitions` for an empty batch
/// - `InvalidOptions` when the advanced options fail validation
/// - `MixedAcquisitionKinds` when plates and standalone images are mixed
/// - `OutputExists` when an output is present and `overwrite` is off
/// - `Acquisition` when parsing any acquisition fails
pub fn convert_nd2_init_task(
    zarr_dir: &Path,
    acquisitions: &[Nd2InputModel],
    overwrite: bool,
    advanced_options: &AdvancedOptions,
) -> Result<InitOutput, TaskError> {
    if acquisitions.is_empty() {
        return Err(TaskError::NoAcquisitions);
    }
    advanced_options
        .validate()
        .map_err(TaskError::InvalidOptions)?;

    if !zarr_dir.exists() {
        info!(path = %zarr_dir.display(), "Creating directory");
        fs::create_dir_all(zarr_dir).map_err(io_error(zarr_dir))?;
    }

    let mut images: Vec<TiledImage> = Vec::new();
    for acquisition in acquisitions {
        let parsed = parse_nd2_acquisition(
            &acquisition.path,
            acquisition.plate_name.as_deref(),
            Some(acquisition.acquisition_id),
        )?;

        if parsed.is_empty() {
            warn!(path = %acquisition.path.display(), "No images found");
            continue;
        }
        images.extend(parsed);
    }

    let plate_count = images.iter().filter(|image| image.is_plate()).count();
    if plate_count > 0 && plate_count < images.len() {
        return Err(TaskError::MixedAcquisitionKinds);
    }

    let zarr_urls: Vec<PathBuf> = images.iter().map(|image| zarr_dir.join(image.path())).collect();
    if !overwrite {
        if let Some(existing) = zarr_urls.iter().find(|url| url.exists()) {
            return Err(TaskError::OutputExists(existing.clone()));
        }
    }

    let tmp_dir = zarr_dir.join(TMP_DIR_NAME);
    fs::create_dir_all(&tmp_dir).map_err(io_error(&tmp_dir))?;

    let mut parallelization_list = Vec::with_capacity(images.len());
    for (index, (image, zarr_url)) in images.iter().zip(zarr_urls).enumerate() {
        let tiled_image_path = tmp_dir.join(descriptor_file_name(index, image));
        let json =
            serde_json::to_vec_pretty(image).map_err(|e| TaskError::Serialize(e.to_string()))?;
        fs::write(&tiled_image_path, json).map_err(io_error(&tiled_image_path))?;

        debug!(
            zarr_url = %zarr_url.display(),
            descriptor = %tiled_image_path.display(),
            "Prepared image"
        );

        parallelization_list.push(ParallelizationEntry {
            zarr_url,
            init_args: InitArgs {
                tiled_image_path,
                overwrite,
                advanced_options: advanced_options.clone(),
            },
        });
    }
    info!(images = parallelization_list.len(), "Total images to convert");

    let plates = if plate_count > 0 {
        let plates = plate_layouts(&images);
        info!(
            path = %zarr_dir.display(),
            plates = plates.len(),
            "Prepared plate layouts"
        );
        plates
    } else {
        Vec::new()
    };

    Ok(InitOutput {
        parallelization_list,
        plates,
    })
}

/// Group plate images into plates and wells, sorted by name and position.
pub fn plate_layouts(images: &[TiledImage]) -> Vec<PlateLayout> {
    let mut plates: BTreeMap<&str, BTreeMap<(char, u32), BTreeSet<u32>>> = BTreeMap::new();

    for image in images {
        if let PathBuilder::Plate {
            plate_name,
            row,
            column,
            acquisition_id,
        } = image.path_builder()
        {
            plates
                .entry(plate_name.as_str())
                .or_default()
                .entry((*row, *column))
                .or_default()
                .insert(*acquisition_id);
        }
    }

    plates
        .into_iter()
        .map(|(name, wells)| PlateLayout {
            name: name.to_string(),
            wells: wells
                .into_iter()
                .map(|((row, column), acquisitions)| WellLayout {
                    row,
                    column,
                    acquisitions: acquisitions.into_iter().collect(),
                })
                .collect(),
        })
        .collect()
}

fn descriptor_file_name(index: usize, image: &TiledImage) -> String {
    format!("{:04}_{}.json", index, image.path().replace(['/', ' '], "_"))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TaskError + '_ {
    move |e| TaskError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
