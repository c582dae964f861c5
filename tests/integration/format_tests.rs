//! ND2 format integration tests.
//!
//! Tests verify:
//! - Synthetic files round-trip through the chunk map and metadata decoders
//! - Experiment loops map to the expected axes and frame order
//! - Lossless frames decode like uncompressed ones
//! - Legacy and malformed files are rejected

use std::fs;

use tempfile::TempDir;

use nd2_omezarr_converter::format::nd2::ExperimentLoop;
use nd2_omezarr_converter::{
    detect_format, Axis, DataType, MemoryReader, Nd2Error, Nd2File, Nd2Format, StagePosition,
};

use super::test_utils::{legacy_nd2, pixel_value, plate_well_builder, Nd2Builder};

fn frame_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_open_plate_well() {
    let data = plate_well_builder().build();
    let reader = MemoryReader::new(data, "well.nd2");
    assert_eq!(detect_format(&reader).unwrap(), Nd2Format::Modern);

    let file = Nd2File::from_reader("well.nd2", reader).unwrap();
    assert_eq!(file.dtype().unwrap(), DataType::Uint16);
    assert_eq!(file.frame_count(), 6);
    assert_eq!(file.attributes().bits_per_component_significant, 12);

    let sizes = file.sizes();
    assert_eq!(
        sizes.iter().collect::<Vec<_>>(),
        vec![(Axis::P, 6), (Axis::C, 2), (Axis::Y, 4), (Axis::X, 8)]
    );

    let names: Vec<&str> = file.channels().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["SD DAPI- EM", "SD GFP - EM"]);
    assert_eq!(file.channels()[0].emission_nm, Some(438.0));
    assert_eq!(file.channels()[1].emission_nm, Some(511.0));

    let voxel = file.voxel_size();
    assert_eq!(voxel.x, 0.65);
    assert_eq!(voxel.y, 0.65);
    assert_eq!(voxel.z, 1.0);
}

#[test]
fn test_positions_and_frame_order() {
    let file = Nd2File::from_reader(
        "tpz.nd2",
        MemoryReader::new(
            Nd2Builder::new()
                .time_points(2)
                .positions(&[(1.0, 2.0, 3.0), (4.0, 5.0, 6.0), (7.0, 8.0, 9.0)])
                .z_stack(2, -1.5)
                .build(),
            "tpz.nd2",
        ),
    )
    .unwrap();

    assert_eq!(
        file.sizes().axes().collect::<Vec<_>>(),
        vec![Axis::T, Axis::P, Axis::Z, Axis::Y, Axis::X]
    );
    assert_eq!(file.frame_count(), 12);
    assert_eq!(file.voxel_size().z, 1.5);

    // (t=1, p=2, z=1) -> 1*6 + 2*2 + 1
    assert_eq!(
        file.frame_coords(11),
        vec![(Axis::T, 1), (Axis::P, 2), (Axis::Z, 1)]
    );
    assert_eq!(
        file.frame_index(&[(Axis::T, 1), (Axis::P, 2), (Axis::Z, 1)]),
        11
    );
    assert_eq!(file.frame_index(&[(Axis::P, 1)]), 2);

    let position = file.frame_position(2).unwrap();
    assert_eq!((position.x, position.y), (4.0, 5.0));
    assert_eq!(position.name.as_deref(), Some("#2"));
}

#[test]
fn test_single_frame_position_from_picture_metadata() {
    let file = Nd2File::from_reader(
        "single.nd2",
        MemoryReader::new(Nd2Builder::new().stage(12.5, -3.0, 7.0).build(), "single.nd2"),
    )
    .unwrap();

    assert!(file.experiment().is_empty());
    assert_eq!(
        file.frame_position(0).unwrap(),
        StagePosition::new(12.5, -3.0, 7.0)
    );
    assert!(matches!(
        file.frame_position(1),
        Err(Nd2Error::FrameOutOfRange { index: 1, count: 1 })
    ));
}

#[test]
fn test_valid_mask_filters_points() {
    let file = Nd2File::from_reader(
        "mask.nd2",
        MemoryReader::new(
            Nd2Builder::new()
                .positions(&[(1.0, 1.0, 0.0), (2.0, 2.0, 0.0), (3.0, 3.0, 0.0)])
                .valid_mask(&[1, 1, 0])
                .build(),
            "mask.nd2",
        ),
    )
    .unwrap();

    match &file.experiment()[0] {
        ExperimentLoop::Positions { points } => assert_eq!(points.len(), 2),
        other => panic!("expected positions, got {:?}", other),
    }
}

#[test]
fn test_compressed_metadata() {
    let file = Nd2File::from_reader(
        "compressed.nd2",
        MemoryReader::new(
            Nd2Builder::new()
                .channels(&[("Cy5", Some(672.0))])
                .calibration(0.1)
                .compressed_metadata()
                .build(),
            "compressed.nd2",
        ),
    )
    .unwrap();

    assert_eq!(file.channels()[0].name, "Cy5");
    assert_eq!(file.channels()[0].wavelength_id(), "672.0");
    assert_eq!(file.voxel_size().x, 0.1);
}

#[test]
fn test_uncalibrated_defaults_to_one() {
    let file = Nd2File::from_reader(
        "uncal.nd2",
        MemoryReader::new(Nd2Builder::new().calibration(0.0).build(), "uncal.nd2"),
    )
    .unwrap();

    let voxel = file.voxel_size();
    assert_eq!((voxel.x, voxel.y, voxel.z), (1.0, 1.0, 1.0));
}

// =============================================================================
// Frames
// =============================================================================

#[test]
fn test_read_frame_strips_padding() {
    // 5 px * 2 bytes = 10 bytes per row, stored with a 12-byte stride
    let builder = Nd2Builder::new().size(5, 3).time_points(2);
    let file = Nd2File::from_reader("pad.nd2", MemoryReader::new(builder.build(), "pad.nd2")).unwrap();
    assert_eq!(file.attributes().width_bytes, 12);

    let frame = frame_u16(&file.read_frame(1).unwrap());
    assert_eq!(frame.len(), 15);
    assert_eq!(frame[0], pixel_value(1, 0, 0, 0));
    assert_eq!(frame[7], pixel_value(1, 0, 1, 2));
    assert_eq!(frame[14], pixel_value(1, 0, 2, 4));
}

#[test]
fn test_lossless_frames_match_uncompressed() {
    let builder = Nd2Builder::new()
        .size(7, 3)
        .channels(&[("A", None), ("B", None)])
        .z_stack(3, 2.0);

    let raw = Nd2File::from_reader("raw.nd2", MemoryReader::new(builder.build(), "raw.nd2")).unwrap();
    let packed = Nd2File::from_reader(
        "zip.nd2",
        MemoryReader::new(builder.clone().lossless().build(), "zip.nd2"),
    )
    .unwrap();

    for index in 0..3 {
        assert_eq!(raw.read_frame(index).unwrap(), packed.read_frame(index).unwrap());
    }
}

#[test]
fn test_read_frame_out_of_range() {
    let file = Nd2File::from_reader("a.nd2", MemoryReader::new(Nd2Builder::new().build(), "a.nd2")).unwrap();
    assert!(matches!(
        file.read_frame(5),
        Err(Nd2Error::FrameOutOfRange { index: 5, .. })
    ));
}

// =============================================================================
// Rejected Files
// =============================================================================

#[test]
fn test_legacy_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("old.nd2");
    fs::write(&path, legacy_nd2()).unwrap();

    assert!(matches!(Nd2File::open(&path), Err(Nd2Error::LegacyFormat)));
}

#[test]
fn test_missing_chunk_map_rejected() {
    let mut data = Nd2Builder::new().build();
    let len = data.len();
    data[len - 20] ^= 0xFF;

    assert!(matches!(
        Nd2File::from_reader("broken.nd2", MemoryReader::new(data, "broken.nd2")),
        Err(Nd2Error::InvalidChunkMap(_))
    ));
}

#[test]
fn test_not_an_nd2_file() {
    let result = Nd2File::from_reader(
        "text.nd2",
        MemoryReader::new(b"hello world, not a microscope file".to_vec(), "text.nd2"),
    );
    assert!(matches!(result, Err(Nd2Error::InvalidMagic(_))));
}

#[test]
fn test_open_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Nd2File::open(dir.path().join("missing.nd2")),
        Err(Nd2Error::Io(_))
    ));
}
