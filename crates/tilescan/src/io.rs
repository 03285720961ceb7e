//! File formats: JSON records and 8-bit grayscale rasters.

use std::fs;
use std::path::{Path, PathBuf};

use image::{save_buffer, ExtendedColorType, ImageReader};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::GrayImage;
use crate::mosaic::{parse_tile_filename, MosaicAssembler, MosaicError, MosaicMode, RegistrationParams};
use crate::plan::{CornerSet, ScanRegion};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("{}: {source}", path.display())]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{}: no img_x*_y*.png tiles", .0.display())]
    NoTiles(PathBuf),
    #[error("{}: {source}", path.display())]
    Mosaic {
        path: PathBuf,
        #[source]
        source: MosaicError,
    },
}

fn fs_err(path: &Path) -> impl FnOnce(std::io::Error) -> IoError + '_ {
    move |source| IoError::Fs {
        path: path.to_path_buf(),
        source,
    }
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, IoError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(fs_err(path))?;
    serde_json::from_str(&data).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON, creating parent directories as needed.
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), IoError> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(fs_err(path))
}

/// Corner file: an object keyed by `bottom_left`, `bottom_right`,
/// `top_right` and `top_left`, each `{x, y, z}` or `{X, Y, Z}`.
pub fn load_corners(path: impl AsRef<Path>) -> Result<CornerSet, IoError> {
    load_json(path)
}

/// Region record; the `slide_*` key names are accepted.
pub fn load_region(path: impl AsRef<Path>) -> Result<ScanRegion, IoError> {
    load_json(path)
}

pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, IoError> {
    let path = path.as_ref();
    let image_err = |source| IoError::Image {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(fs_err(path))?
        .decode()
        .map_err(image_err)?
        .to_luma8();
    let (w, h) = img.dimensions();
    Ok(GrayImage {
        width: w as usize,
        height: h as usize,
        data: img.into_raw(),
    })
}

/// Write an 8-bit grayscale raster; the format follows the extension.
pub fn save_gray(path: impl AsRef<Path>, img: &GrayImage) -> Result<(), IoError> {
    let path = path.as_ref();
    ensure_parent(path)?;
    save_buffer(
        path,
        &img.data,
        img.width as u32,
        img.height as u32,
        ExtendedColorType::L8,
    )
    .map_err(|source| IoError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_parent(path: &Path) -> Result<(), IoError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(fs_err(dir)),
        _ => Ok(()),
    }
}

/// A tile raster recovered from a directory.
#[derive(Clone, Debug)]
pub struct TileFile {
    pub column: usize,
    pub row: usize,
    pub path: PathBuf,
}

/// Every `img_x{c}_y{r}.png` in `dir`, sorted row-major.
pub fn list_tiles(dir: impl AsRef<Path>) -> Result<Vec<TileFile>, IoError> {
    let dir = dir.as_ref();
    let mut tiles = Vec::new();
    for entry in fs::read_dir(dir).map_err(fs_err(dir))? {
        let path = entry.map_err(fs_err(dir))?.path();
        if let Some((column, row)) = parse_tile_filename(&path) {
            tiles.push(TileFile { column, row, path });
        }
    }
    tiles.sort_by_key(|t| (t.row, t.column));
    Ok(tiles)
}

/// Assemble a directory of tiles into one composite.
///
/// Grid indices are shifted so the smallest column and row land at the
/// origin. Tiles are placed in row-major order; in registered mode each one
/// is aligned to an already-placed neighbor.
pub fn stitch_tile_dir(
    dir: impl AsRef<Path>,
    mode: MosaicMode,
    params: &RegistrationParams,
) -> Result<MosaicAssembler, IoError> {
    let dir = dir.as_ref();
    let tiles = list_tiles(dir)?;
    let Some(first) = tiles.first() else {
        return Err(IoError::NoTiles(dir.to_path_buf()));
    };
    let (min_c, max_c) = span(tiles.iter().map(|t| t.column));
    let (min_r, max_r) = span(tiles.iter().map(|t| t.row));
    let sample = load_gray(&first.path)?;
    let (w, h) = sample.dimensions();
    let (columns, rows) = (max_c - min_c + 1, max_r - min_r + 1);
    log::info!(
        "stitching {} tiles from {} into a {columns} x {rows} grid of {w} x {h}",
        tiles.len(),
        dir.display()
    );

    let mut assembler = MosaicAssembler::with_params(mode, columns, rows, w, h, params.clone());
    for tile in &tiles {
        let img = load_gray(&tile.path)?;
        assembler
            .place_image(&img, tile.column - min_c, tile.row - min_r)
            .map_err(|source| IoError::Mosaic {
                path: tile.path.clone(),
                source,
            })?;
    }
    Ok(assembler)
}

fn span(values: impl Iterator<Item = usize>) -> (usize, usize) {
    values.fold((usize::MAX, 0), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldOfView, RegistrationOutcome, SensorInfo};
    use crate::mosaic::tile_filename;
    use approx::assert_relative_eq;

    #[test]
    fn corner_file_with_upper_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corners.json");
        fs::write(
            &path,
            r#"{
                "bottom_left":  {"X": 10.0, "Y": 20.0, "Z": 1.5},
                "bottom_right": {"X": 30.0, "Y": 20.0, "Z": 1.5},
                "top_right":    {"X": 30.0, "Y": 35.0, "Z": 1.6},
                "top_left":     {"X": 10.0, "Y": 35.0, "Z": 1.6}
            }"#,
        )
        .unwrap();
        let corners = load_corners(&path).unwrap();
        assert_relative_eq!(corners.top_right.x, 30.0);
        assert_relative_eq!(corners.top_left.z, 1.6);
    }

    #[test]
    fn field_of_view_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/fov.json");
        let fov = FieldOfView::from_scale(
            SensorInfo {
                width: 640,
                height: 480,
            },
            100.0,
            120.0,
        );
        save_json(&path, &fov).unwrap();
        let back: FieldOfView = load_json(&path).unwrap();
        assert_eq!((back.pixel_width, back.pixel_height), (640, 480));
        assert_relative_eq!(back.width, fov.width, epsilon = 1e-12);
        assert_relative_eq!(back.pixels_per_unit_y, 120.0);
    }

    #[test]
    fn malformed_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.json");
        fs::write(&path, "{\"slide_center_x\": 1.0").unwrap();
        let err = load_region(&path).unwrap_err();
        assert!(matches!(err, IoError::Json { .. }));
        assert!(err.to_string().contains("region.json"));
    }

    #[test]
    fn gray_png_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        let img = GrayImage::from_fn(13, 7, |x, y| (x * 17 + y * 5) as u8);
        save_gray(&path, &img).unwrap();
        assert_eq!(load_gray(&path).unwrap(), img);
    }

    #[test]
    fn tile_dir_is_offset_by_minimum_indices() {
        let dir = tempfile::tempdir().unwrap();
        for (c, r) in [(2, 5), (3, 5), (2, 6)] {
            let v = (c * 10 + r) as u8;
            let tile = GrayImage::from_fn(4, 3, |_, _| v);
            save_gray(dir.path().join(tile_filename(c, r)), &tile).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "not a tile").unwrap();

        let asm = stitch_tile_dir(dir.path(), MosaicMode::Naive, &RegistrationParams::default())
            .unwrap();
        let canvas = asm.canvas();
        assert_eq!(canvas.dimensions(), (8, 6));
        assert_eq!(canvas.get(0, 0), 25);
        assert_eq!(canvas.get(4, 0), 35);
        assert_eq!(canvas.get(0, 3), 26);
        assert_eq!(canvas.get(4, 3), 0);
        assert_eq!(asm.outcome(1, 1), None);
        assert_eq!(asm.outcome(0, 1), Some(RegistrationOutcome::Naive));
    }

    #[test]
    fn empty_dir_has_no_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let err = stitch_tile_dir(dir.path(), MosaicMode::Naive, &RegistrationParams::default())
            .unwrap_err();
        assert!(matches!(err, IoError::NoTiles(_)));
    }
}
