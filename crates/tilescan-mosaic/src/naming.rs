//! Per-tile raster file names: `img_x{column}_y{row}.png`.

use std::path::Path;

pub const TILE_EXTENSION: &str = "png";

pub fn tile_filename(column: usize, row: usize) -> String {
    format!("img_x{column}_y{row}.{TILE_EXTENSION}")
}

/// Recover `(column, row)` from a tile file name. Any directory part is ignored.
pub fn parse_tile_filename(path: impl AsRef<Path>) -> Option<(usize, usize)> {
    let path = path.as_ref();
    if !path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(TILE_EXTENSION))
    {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (x, y) = stem.strip_prefix("img_x")?.split_once("_y")?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(x) || !digits(y) {
        return None;
    }
    Some((x.parse().ok()?, y.parse().ok()?))
}
