use serde::{Deserialize, Serialize};
use tilescan_core::FieldOfView;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::grid::{TileGrid, TileTarget};
use crate::{cell_count, grid_dims, PlanError};

/// Axis-aligned scan region with an optional working focus height.
///
/// Accepts the `slide_*` key names written by the region calibration tool.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanRegion {
    #[serde(alias = "slide_center_x")]
    pub center_x: f64,
    #[serde(alias = "slide_center_y")]
    pub center_y: f64,
    #[serde(alias = "slide_width")]
    pub width: f64,
    #[serde(alias = "slide_height")]
    pub height: f64,
    #[serde(default, alias = "optimal_z_position", alias = "focus_height")]
    pub focus_z: Option<f64>,
}

/// Per-axis step for a given overlap: `fov * (1 - overlap / 100)`.
pub fn overlap_step(fov: &FieldOfView, overlap_percent: f64) -> Result<(f64, f64), PlanError> {
    if !(0.0..100.0).contains(&overlap_percent) {
        return Err(PlanError::InvalidOverlap(overlap_percent));
    }
    let usable = |d: f64| d.is_finite() && d > 0.0;
    if !usable(fov.width) || !usable(fov.height) {
        return Err(PlanError::InvalidFieldOfView {
            width: fov.width,
            height: fov.height,
        });
    }
    let factor = (100.0 - overlap_percent) / 100.0;
    Ok((fov.width * factor, fov.height * factor))
}

/// Plan a grid centered on the region so neighboring frames overlap by
/// `overlap_percent`.
///
/// Row 0 sits at the lowest y; column 0 at the lowest x.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(fov)))]
pub fn plan_rect_grid(
    region: &ScanRegion,
    fov: &FieldOfView,
    overlap_percent: f64,
) -> Result<TileGrid, PlanError> {
    let usable = |d: f64| d.is_finite() && d > 0.0;
    if !usable(region.width) || !usable(region.height) {
        return Err(PlanError::EmptyRegion {
            width: region.width,
            height: region.height,
        });
    }
    let (step_x, step_y) = overlap_step(fov, overlap_percent)?;
    let (columns, rows) = grid_dims(
        cell_count(region.width, step_x).max(1.0),
        cell_count(region.height, step_y).max(1.0),
    )?;

    let start_x = region.center_x - (columns - 1) as f64 * step_x / 2.0;
    let start_y = region.center_y - (rows - 1) as f64 * step_y / 2.0;

    let mut targets = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        for column in 0..columns {
            targets.push(TileTarget {
                column,
                row,
                x: start_x + column as f64 * step_x,
                y: start_y + row as f64 * step_y,
                focus_z: region.focus_z,
            });
        }
    }

    log::info!(
        "rect plan: {columns} x {rows} targets, step {step_x:.3} x {step_y:.3}, overlap {overlap_percent}%"
    );
    Ok(TileGrid {
        columns,
        rows,
        step_x,
        step_y,
        targets,
    })
}
