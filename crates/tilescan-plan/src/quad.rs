use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::corners::CornerSet;
use crate::grid::{TileGrid, TileTarget};
use crate::{cell_count, grid_dims, PlanError};

/// Spacing for quadrilateral planning, in stage units.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadGridParams {
    pub step_x: f64,
    pub step_y: f64,
}

impl Default for QuadGridParams {
    fn default() -> Self {
        Self {
            step_x: 1.0,
            step_y: 1.0,
        }
    }
}

/// Grid dimensions for a corner set: edge length / step, rounded up, plus one.
///
/// Width is measured along the bottom edge, height along the left edge,
/// both in the x/y plane.
pub fn quad_grid_size(corners: &CornerSet, params: &QuadGridParams) -> Result<(usize, usize), PlanError> {
    check_step(params.step_x)?;
    check_step(params.step_y)?;
    let width = corners.bottom_left.planar_distance(&corners.bottom_right);
    let height = corners.bottom_left.planar_distance(&corners.top_left);
    grid_dims(
        cell_count(width, params.step_x) + 1.0,
        cell_count(height, params.step_y) + 1.0,
    )
}

/// Interpolate a `columns x rows` grid inside the quadrilateral.
///
/// A single column or row pins that fraction to zero, so a 1x1 grid is the
/// bottom-left corner.
pub fn quad_interp(corners: &CornerSet, columns: usize, rows: usize) -> Vec<TileTarget> {
    let frac = |i: usize, n: usize| {
        if n > 1 {
            i as f64 / (n - 1) as f64
        } else {
            0.0
        }
    };
    let mut targets = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        let fy = frac(row, rows);
        for column in 0..columns {
            let p = corners.interpolate(frac(column, columns), fy);
            targets.push(TileTarget {
                column,
                row,
                x: p.x,
                y: p.y,
                focus_z: Some(p.z),
            });
        }
    }
    targets
}

/// Plan a row-major grid covering an arbitrarily rotated or skewed region.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(corners)))]
pub fn plan_quad_grid(corners: &CornerSet, params: &QuadGridParams) -> Result<TileGrid, PlanError> {
    let (columns, rows) = quad_grid_size(corners, params)?;
    log::info!("quad plan: {columns} x {rows} targets");
    Ok(TileGrid {
        columns,
        rows,
        step_x: params.step_x,
        step_y: params.step_y,
        targets: quad_interp(corners, columns, rows),
    })
}

fn check_step(step: f64) -> Result<(), PlanError> {
    if step.is_finite() && step > 0.0 {
        Ok(())
    } else {
        Err(PlanError::InvalidStep(step))
    }
}
