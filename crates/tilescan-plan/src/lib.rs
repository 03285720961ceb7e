//! Tile target planning.
//!
//! Two entry points produce the same row-major [`TileGrid`]:
//! [`plan_quad_grid`] interpolates inside four calibrated corners, and
//! [`plan_rect_grid`] tiles an axis-aligned region from a measured field of
//! view and an overlap percentage.

mod corners;
mod grid;
mod quad;
mod rect;

pub use corners::{CalibratedCorner, CornerId, CornerSet};
pub use grid::{TileGrid, TileTarget};
pub use quad::{plan_quad_grid, quad_grid_size, quad_interp, QuadGridParams};
pub use rect::{overlap_step, plan_rect_grid, ScanRegion};

#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("grid step must be positive and finite, got {0}")]
    InvalidStep(f64),
    #[error("overlap must be in [0, 100), got {0}")]
    InvalidOverlap(f64),
    #[error("scan region must have positive size, got {width} x {height}")]
    EmptyRegion { width: f64, height: f64 },
    #[error("field of view must have positive size, got {width} x {height}")]
    InvalidFieldOfView { width: f64, height: f64 },
    #[error("missing corner {0}")]
    MissingCorner(CornerId),
    #[error("corner {0} given more than once")]
    DuplicateCorner(CornerId),
    #[error("plan needs {0:.0} targets, more than the {MAX_TARGETS} allowed")]
    TooManyTargets(f64),
}

/// Upper bound on targets in one plan.
pub const MAX_TARGETS: usize = 1_000_000;

/// `ceil(length / step)` with a small tolerance so exact multiples that
/// picked up floating-point noise do not gain a cell. Kept in `f64` until
/// [`grid_dims`] has bounded it.
pub(crate) fn cell_count(length: f64, step: f64) -> f64 {
    let n = (length / step - 1e-9).ceil();
    if n > 0.0 {
        n
    } else {
        0.0
    }
}

pub(crate) fn grid_dims(columns: f64, rows: f64) -> Result<(usize, usize), PlanError> {
    let total = columns * rows;
    if total.is_nan() || total > MAX_TARGETS as f64 {
        return Err(PlanError::TooManyTargets(total));
    }
    Ok((columns as usize, rows as usize))
}
