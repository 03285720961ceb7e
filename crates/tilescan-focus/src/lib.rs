//! Focus evaluation and focus-axis search.
//!
//! [`laplacian_variance`] is the single sharpness score. [`FocusController`]
//! uses it for per-tile correction (local window search when a tile scores
//! below threshold), two-stage coarse/fine calibration, and manual override.

mod controller;
mod sharpness;
mod sweep;

pub use controller::{FocusController, FocusError, FocusParams, FocusRecord, FocusedFrame};
pub use sharpness::laplacian_variance;
pub use sweep::{select_best, spread_heights, stepped_heights, sweep, FocusSample, SweepOutcome};
