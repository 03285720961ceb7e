//! Field-of-view calibration.
//!
//! [`phase_correlate`] estimates the integer-pixel translation between two
//! frames; [`measure_field_of_view`] drives the stage through two small
//! round-trip moves and turns the measured offsets into a per-axis pixel
//! scale and physical footprint.

mod calibrate;
mod phase;

pub use calibrate::{measure_field_of_view, FovError, FovParams};
pub use phase::{phase_correlate, Displacement, PhaseCorrelator};
