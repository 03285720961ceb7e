use std::time::Duration;

use serde::{Deserialize, Serialize};
use tilescan_core::{Axis, Camera, FieldOfView, GrayImage, Rig, RigError, Stage};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::phase::PhaseCorrelator;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FovParams {
    /// Known stage displacement per axis, in stage units.
    pub move_distance: f64,
    pub settle_ms: u64,
}

impl Default for FovParams {
    fn default() -> Self {
        Self {
            move_distance: 5.0,
            settle_ms: 500,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FovError {
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error("move distance must be positive and finite, got {0}")]
    InvalidMoveDistance(f64),
    #[error("frame size {got:?} does not match the reference {expected:?}")]
    FrameSizeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("no measurable displacement along {0}")]
    NoDisplacement(Axis),
}

/// Measure pixels-per-unit on x and y from two round-trip stage moves.
///
/// Captures a reference frame, then per axis: move by `move_distance`,
/// capture, correlate against the reference, move back. Axes are never
/// displaced together. The field of view is derived per axis from the
/// camera's reported sensor size.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(rig)))]
pub fn measure_field_of_view<S: Stage, C: Camera>(
    rig: &mut Rig<S, C>,
    params: &FovParams,
) -> Result<FieldOfView, FovError> {
    let distance = params.move_distance;
    if !(distance.is_finite() && distance > 0.0) {
        return Err(FovError::InvalidMoveDistance(distance));
    }
    let settle = Duration::from_millis(params.settle_ms);
    let sensor = rig.sensor_info()?;
    let reference = rig.capture()?;
    let correlator = PhaseCorrelator::new(reference.width, reference.height);

    let mut scale = [0.0f64; 2];
    for (slot, axis) in [Axis::X, Axis::Y].into_iter().enumerate() {
        let (dx, dy) = match axis {
            Axis::X => (distance, 0.0),
            _ => (0.0, distance),
        };
        rig.move_by(dx, dy, 0.0, settle)?;
        let moved = rig.capture();
        rig.move_by(-dx, -dy, 0.0, settle)?;
        let moved = moved?;

        let pixels = axis_displacement(&correlator, &reference, &moved, axis)?;
        scale[slot] = pixels.abs() / distance;
        log::info!(
            "{axis}: {pixels:+.0} px over {distance} units -> {:.3} px/unit",
            scale[slot]
        );
    }

    let fov = FieldOfView::from_scale(sensor, scale[0], scale[1]);
    log::info!(
        "field of view {:.3} x {:.3} units ({} x {} px)",
        fov.width,
        fov.height,
        fov.pixel_width,
        fov.pixel_height
    );
    Ok(fov)
}

fn axis_displacement(
    correlator: &PhaseCorrelator,
    reference: &GrayImage,
    moved: &GrayImage,
    axis: Axis,
) -> Result<f64, FovError> {
    if moved.dimensions() != reference.dimensions() {
        return Err(FovError::FrameSizeMismatch {
            expected: reference.dimensions(),
            got: moved.dimensions(),
        });
    }
    let d = correlator
        .correlate(&reference.view(), &moved.view())
        .ok_or(FovError::NoDisplacement(axis))?;
    let pixels = if axis == Axis::X { d.dx } else { d.dy };
    if pixels == 0.0 {
        return Err(FovError::NoDisplacement(axis));
    }
    Ok(pixels)
}
