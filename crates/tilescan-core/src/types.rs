use serde::{Deserialize, Serialize};

/// Stage coordinates in physical units (millimetres on the reference hardware).
///
/// Upper-case keys (`X`, `Y`, `Z`) are accepted on input for compatibility
/// with corner files written by older calibration tools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePosition {
    #[serde(alias = "X")]
    pub x: f64,
    #[serde(alias = "Y")]
    pub y: f64,
    #[serde(alias = "Z")]
    pub z: f64,
}

impl StagePosition {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Planar (x, y) distance, ignoring the focus axis.
    pub fn planar_distance(&self, other: &StagePosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Linear blend `self * (1 - t) + other * t` on all three axes.
    pub fn lerp(&self, other: &StagePosition, t: f64) -> StagePosition {
        StagePosition {
            x: self.x * (1.0 - t) + other.x * t,
            y: self.y * (1.0 - t) + other.y * t,
            z: self.z * (1.0 - t) + other.z * t,
        }
    }
}

/// Stage axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(s)
    }
}

/// Raw sensor geometry reported by a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub width: usize,
    pub height: usize,
}

/// Measured camera footprint on the specimen plane.
///
/// Pixel scale is kept per axis; non-square pixels are expected.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    /// Footprint width in stage units.
    pub width: f64,
    /// Footprint height in stage units.
    pub height: f64,
    pub pixels_per_unit_x: f64,
    pub pixels_per_unit_y: f64,
    pub pixel_width: usize,
    pub pixel_height: usize,
}

impl FieldOfView {
    /// Derive the physical footprint from a sensor size and per-axis pixel scale.
    pub fn from_scale(sensor: SensorInfo, pixels_per_unit_x: f64, pixels_per_unit_y: f64) -> Self {
        Self {
            width: sensor.width as f64 / pixels_per_unit_x,
            height: sensor.height as f64 / pixels_per_unit_y,
            pixels_per_unit_x,
            pixels_per_unit_y,
            pixel_width: sensor.width,
            pixel_height: sensor.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn upper_case_keys_are_accepted() {
        let p: StagePosition = serde_json::from_str(r#"{"X": 1.5, "Y": -2.0, "Z": 4.25}"#)
            .expect("parse position");
        assert_eq!(p, StagePosition::new(1.5, -2.0, 4.25));
    }

    #[test]
    fn fov_keeps_axes_independent() {
        let fov = FieldOfView::from_scale(
            SensorInfo {
                width: 640,
                height: 480,
            },
            200.0,
            160.0,
        );
        assert_relative_eq!(fov.width, 3.2);
        assert_relative_eq!(fov.height, 3.0);
    }
}
