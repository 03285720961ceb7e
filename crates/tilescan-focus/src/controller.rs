use std::time::Duration;

use serde::{Deserialize, Serialize};
use tilescan_core::{Camera, GrayImage, Rig, RigError, Stage, StagePosition};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::sharpness::laplacian_variance;
use crate::sweep::{spread_heights, stepped_heights, sweep, FocusSample};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusParams {
    /// Tiles scoring below this trigger a local search.
    pub sharpness_threshold: f64,
    /// Total width of the local window around the planned height.
    pub local_range: f64,
    pub local_step: f64,
    pub local_settle_ms: u64,
    pub coarse_range: f64,
    pub coarse_steps: usize,
    pub fine_range: f64,
    pub fine_steps: usize,
    pub sweep_settle_ms: u64,
}

impl Default for FocusParams {
    fn default() -> Self {
        Self {
            sharpness_threshold: 30.0,
            local_range: 1.0,
            local_step: 0.1,
            local_settle_ms: 200,
            coarse_range: 8.0,
            coarse_steps: 17,
            fine_range: 2.0,
            fine_steps: 21,
            sweep_settle_ms: 500,
        }
    }
}

/// Accepted working focus height for a region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FocusRecord {
    #[serde(alias = "optimal_z_position")]
    pub optimal_z: f64,
    /// `None` when the height was set manually without scoring.
    #[serde(default)]
    pub max_sharpness: Option<f64>,
}

/// A tile frame after focus validation.
#[derive(Clone, Debug)]
pub struct FocusedFrame {
    pub image: GrayImage,
    pub position: StagePosition,
    pub sharpness: f64,
    /// True when a local search replaced the original frame.
    pub corrected: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum FocusError {
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error("focus sweep has no heights to sample")]
    EmptySweep,
}

#[derive(Clone, Debug, Default)]
pub struct FocusController {
    params: FocusParams,
}

impl FocusController {
    pub fn new(params: FocusParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FocusParams {
        &self.params
    }

    pub fn score(&self, image: &GrayImage) -> f64 {
        laplacian_variance(&image.view())
    }

    /// Validate a frame captured at `at`; below threshold, search a narrow
    /// window around `at.z` and keep the sharpest sample and its frame.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, rig, frame)))]
    pub fn correct_tile<S: Stage, C: Camera>(
        &self,
        rig: &mut Rig<S, C>,
        frame: GrayImage,
        at: StagePosition,
    ) -> Result<FocusedFrame, FocusError> {
        let sharpness = self.score(&frame);
        if sharpness >= self.params.sharpness_threshold {
            return Ok(FocusedFrame {
                image: frame,
                position: at,
                sharpness,
                corrected: false,
            });
        }

        log::info!(
            "sharpness {sharpness:.1} below {:.1}, searching z around {:.3}",
            self.params.sharpness_threshold,
            at.z
        );
        let settle = Duration::from_millis(self.params.local_settle_ms);
        let heights = stepped_heights(at.z, self.params.local_range, self.params.local_step);
        let outcome = sweep(&heights, |z| {
            rig.move_to(StagePosition::new(at.x, at.y, z), settle)?;
            let img = rig.capture()?;
            Ok::<_, RigError>((self.score(&img), img))
        })?
        .ok_or(FocusError::EmptySweep)?;

        log::info!(
            "local focus: z={:.3} sharpness={:.1}",
            outcome.best.z,
            outcome.best.sharpness
        );
        Ok(FocusedFrame {
            image: outcome.payload,
            position: StagePosition::new(at.x, at.y, outcome.best.z),
            sharpness: outcome.best.sharpness,
            corrected: true,
        })
    }

    /// Coarse sweep around the current height, then a fine sweep around the
    /// coarse winner. The fine winner is the accepted focus height; the stage
    /// is left there.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, rig)))]
    pub fn calibrate<S: Stage, C: Camera>(
        &self,
        rig: &mut Rig<S, C>,
    ) -> Result<FocusRecord, FocusError> {
        let start = rig.position()?;
        let coarse = self.sweep_z(
            rig,
            &spread_heights(start.z, self.params.coarse_range, self.params.coarse_steps),
        )?;
        log::info!(
            "coarse focus: z={:.3} sharpness={:.1}",
            coarse.z,
            coarse.sharpness
        );
        let fine = self.sweep_z(
            rig,
            &spread_heights(coarse.z, self.params.fine_range, self.params.fine_steps),
        )?;
        log::info!("fine focus: z={:.3} sharpness={:.1}", fine.z, fine.sharpness);

        rig.move_axes(
            None,
            None,
            Some(fine.z),
            Duration::from_millis(self.params.sweep_settle_ms),
        )?;
        Ok(FocusRecord {
            optimal_z: fine.z,
            max_sharpness: Some(fine.sharpness),
        })
    }

    /// Accept a height without sweeping or scoring.
    pub fn manual_override(&self, z: f64) -> FocusRecord {
        log::info!("focus set manually to z={z:.3}");
        FocusRecord {
            optimal_z: z,
            max_sharpness: None,
        }
    }

    fn sweep_z<S: Stage, C: Camera>(
        &self,
        rig: &mut Rig<S, C>,
        heights: &[f64],
    ) -> Result<FocusSample, FocusError> {
        let settle = Duration::from_millis(self.params.sweep_settle_ms);
        let outcome = sweep(heights, |z| {
            rig.move_axes(None, None, Some(z), settle)?;
            let img = rig.capture()?;
            Ok::<_, RigError>((self.score(&img), ()))
        })?
        .ok_or(FocusError::EmptySweep)?;
        Ok(outcome.best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;
    use tilescan_core::{box_blur, CameraError, SensorInfo, StageError};

    struct ZStage(Rc<Cell<StagePosition>>);

    impl Stage for ZStage {
        fn connect(&mut self) -> Result<(), StageError> {
            Ok(())
        }
        fn home(&mut self) -> Result<(), StageError> {
            Ok(())
        }
        fn move_to(
            &mut self,
            x: Option<f64>,
            y: Option<f64>,
            z: Option<f64>,
        ) -> Result<(), StageError> {
            let mut p = self.0.get();
            p.x = x.unwrap_or(p.x);
            p.y = y.unwrap_or(p.y);
            p.z = z.unwrap_or(p.z);
            self.0.set(p);
            Ok(())
        }
        fn move_by(&mut self, dx: f64, dy: f64, dz: f64) -> Result<(), StageError> {
            let p = self.0.get();
            self.0.set(StagePosition::new(p.x + dx, p.y + dy, p.z + dz));
            Ok(())
        }
        fn position(&mut self) -> Result<StagePosition, StageError> {
            Ok(self.0.get())
        }
        fn disconnect(&mut self) -> Result<(), StageError> {
            Ok(())
        }
    }

    /// Checkerboard blurred once per 0.1 of distance from `focal_z`.
    struct DefocusCamera {
        pos: Rc<Cell<StagePosition>>,
        focal_z: f64,
        captures: usize,
    }

    impl Camera for DefocusCamera {
        fn connect(&mut self) -> Result<(), CameraError> {
            Ok(())
        }
        fn capture(&mut self) -> Result<GrayImage, CameraError> {
            self.captures += 1;
            let sharp = GrayImage::from_fn(48, 48, |x, y| {
                if ((x / 3) + (y / 3)) % 2 == 0 {
                    220
                } else {
                    30
                }
            });
            let passes = ((self.pos.get().z - self.focal_z).abs() * 10.0).round() as usize;
            let mut img = sharp;
            for _ in 0..passes.min(40) {
                img = box_blur(&img.view(), 1);
            }
            Ok(img)
        }
        fn info(&self) -> Result<SensorInfo, CameraError> {
            Ok(SensorInfo {
                width: 48,
                height: 48,
            })
        }
        fn disconnect(&mut self) -> Result<(), CameraError> {
            Ok(())
        }
    }

    fn rig(start_z: f64, focal_z: f64) -> Rig<ZStage, DefocusCamera> {
        let pos = Rc::new(Cell::new(StagePosition::new(0.0, 0.0, start_z)));
        Rig::new(
            ZStage(pos.clone()),
            DefocusCamera {
                pos,
                focal_z,
                captures: 0,
            },
        )
        .without_settle()
    }

    #[test]
    fn sharp_tile_is_accepted_without_search() {
        let mut rig = rig(5.0, 5.0);
        let frame = rig.capture().unwrap();
        let ctl = FocusController::default();
        let out = ctl
            .correct_tile(&mut rig, frame, StagePosition::new(0.0, 0.0, 5.0))
            .unwrap();
        assert!(!out.corrected);
        assert_eq!(rig.camera().captures, 1);
    }

    #[test]
    fn blurry_tile_triggers_local_search() {
        let mut rig = rig(5.4, 5.0);
        let frame = rig.capture().unwrap();
        let ctl = FocusController::new(FocusParams {
            sharpness_threshold: 1e9,
            ..FocusParams::default()
        });
        let out = ctl
            .correct_tile(&mut rig, frame, StagePosition::new(0.0, 0.0, 5.4))
            .unwrap();
        assert!(out.corrected);
        assert_relative_eq!(out.position.z, 5.0, epsilon = 1e-9);
        assert_eq!(rig.camera().captures, 1 + 11);
    }

    #[test]
    fn two_stage_calibration_lands_near_focal_plane() {
        let mut rig = rig(2.0, 3.3);
        let record = FocusController::default().calibrate(&mut rig).unwrap();
        assert!((record.optimal_z - 3.3).abs() <= 0.1, "{record:?}");
        assert!(record.max_sharpness.is_some());
        assert_relative_eq!(rig.position().unwrap().z, record.optimal_z);
    }

    #[test]
    fn manual_override_has_no_sharpness() {
        let record = FocusController::default().manual_override(4.2);
        assert_eq!(record.max_sharpness, None);
        let json = serde_json::to_string(&record).unwrap();
        let back: FocusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
