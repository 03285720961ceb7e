//! Simulated stage and camera.
//!
//! [`SimCamera`] renders the crop of a specimen raster that lies under the
//! current [`SimStage`] position, blurred in proportion to the distance from
//! a fixed focal plane. Both halves share the stage position, so the pair
//! behaves like a camera rigidly mounted above a moving stage.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::core::{
    box_blur, Camera, CameraError, GrayImage, Rig, SensorInfo, Stage, StageError, StagePosition,
};

/// Mapping from stage units to specimen pixels, and the defocus model.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptics {
    pub pixels_per_unit_x: f64,
    pub pixels_per_unit_y: f64,
    /// Height at which frames are rendered without blur.
    pub focal_z: f64,
    /// Radius-1 box-blur passes per unit of defocus.
    pub blur_per_unit: f64,
    pub max_blur_passes: usize,
}

impl Default for SimOptics {
    fn default() -> Self {
        Self {
            pixels_per_unit_x: 20.0,
            pixels_per_unit_y: 20.0,
            focal_z: 0.0,
            blur_per_unit: 20.0,
            max_blur_passes: 40,
        }
    }
}

impl SimOptics {
    pub fn blur_passes(&self, z: f64) -> usize {
        let passes = ((z - self.focal_z).abs() * self.blur_per_unit).round();
        (passes as usize).min(self.max_blur_passes)
    }
}

type SharedPosition = Rc<Cell<StagePosition>>;

#[derive(Debug)]
pub struct SimStage {
    position: SharedPosition,
    home: StagePosition,
    connected: bool,
    moves: usize,
    fail_after_moves: Option<usize>,
}

impl SimStage {
    /// Moves beyond the first `n` fail with a motion error.
    pub fn fail_after_moves(mut self, n: usize) -> Self {
        self.fail_after_moves = Some(n);
        self
    }

    pub fn moves(&self) -> usize {
        self.moves
    }

    fn check_move(&mut self) -> Result<(), StageError> {
        if !self.connected {
            return Err(StageError::NotConnected);
        }
        if self.fail_after_moves.is_some_and(|n| self.moves >= n) {
            return Err(StageError::Motion(format!(
                "injected fault after {} moves",
                self.moves
            )));
        }
        self.moves += 1;
        Ok(())
    }
}

impl Stage for SimStage {
    fn connect(&mut self) -> Result<(), StageError> {
        self.connected = true;
        Ok(())
    }

    fn home(&mut self) -> Result<(), StageError> {
        self.check_move()?;
        self.position.set(self.home);
        Ok(())
    }

    fn move_to(&mut self, x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Result<(), StageError> {
        self.check_move()?;
        let p = self.position.get();
        self.position.set(StagePosition::new(
            x.unwrap_or(p.x),
            y.unwrap_or(p.y),
            z.unwrap_or(p.z),
        ));
        Ok(())
    }

    fn move_by(&mut self, dx: f64, dy: f64, dz: f64) -> Result<(), StageError> {
        self.check_move()?;
        let p = self.position.get();
        self.position
            .set(StagePosition::new(p.x + dx, p.y + dy, p.z + dz));
        Ok(())
    }

    fn position(&mut self) -> Result<StagePosition, StageError> {
        if !self.connected {
            return Err(StageError::NotConnected);
        }
        Ok(self.position.get())
    }

    fn disconnect(&mut self) -> Result<(), StageError> {
        self.connected = false;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimCamera {
    specimen: GrayImage,
    sensor: SensorInfo,
    optics: SimOptics,
    position: SharedPosition,
    connected: bool,
    attempts: usize,
    failing: BTreeSet<usize>,
}

impl SimCamera {
    /// Capture attempts with these zero-based indices fail.
    pub fn fail_captures(mut self, attempts: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(attempts);
        self
    }

    /// Capture attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn optics(&self) -> &SimOptics {
        &self.optics
    }

    /// Frame at `position`, regardless of connection state or faults.
    pub fn render(&self, position: StagePosition) -> GrayImage {
        let (w, h) = (self.sensor.width, self.sensor.height);
        let x0 = (position.x * self.optics.pixels_per_unit_x - w as f64 / 2.0).round() as i64;
        let y0 = (position.y * self.optics.pixels_per_unit_y - h as f64 / 2.0).round() as i64;
        let mut frame = self.specimen.view().crop(x0, y0, w, h);
        for _ in 0..self.optics.blur_passes(position.z) {
            frame = box_blur(&frame.view(), 1);
        }
        frame
    }
}

impl Camera for SimCamera {
    fn connect(&mut self) -> Result<(), CameraError> {
        self.connected = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<GrayImage, CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        let attempt = self.attempts;
        self.attempts += 1;
        if self.failing.contains(&attempt) {
            return Err(CameraError::Capture(format!(
                "injected fault on attempt {attempt}"
            )));
        }
        Ok(self.render(self.position.get()))
    }

    fn info(&self) -> Result<SensorInfo, CameraError> {
        Ok(self.sensor)
    }

    fn disconnect(&mut self) -> Result<(), CameraError> {
        self.connected = false;
        Ok(())
    }
}

/// A stage/camera pair sharing one position, starting (and homing) at `start`.
pub fn sim_pair(
    specimen: GrayImage,
    sensor: SensorInfo,
    optics: SimOptics,
    start: StagePosition,
) -> (SimStage, SimCamera) {
    let position = Rc::new(Cell::new(start));
    let stage = SimStage {
        position: Rc::clone(&position),
        home: start,
        connected: false,
        moves: 0,
        fail_after_moves: None,
    };
    let camera = SimCamera {
        specimen,
        sensor,
        optics,
        position,
        connected: false,
        attempts: 0,
        failing: BTreeSet::new(),
    };
    (stage, camera)
}

/// Connected simulated rig with settle delays disabled.
pub fn sim_rig(
    specimen: GrayImage,
    sensor: SensorInfo,
    optics: SimOptics,
    start: StagePosition,
) -> Rig<SimStage, SimCamera> {
    let (mut stage, mut camera) = sim_pair(specimen, sensor, optics, start);
    stage.connected = true;
    camera.connected = true;
    Rig::new(stage, camera).without_settle()
}

/// Deterministic specimen of random gray 7x7 blocks, rich in corners and
/// free of periodic structure.
pub fn block_specimen(width: usize, height: usize, seed: u32) -> GrayImage {
    let block = |bx: usize, by: usize| {
        let mut v = (bx as u32).wrapping_mul(73_856_093)
            ^ (by as u32).wrapping_mul(19_349_663)
            ^ seed.wrapping_mul(83_492_791);
        v ^= v >> 13;
        v = v.wrapping_mul(0x5bd1_e995);
        v ^= v >> 15;
        (v % 200) as u8 + 28
    };
    GrayImage::from_fn(width, height, |x, y| block(x / 7, y / 7))
}
