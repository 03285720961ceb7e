//! Stage and camera abstractions plus the [`Rig`] session object.
//!
//! Motion-control protocols and camera SDKs live behind the [`Stage`] and
//! [`Camera`] traits. Every pipeline operation receives the rig explicitly;
//! there is no global hardware handle.

use std::time::Duration;

use crate::image::GrayImage;
use crate::types::{SensorInfo, StagePosition};

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("stage is not connected")]
    NotConnected,
    #[error("stage connection failed: {0}")]
    Connection(String),
    #[error("stage move failed: {0}")]
    Motion(String),
    #[error("stage position query failed: {0}")]
    Query(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("camera is not connected")]
    NotConnected,
    #[error("camera connection failed: {0}")]
    Connection(String),
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// Three-axis motorized stage.
///
/// `move_to` leaves axes given as `None` where they are.
pub trait Stage {
    fn connect(&mut self) -> Result<(), StageError>;
    fn home(&mut self) -> Result<(), StageError>;
    fn move_to(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    ) -> Result<(), StageError>;
    fn move_by(&mut self, dx: f64, dy: f64, dz: f64) -> Result<(), StageError>;
    fn position(&mut self) -> Result<StagePosition, StageError>;
    fn disconnect(&mut self) -> Result<(), StageError>;
}

/// Fixed camera producing 8-bit grayscale frames.
pub trait Camera {
    fn connect(&mut self) -> Result<(), CameraError>;
    fn capture(&mut self) -> Result<GrayImage, CameraError>;
    fn info(&self) -> Result<SensorInfo, CameraError>;
    fn disconnect(&mut self) -> Result<(), CameraError>;
}

/// Coarse classification of a [`RigError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RigErrorKind {
    Connection,
    Motion,
    Capture,
}

#[derive(thiserror::Error, Debug)]
pub enum RigError {
    #[error("stage connection: {0}")]
    StageConnection(#[source] StageError),
    #[error("camera connection: {0}")]
    CameraConnection(#[source] CameraError),
    #[error("motion: {0}")]
    Motion(#[source] StageError),
    #[error("capture: {0}")]
    Capture(#[source] CameraError),
}

impl RigError {
    pub fn kind(&self) -> RigErrorKind {
        match self {
            RigError::StageConnection(_) | RigError::CameraConnection(_) => {
                RigErrorKind::Connection
            }
            RigError::Motion(_) => RigErrorKind::Motion,
            RigError::Capture(_) => RigErrorKind::Capture,
        }
    }
}

/// Exclusive session over one stage and one camera.
///
/// Moves block for the requested settle delay before returning. Capture
/// failures are retried up to `capture_retries` times; every other hardware
/// failure is returned immediately.
#[derive(Debug)]
pub struct Rig<S, C> {
    stage: S,
    camera: C,
    settle_enabled: bool,
    capture_retries: u32,
}

impl<S: Stage, C: Camera> Rig<S, C> {
    pub fn new(stage: S, camera: C) -> Self {
        Self {
            stage,
            camera,
            settle_enabled: true,
            capture_retries: 0,
        }
    }

    /// Disable settle sleeps (simulated hardware has no vibration to damp).
    pub fn without_settle(mut self) -> Self {
        self.settle_enabled = false;
        self
    }

    pub fn with_capture_retries(mut self, retries: u32) -> Self {
        self.capture_retries = retries;
        self
    }

    pub fn set_capture_retries(&mut self, retries: u32) {
        self.capture_retries = retries;
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn into_parts(self) -> (S, C) {
        (self.stage, self.camera)
    }

    pub fn connect(&mut self) -> Result<(), RigError> {
        self.stage.connect().map_err(RigError::StageConnection)?;
        self.camera.connect().map_err(RigError::CameraConnection)?;
        log::info!("rig connected");
        Ok(())
    }

    /// Disconnect both devices; the first failure is reported after both
    /// have been attempted.
    pub fn disconnect(&mut self) -> Result<(), RigError> {
        let stage = self.stage.disconnect().map_err(RigError::StageConnection);
        let camera = self.camera.disconnect().map_err(RigError::CameraConnection);
        stage.and(camera)
    }

    pub fn home(&mut self) -> Result<(), RigError> {
        self.stage.home().map_err(RigError::Motion)
    }

    pub fn sensor_info(&self) -> Result<SensorInfo, RigError> {
        self.camera.info().map_err(RigError::Capture)
    }

    pub fn position(&mut self) -> Result<StagePosition, RigError> {
        self.stage.position().map_err(RigError::Motion)
    }

    /// Absolute move on all three axes followed by `settle`.
    pub fn move_to(&mut self, target: StagePosition, settle: Duration) -> Result<(), RigError> {
        self.move_axes(Some(target.x), Some(target.y), Some(target.z), settle)
    }

    /// Absolute move on a subset of axes followed by `settle`.
    pub fn move_axes(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        settle: Duration,
    ) -> Result<(), RigError> {
        self.stage.move_to(x, y, z).map_err(RigError::Motion)?;
        self.settle(settle);
        Ok(())
    }

    /// Relative move followed by `settle`.
    pub fn move_by(
        &mut self,
        dx: f64,
        dy: f64,
        dz: f64,
        settle: Duration,
    ) -> Result<(), RigError> {
        self.stage.move_by(dx, dy, dz).map_err(RigError::Motion)?;
        self.settle(settle);
        Ok(())
    }

    pub fn capture(&mut self) -> Result<GrayImage, RigError> {
        let mut attempt = 0;
        loop {
            match self.camera.capture() {
                Ok(frame) => return Ok(frame),
                Err(err) if attempt < self.capture_retries => {
                    attempt += 1;
                    log::warn!(
                        "capture failed ({err}); retry {attempt}/{}",
                        self.capture_retries
                    );
                }
                Err(err) => return Err(RigError::Capture(err)),
            }
        }
    }

    fn settle(&self, settle: Duration) {
        if self.settle_enabled && !settle.is_zero() {
            std::thread::sleep(settle);
        }
    }
}
