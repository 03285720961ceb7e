//! Manual jog control for recording scan-region corners.
//!
//! A [`JogController`] consumes discrete [`JogEvent`]s (typically mapped
//! from key presses with [`JogEvent::from_key`]) and drives the stage one
//! relative move per event. Captures record the current stage position as
//! the next pending corner, in [`CornerId::ORDER`].

use std::time::Duration;

use crate::core::{Camera, Rig, RigError, Stage};
use crate::plan::{CalibratedCorner, CornerId, CornerSet, PlanError};

/// Selectable step sizes, in stage units.
pub const JOG_STEPS: [f64; 5] = [0.1, 0.5, 1.0, 5.0, 10.0];
const DEFAULT_STEP: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JogDirection {
    XPlus,
    XMinus,
    YPlus,
    YMinus,
    ZPlus,
    ZMinus,
}

impl JogDirection {
    fn delta(self, step: f64) -> (f64, f64, f64) {
        match self {
            JogDirection::XPlus => (step, 0.0, 0.0),
            JogDirection::XMinus => (-step, 0.0, 0.0),
            JogDirection::YPlus => (0.0, step, 0.0),
            JogDirection::YMinus => (0.0, -step, 0.0),
            JogDirection::ZPlus => (0.0, 0.0, step),
            JogDirection::ZMinus => (0.0, 0.0, -step),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JogEvent {
    Move(JogDirection),
    /// One-based index into [`JOG_STEPS`].
    SelectStep(u8),
    Capture,
    Quit,
}

impl JogEvent {
    /// `w`/`s` jog y, `a`/`d` jog x, `r`/`f` jog z, `1`-`5` pick a step,
    /// `c` captures and `q` quits.
    pub fn from_key(key: char) -> Option<JogEvent> {
        let event = match key.to_ascii_lowercase() {
            'w' => JogEvent::Move(JogDirection::YPlus),
            's' => JogEvent::Move(JogDirection::YMinus),
            'a' => JogEvent::Move(JogDirection::XMinus),
            'd' => JogEvent::Move(JogDirection::XPlus),
            'r' => JogEvent::Move(JogDirection::ZPlus),
            'f' => JogEvent::Move(JogDirection::ZMinus),
            'c' => JogEvent::Capture,
            'q' => JogEvent::Quit,
            d @ '1'..='5' => JogEvent::SelectStep(d as u8 - b'0'),
            _ => return None,
        };
        Some(event)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JogState {
    /// Nothing moved since the last capture.
    Idle,
    /// The stage moved since the last capture.
    Jogging,
    /// Reading the stage position for a capture.
    Capturing,
}

/// What an event produced.
#[derive(Clone, Debug, PartialEq)]
pub enum JogStatus {
    Continue,
    Captured(CalibratedCorner),
    /// All four corners recorded.
    Complete(CornerSet),
    Cancelled,
}

#[derive(thiserror::Error, Debug)]
pub enum JogError {
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error("step selection must be 1..=5, got {0}")]
    InvalidStep(u8),
    #[error("jog session already finished")]
    Finished,
    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[derive(Debug)]
pub struct JogController {
    state: JogState,
    step: usize,
    settle: Duration,
    captured: Vec<CalibratedCorner>,
    finished: bool,
}

impl Default for JogController {
    fn default() -> Self {
        Self::new()
    }
}

impl JogController {
    pub fn new() -> Self {
        Self {
            state: JogState::Idle,
            step: DEFAULT_STEP,
            settle: Duration::ZERO,
            captured: Vec::with_capacity(4),
            finished: false,
        }
    }

    /// Settle delay after each jog move.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn state(&self) -> JogState {
        self.state
    }

    pub fn step(&self) -> f64 {
        JOG_STEPS[self.step]
    }

    pub fn captured(&self) -> &[CalibratedCorner] {
        &self.captured
    }

    /// Corner the next capture will record.
    pub fn pending_corner(&self) -> Option<CornerId> {
        CornerId::ORDER.get(self.captured.len()).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn handle<S: Stage, C: Camera>(
        &mut self,
        rig: &mut Rig<S, C>,
        event: JogEvent,
    ) -> Result<JogStatus, JogError> {
        if self.finished {
            return Err(JogError::Finished);
        }
        match event {
            JogEvent::Move(direction) => {
                let (dx, dy, dz) = direction.delta(self.step());
                rig.move_by(dx, dy, dz, self.settle)?;
                self.state = JogState::Jogging;
                Ok(JogStatus::Continue)
            }
            JogEvent::SelectStep(n) => {
                if !(1..=JOG_STEPS.len() as u8).contains(&n) {
                    return Err(JogError::InvalidStep(n));
                }
                self.step = usize::from(n - 1);
                log::info!("jog step {}", self.step());
                Ok(JogStatus::Continue)
            }
            JogEvent::Capture => self.capture(rig),
            JogEvent::Quit => {
                log::info!("corner selection cancelled");
                self.finished = true;
                self.state = JogState::Idle;
                Ok(JogStatus::Cancelled)
            }
        }
    }

    fn capture<S: Stage, C: Camera>(
        &mut self,
        rig: &mut Rig<S, C>,
    ) -> Result<JogStatus, JogError> {
        let Some(id) = self.pending_corner() else {
            return Err(JogError::Finished);
        };
        let previous = self.state;
        self.state = JogState::Capturing;
        let position = match rig.position() {
            Ok(p) => p,
            Err(err) => {
                self.state = previous;
                return Err(err.into());
            }
        };
        self.state = JogState::Idle;

        let corner = CalibratedCorner { id, position };
        log::info!(
            "captured {id}: ({:.3}, {:.3}, {:.3})",
            position.x,
            position.y,
            position.z
        );
        self.captured.push(corner);
        if self.captured.len() < CornerId::ORDER.len() {
            return Ok(JogStatus::Captured(corner));
        }
        self.finished = true;
        Ok(JogStatus::Complete(CornerSet::from_corners(&self.captured)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GrayImage, SensorInfo, StagePosition};
    use crate::sim::{sim_rig, SimOptics};
    use approx::assert_relative_eq;

    fn rig() -> Rig<crate::sim::SimStage, crate::sim::SimCamera> {
        sim_rig(
            GrayImage::new(8, 8),
            SensorInfo {
                width: 8,
                height: 8,
            },
            SimOptics::default(),
            StagePosition::default(),
        )
    }

    fn keys(
        jog: &mut JogController,
        rig: &mut Rig<crate::sim::SimStage, crate::sim::SimCamera>,
        keys: &str,
    ) -> Vec<JogStatus> {
        keys.chars()
            .filter_map(JogEvent::from_key)
            .map(|e| jog.handle(rig, e).unwrap())
            .collect()
    }

    #[test]
    fn records_four_corners_in_order() {
        let mut rig = rig();
        let mut jog = JogController::new();
        assert_relative_eq!(jog.step(), 1.0);

        let out = keys(&mut jog, &mut rig, "c4ddc5wcs1aaac");
        let Some(JogStatus::Complete(set)) = out.last().cloned() else {
            panic!("not complete: {out:?}");
        };
        assert_eq!(set.bottom_left, StagePosition::new(0.0, 0.0, 0.0));
        assert_eq!(set.bottom_right, StagePosition::new(10.0, 0.0, 0.0));
        assert_eq!(set.top_right, StagePosition::new(10.0, 10.0, 0.0));
        assert_relative_eq!(set.top_left.x, 9.7, epsilon = 1e-9);
        assert_relative_eq!(set.top_left.y, 0.0, epsilon = 1e-9);
        assert!(jog.is_finished());
        assert!(matches!(
            jog.handle(&mut rig, JogEvent::Capture),
            Err(JogError::Finished)
        ));
    }

    #[test]
    fn states_follow_moves_and_captures() {
        let mut rig = rig();
        let mut jog = JogController::new();
        assert_eq!(jog.state(), JogState::Idle);
        jog.handle(&mut rig, JogEvent::Move(JogDirection::ZPlus))
            .unwrap();
        assert_eq!(jog.state(), JogState::Jogging);
        let status = jog.handle(&mut rig, JogEvent::Capture).unwrap();
        assert_eq!(jog.state(), JogState::Idle);
        assert_eq!(
            status,
            JogStatus::Captured(CalibratedCorner {
                id: CornerId::BottomLeft,
                position: StagePosition::new(0.0, 0.0, 1.0),
            })
        );
        assert_eq!(jog.pending_corner(), Some(CornerId::BottomRight));
    }

    #[test]
    fn quit_cancels_and_bad_steps_are_rejected() {
        let mut rig = rig();
        let mut jog = JogController::new();
        assert!(matches!(
            jog.handle(&mut rig, JogEvent::SelectStep(6)),
            Err(JogError::InvalidStep(6))
        ));
        assert_eq!(JogEvent::from_key('x'), None);
        assert_eq!(
            jog.handle(&mut rig, JogEvent::Quit).unwrap(),
            JogStatus::Cancelled
        );
        assert!(matches!(
            jog.handle(&mut rig, JogEvent::Move(JogDirection::XPlus)),
            Err(JogError::Finished)
        ));
        assert_eq!(rig.stage().moves(), 0);
    }
}
