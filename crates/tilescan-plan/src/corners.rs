use serde::{Deserialize, Serialize};
use tilescan_core::StagePosition;

use crate::PlanError;

/// Identity of a calibrated scan-region corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerId {
    BottomLeft,
    BottomRight,
    TopRight,
    TopLeft,
}

impl CornerId {
    /// Fixed capture order used by calibration tools.
    pub const ORDER: [CornerId; 4] = [
        CornerId::BottomLeft,
        CornerId::BottomRight,
        CornerId::TopRight,
        CornerId::TopLeft,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CornerId::BottomLeft => "bottom_left",
            CornerId::BottomRight => "bottom_right",
            CornerId::TopRight => "top_right",
            CornerId::TopLeft => "top_left",
        }
    }
}

impl std::fmt::Display for CornerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibratedCorner {
    pub id: CornerId,
    pub position: StagePosition,
}

/// The four corners of a quadrilateral scan region.
///
/// Serialized as an object keyed by corner name, matching the corner files
/// written by the calibration tools.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub bottom_left: StagePosition,
    pub bottom_right: StagePosition,
    pub top_right: StagePosition,
    pub top_left: StagePosition,
}

impl CornerSet {
    /// Assemble a set from exactly four distinct corner records.
    pub fn from_corners(corners: &[CalibratedCorner]) -> Result<Self, PlanError> {
        let mut slots: [Option<StagePosition>; 4] = [None; 4];
        for corner in corners {
            let idx = slot(corner.id);
            if slots[idx].replace(corner.position).is_some() {
                return Err(PlanError::DuplicateCorner(corner.id));
            }
        }
        let get = |id: CornerId| slots[slot(id)].ok_or(PlanError::MissingCorner(id));
        Ok(Self {
            bottom_left: get(CornerId::BottomLeft)?,
            bottom_right: get(CornerId::BottomRight)?,
            top_right: get(CornerId::TopRight)?,
            top_left: get(CornerId::TopLeft)?,
        })
    }

    pub fn get(&self, id: CornerId) -> StagePosition {
        match id {
            CornerId::BottomLeft => self.bottom_left,
            CornerId::BottomRight => self.bottom_right,
            CornerId::TopRight => self.top_right,
            CornerId::TopLeft => self.top_left,
        }
    }

    pub fn corners(&self) -> [CalibratedCorner; 4] {
        CornerId::ORDER.map(|id| CalibratedCorner {
            id,
            position: self.get(id),
        })
    }

    /// Bilinear blend of the four corners.
    ///
    /// `fx` runs bottom-left to bottom-right, `fy` bottom-left to top-left.
    pub fn interpolate(&self, fx: f64, fy: f64) -> StagePosition {
        let left = self.bottom_left.lerp(&self.top_left, fy);
        let right = self.bottom_right.lerp(&self.top_right, fy);
        left.lerp(&right, fx)
    }
}

fn slot(id: CornerId) -> usize {
    match id {
        CornerId::BottomLeft => 0,
        CornerId::BottomRight => 1,
        CornerId::TopRight => 2,
        CornerId::TopLeft => 3,
    }
}
