use serde::{Deserialize, Serialize};

use crate::homography::Homography;
use crate::image::GrayImage;
use crate::types::StagePosition;

/// Why a tile could not be aligned to its reference neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistrationFailure {
    /// Fewer mutual descriptor matches than required.
    InsufficientMatches { found: usize, required: usize },
    /// Enough matches, but no consistent non-degenerate homography.
    HomographyFailed { matches: usize },
    /// The reference neighbor is missing or was itself left unregistered.
    ReferenceUnplaced,
}

impl std::fmt::Display for RegistrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationFailure::InsufficientMatches { found, required } => {
                write!(f, "only {found} mutual matches (need {required})")
            }
            RegistrationFailure::HomographyFailed { matches } => {
                write!(f, "homography fit failed on {matches} matches")
            }
            RegistrationFailure::ReferenceUnplaced => f.write_str("reference neighbor unplaced"),
        }
    }
}

/// How a tile ended up in the composite.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Warped through a homography mapping tile pixels into composite pixels.
    Registered { transform: Homography },
    /// Copied to its grid cell without alignment.
    Naive,
    /// Left out of the composite.
    Unregistered { reason: RegistrationFailure },
}

impl RegistrationOutcome {
    pub fn is_placed(&self) -> bool {
        !matches!(self, RegistrationOutcome::Unregistered { .. })
    }
}

/// A frame captured at one grid cell.
#[derive(Clone, Debug)]
pub struct CapturedTile {
    pub column: usize,
    pub row: usize,
    pub image: GrayImage,
    /// Stage position actually used, after any focus correction.
    pub position: StagePosition,
    /// `None` when focus was accepted without scoring.
    pub sharpness: Option<f64>,
    /// Filled in by the assembler.
    pub registration: Option<RegistrationOutcome>,
}

impl CapturedTile {
    pub fn new(column: usize, row: usize, image: GrayImage, position: StagePosition) -> Self {
        Self {
            column,
            row,
            image,
            position,
            sharpness: None,
            registration: None,
        }
    }
}
