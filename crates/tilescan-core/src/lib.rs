//! Core types shared by the tilescan crates.
//!
//! Rasters, homographies, stage/camera traits and the [`Rig`] session
//! object. Nothing here knows about a particular motion controller or camera.

mod hardware;
mod homography;
mod image;
mod logger;
mod tile;
mod types;

pub use hardware::{Camera, CameraError, Rig, RigError, RigErrorKind, Stage, StageError};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{
    box_blur, sample_bilinear, sample_bilinear_inside, sample_bilinear_u8, GrayImage,
    GrayImageView,
};
pub use tile::{CapturedTile, RegistrationFailure, RegistrationOutcome};
pub use types::{Axis, FieldOfView, SensorInfo, StagePosition};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
