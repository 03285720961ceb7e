//! Tile mosaicking.
//!
//! [`MosaicAssembler`] places tiles one at a time on a fixed
//! `columns*w x rows*h` canvas, either naively at their grid cells or by
//! pairwise registration: oriented FAST/BRIEF features, mutual Hamming
//! matching, and a RANSAC homography chained through an already-placed
//! neighbor.

mod assembler;
mod features;
mod matching;
mod mosaic;
mod naming;
mod ransac;

pub use assembler::{MosaicAssembler, MosaicError, MosaicMode, RegistrationParams};
pub use features::{fast_corners, Descriptor, Feature, FeatureExtractor, FeatureParams, Keypoint};
pub use matching::{mutual_matches, Match};
pub use mosaic::Mosaic;
pub use naming::{parse_tile_filename, tile_filename, TILE_EXTENSION};
pub use ransac::{fit_homography, RansacFit, RansacParams};
