use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tilescan_core::{
    CapturedTile, GrayImage, Homography, RegistrationFailure, RegistrationOutcome,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::features::{Feature, FeatureExtractor, FeatureParams};
use crate::matching::mutual_matches;
use crate::mosaic::Mosaic;
use crate::ransac::{fit_homography, RansacParams};

/// How tiles enter the composite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MosaicMode {
    /// Copy each tile into its own grid cell; no alignment.
    Naive,
    /// Align each tile to its left or upper neighbor by feature matching.
    #[default]
    Registered,
}

impl std::str::FromStr for MosaicMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive" => Ok(MosaicMode::Naive),
            "registered" => Ok(MosaicMode::Registered),
            other => Err(format!("unknown mosaic mode '{other}' (naive|registered)")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    /// Fewer mutual matches than this leaves the tile unregistered.
    pub min_matches: usize,
    pub features: FeatureParams,
    pub ransac: RansacParams,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            min_matches: 10,
            features: FeatureParams::default(),
            ransac: RansacParams::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MosaicError {
    #[error("cell ({column}, {row}) is outside the {columns} x {rows} grid")]
    CellOutOfBounds {
        column: usize,
        row: usize,
        columns: usize,
        rows: usize,
    },
    #[error("tile is {got:?} but the mosaic expects {expected:?}")]
    TileSizeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// What the assembler remembers about a captured cell.
#[derive(Clone, Debug)]
struct CellRecord {
    image: GrayImage,
    outcome: RegistrationOutcome,
    /// Lazily extracted in registered mode.
    features: Option<Vec<Feature>>,
}

impl CellRecord {
    fn canvas_from_tile(&self) -> Option<Homography> {
        match self.outcome {
            RegistrationOutcome::Registered { transform } => Some(transform),
            _ => None,
        }
    }
}

/// Incremental tile compositor.
///
/// Tiles are placed one at a time in row-major order. In registered mode the
/// first tile anchors the composite frame at its grid position; each later
/// tile is matched against one already-placed neighbor (left first, then
/// above) and its transform is chained through that neighbor's. Alignment is
/// strictly pairwise, so drift accumulates along rows and columns.
#[derive(Debug)]
pub struct MosaicAssembler {
    mode: MosaicMode,
    params: RegistrationParams,
    extractor: FeatureExtractor,
    mosaic: Mosaic,
    cells: Vec<Option<CellRecord>>,
}

impl MosaicAssembler {
    pub fn new(
        mode: MosaicMode,
        columns: usize,
        rows: usize,
        tile_width: usize,
        tile_height: usize,
    ) -> Self {
        Self::with_params(
            mode,
            columns,
            rows,
            tile_width,
            tile_height,
            RegistrationParams::default(),
        )
    }

    pub fn with_params(
        mode: MosaicMode,
        columns: usize,
        rows: usize,
        tile_width: usize,
        tile_height: usize,
        params: RegistrationParams,
    ) -> Self {
        Self {
            mode,
            extractor: FeatureExtractor::new(params.features.clone()),
            params,
            mosaic: Mosaic::new(columns, rows, tile_width, tile_height),
            cells: vec![None; columns * rows],
        }
    }

    pub fn mode(&self) -> MosaicMode {
        self.mode
    }

    pub fn mosaic(&self) -> &Mosaic {
        &self.mosaic
    }

    pub fn canvas(&self) -> &GrayImage {
        self.mosaic.canvas()
    }

    pub fn into_mosaic(self) -> Mosaic {
        self.mosaic
    }

    /// Outcome recorded for a cell, if a tile was placed there.
    pub fn outcome(&self, column: usize, row: usize) -> Option<RegistrationOutcome> {
        let (columns, rows) = self.mosaic.grid_size();
        if column >= columns || row >= rows {
            return None;
        }
        self.cells[row * columns + column]
            .as_ref()
            .map(|c| c.outcome)
    }

    /// Place a captured tile at its own grid cell.
    pub fn place(&mut self, tile: &CapturedTile) -> Result<RegistrationOutcome, MosaicError> {
        self.place_image(&tile.image, tile.column, tile.row)
    }

    /// Place a raster at `(column, row)` and record the outcome.
    ///
    /// Registration failures are returned as [`RegistrationOutcome::Unregistered`]
    /// and leave the canvas untouched; errors are reserved for caller misuse.
    /// The reference is the left neighbor when it registered, else the one
    /// above, so an unregistered left tile does not block its right neighbor.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, image)))]
    pub fn place_image(
        &mut self,
        image: &GrayImage,
        column: usize,
        row: usize,
    ) -> Result<RegistrationOutcome, MosaicError> {
        let idx = self.cell_index(column, row)?;
        let expected = self.mosaic.tile_size();
        if image.dimensions() != expected {
            return Err(MosaicError::TileSizeMismatch {
                expected,
                got: image.dimensions(),
            });
        }

        let (outcome, features) = match self.mode {
            MosaicMode::Naive => {
                self.mosaic.paste(&image.view(), column, row);
                (RegistrationOutcome::Naive, None)
            }
            MosaicMode::Registered => self.register(image, column, row),
        };

        match &outcome {
            RegistrationOutcome::Unregistered { reason } => {
                log::warn!("tile ({column}, {row}) left unregistered: {reason}");
            }
            _ => log::debug!("tile ({column}, {row}) placed"),
        }

        self.cells[idx] = Some(CellRecord {
            image: image.clone(),
            outcome,
            features,
        });
        Ok(outcome)
    }

    fn register(
        &mut self,
        image: &GrayImage,
        column: usize,
        row: usize,
    ) -> (RegistrationOutcome, Option<Vec<Feature>>) {
        if self.cells.iter().all(Option::is_none) {
            let (x0, y0) = self.mosaic.cell_origin(column, row);
            self.mosaic.paste(&image.view(), column, row);
            let transform = Homography::translation(x0 as f64, y0 as f64);
            return (RegistrationOutcome::Registered { transform }, None);
        }

        let features = self.extractor.extract(&image.view());
        let outcome = match self.align(&features, column, row) {
            Ok(transform) => {
                self.mosaic.warp_into(&image.view(), &transform);
                RegistrationOutcome::Registered { transform }
            }
            Err(reason) => RegistrationOutcome::Unregistered { reason },
        };
        (outcome, Some(features))
    }

    /// Canvas-from-tile transform for a new tile, chained through its reference.
    fn align(
        &mut self,
        features: &[Feature],
        column: usize,
        row: usize,
    ) -> Result<Homography, RegistrationFailure> {
        let (ref_idx, canvas_from_ref) = self
            .reference(column, row)
            .ok_or(RegistrationFailure::ReferenceUnplaced)?;
        let extractor = &self.extractor;
        let reference = self.cells[ref_idx]
            .as_mut()
            .ok_or(RegistrationFailure::ReferenceUnplaced)?;
        if reference.features.is_none() {
            reference.features = Some(extractor.extract(&reference.image.view()));
        }
        let ref_features = reference.features.as_deref().unwrap_or_default();

        let query: Vec<_> = features.iter().map(|f| f.descriptor).collect();
        let train: Vec<_> = ref_features.iter().map(|f| f.descriptor).collect();
        let matches = mutual_matches(&query, &train);
        let required = self.params.min_matches;
        if matches.len() < required {
            return Err(RegistrationFailure::InsufficientMatches {
                found: matches.len(),
                required,
            });
        }

        let (src, dst): (Vec<_>, Vec<_>) = matches
            .iter()
            .map(|m| {
                let a = features[m.query_idx].keypoint;
                let b = ref_features[m.train_idx].keypoint;
                (Point2::new(a.x, a.y), Point2::new(b.x, b.y))
            })
            .unzip();

        let failed = RegistrationFailure::HomographyFailed {
            matches: matches.len(),
        };
        let fit = fit_homography(&src, &dst, &self.params.ransac).ok_or(failed)?;
        let transform = canvas_from_ref.compose(&fit.homography);
        check_placement(&self.mosaic, &transform, failed)?;
        log::debug!(
            "tile ({column}, {row}): {} matches, {} inliers",
            matches.len(),
            fit.inliers.len()
        );
        Ok(transform)
    }

    /// Left neighbor if it is placed with a known transform, else the one above.
    /// An unregistered left tile is skipped, not treated as a failure.
    fn reference(&self, column: usize, row: usize) -> Option<(usize, Homography)> {
        let (columns, _) = self.mosaic.grid_size();
        let placed = |idx: usize| {
            self.cells[idx]
                .as_ref()
                .and_then(CellRecord::canvas_from_tile)
                .map(|h| (idx, h))
        };
        let left = (column > 0).then(|| row * columns + column - 1);
        let above = (row > 0).then(|| (row - 1) * columns + column);
        left.and_then(placed).or_else(|| above.and_then(placed))
    }

    fn cell_index(&self, column: usize, row: usize) -> Result<usize, MosaicError> {
        let (columns, rows) = self.mosaic.grid_size();
        if column >= columns || row >= rows {
            return Err(MosaicError::CellOutOfBounds {
                column,
                row,
                columns,
                rows,
            });
        }
        Ok(row * columns + column)
    }
}

/// A registered tile must be non-degenerate and land on the canvas.
fn check_placement(
    mosaic: &Mosaic,
    canvas_from_tile: &Homography,
    failed: RegistrationFailure,
) -> Result<(), RegistrationFailure> {
    let visible = mosaic.lands_on_canvas(mosaic.tile_size(), canvas_from_tile);
    if canvas_from_tile.is_degenerate() || !visible {
        return Err(failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILED: RegistrationFailure = RegistrationFailure::HomographyFailed { matches: 12 };

    #[test]
    fn placement_requires_a_visible_non_degenerate_tile() {
        let mosaic = Mosaic::new(2, 2, 160, 120);
        assert_eq!(
            check_placement(&mosaic, &Homography::translation(160.0, 3.0), FAILED),
            Ok(())
        );

        let rejected = [
            Homography::from_array([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
            Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-0.01, 0.0, 1.0]]),
            Homography::translation(10_000.0, 0.0),
            Homography::translation(0.0, -500.0),
        ];
        for h in rejected {
            assert_eq!(check_placement(&mosaic, &h, FAILED), Err(FAILED), "{h:?}");
        }
    }
}
