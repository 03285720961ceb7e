//! Whole-grid acquisition: move, settle, capture, focus, persist, assemble.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::core::{
    Camera, CapturedTile, GrayImage, RegistrationOutcome, Rig, RigError, Stage, StagePosition,
};
use crate::focus::{FocusController, FocusError, FocusParams};
use crate::io::{save_gray, IoError};
use crate::mosaic::{tile_filename, MosaicAssembler, MosaicError, MosaicMode, RegistrationParams};
use crate::plan::TileGrid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Settle delay after each grid move.
    pub move_settle_ms: u64,
    pub mode: MosaicMode,
    /// Run local focus search on tiles scoring below the sharpness threshold.
    pub focus_correction: bool,
    /// Extra attempts per capture before a capture error aborts the scan.
    pub capture_retries: u32,
    /// Where per-tile rasters are written; `None` keeps them in memory only.
    pub tile_dir: Option<PathBuf>,
    pub focus: FocusParams,
    pub registration: RegistrationParams,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            move_settle_ms: 500,
            mode: MosaicMode::default(),
            focus_correction: true,
            capture_retries: 0,
            tile_dir: None,
            focus: FocusParams::default(),
            registration: RegistrationParams::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("plan has no targets")]
    EmptyGrid,
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error("focus search: {0}")]
    Focus(#[source] FocusError),
    #[error(transparent)]
    Mosaic(#[from] MosaicError),
    #[error(transparent)]
    Io(#[from] IoError),
}

impl From<FocusError> for ScanError {
    fn from(err: FocusError) -> Self {
        match err {
            FocusError::Rig(err) => ScanError::Rig(err),
            other => ScanError::Focus(other),
        }
    }
}

/// Per-tile record of a scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileReport {
    pub column: usize,
    pub row: usize,
    pub position: StagePosition,
    pub sharpness: Option<f64>,
    /// Local focus search moved the focus axis for this tile.
    pub focus_corrected: bool,
    pub outcome: RegistrationOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub columns: usize,
    pub rows: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    pub mode: MosaicMode,
    /// Fraction of the composite written by placed tiles.
    pub coverage: f64,
    pub tiles: Vec<TileReport>,
}

impl ScanReport {
    pub fn placed(&self) -> usize {
        self.tiles.iter().filter(|t| t.outcome.is_placed()).count()
    }

    pub fn unregistered(&self) -> usize {
        self.tiles.len() - self.placed()
    }

    pub fn focus_corrected(&self) -> usize {
        self.tiles.iter().filter(|t| t.focus_corrected).count()
    }
}

/// Result of [`acquire`].
#[derive(Clone, Debug)]
pub struct Scan {
    pub report: ScanReport,
    pub composite: GrayImage,
}

/// Acquire every target of `grid` in row-major order and assemble them.
///
/// Targets without a planned focus height are captured at the height the
/// previous tile ended on (the current stage height for the first tile).
/// Any hardware failure aborts the scan; registration failures only leave
/// their tile out of the composite.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(rig, grid, config),
        fields(columns = grid.columns, rows = grid.rows, mode = ?config.mode)
    )
)]
pub fn acquire<S: Stage, C: Camera>(
    rig: &mut Rig<S, C>,
    grid: &TileGrid,
    config: &ScanConfig,
) -> Result<Scan, ScanError> {
    if grid.is_empty() {
        return Err(ScanError::EmptyGrid);
    }
    rig.set_capture_retries(config.capture_retries);
    let sensor = rig.sensor_info()?;
    let settle = Duration::from_millis(config.move_settle_ms);
    let focus = FocusController::new(config.focus.clone());
    let mut assembler = MosaicAssembler::with_params(
        config.mode,
        grid.columns,
        grid.rows,
        sensor.width,
        sensor.height,
        config.registration.clone(),
    );

    let mut z = rig.position()?.z;
    let mut tiles = Vec::with_capacity(grid.len());
    log::info!(
        "scanning {} x {} grid ({:?} mode)",
        grid.columns,
        grid.rows,
        config.mode
    );

    for target in grid {
        let at = target.position(z);
        rig.move_to(at, settle)?;
        let frame = rig.capture()?;

        let mut tile = CapturedTile::new(target.column, target.row, frame, at);
        let mut corrected = false;
        if config.focus_correction {
            let focused = focus.correct_tile(rig, tile.image, at)?;
            tile.image = focused.image;
            tile.position = focused.position;
            tile.sharpness = Some(focused.sharpness);
            corrected = focused.corrected;
        }
        z = tile.position.z;

        if let Some(dir) = &config.tile_dir {
            save_gray(dir.join(tile_filename(tile.column, tile.row)), &tile.image)?;
        }

        let outcome = assembler.place(&tile)?;
        tile.registration = Some(outcome);
        log::info!(
            "tile ({}, {}) at ({:.3}, {:.3}, {:.3}){}",
            tile.column,
            tile.row,
            tile.position.x,
            tile.position.y,
            tile.position.z,
            tile.sharpness
                .map(|s| format!(" sharpness {s:.1}"))
                .unwrap_or_default()
        );

        tiles.push(TileReport {
            column: tile.column,
            row: tile.row,
            position: tile.position,
            sharpness: tile.sharpness,
            focus_corrected: corrected,
            outcome,
        });
    }

    let mosaic = assembler.into_mosaic();
    let report = ScanReport {
        columns: grid.columns,
        rows: grid.rows,
        tile_width: sensor.width,
        tile_height: sensor.height,
        mode: config.mode,
        coverage: mosaic.coverage(),
        tiles,
    };
    log::info!(
        "scan complete: {} placed, {} unregistered, {} focus-corrected, {:.1}% covered",
        report.placed(),
        report.unregistered(),
        report.focus_corrected(),
        100.0 * report.coverage
    );
    Ok(Scan {
        report,
        composite: mosaic.into_canvas(),
    })
}

/// Capture the extreme targets of a plan (see [`TileGrid::spot_check_indices`])
/// to verify coverage before a full scan. Each tile is scored but never
/// focus-corrected.
pub fn spot_check<S: Stage, C: Camera>(
    rig: &mut Rig<S, C>,
    grid: &TileGrid,
    config: &ScanConfig,
) -> Result<Vec<CapturedTile>, ScanError> {
    let settle = Duration::from_millis(config.move_settle_ms);
    let focus = FocusController::new(config.focus.clone());
    let z = rig.position()?.z;
    let mut out = Vec::new();
    for idx in grid.spot_check_indices() {
        let target = &grid.targets[idx];
        let at = target.position(z);
        rig.move_to(at, settle)?;
        let image = rig.capture()?;
        let mut tile = CapturedTile::new(target.column, target.row, image, at);
        let sharpness = focus.score(&tile.image);
        log::info!(
            "spot check ({}, {}): sharpness {sharpness:.1}",
            tile.column,
            tile.row
        );
        tile.sharpness = Some(sharpness);
        out.push(tile);
    }
    Ok(out)
}
