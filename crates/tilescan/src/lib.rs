//! Tiled stage+camera acquisition.
//!
//! This crate ties the `tilescan-*` workspace together:
//! - re-exports of the component crates (`core`, `plan`, `focus`, `fov`,
//!   `mosaic`)
//! - [`acquire`](acquire::acquire): the full scan loop over a [`core::Rig`],
//!   producing a [`ScanReport`] and a composite
//! - JSON and raster I/O, tile-directory stitching
//! - a simulated stage/camera pair for dry runs and tests
//! - a jog state machine for recording scan-region corners by hand
//!
//! ## Quickstart
//!
//! ```no_run
//! use tilescan::core::{SensorInfo, StagePosition};
//! use tilescan::plan::{plan_rect_grid, ScanRegion};
//! use tilescan::sim::{block_specimen, sim_rig, SimOptics};
//! use tilescan::{acquire, ScanConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sensor = SensorInfo { width: 160, height: 120 };
//! let mut rig = sim_rig(
//!     block_specimen(480, 360, 7),
//!     sensor,
//!     SimOptics::default(),
//!     StagePosition::new(12.0, 9.0, 0.0),
//! );
//! let fov = tilescan::fov::measure_field_of_view(
//!     &mut rig,
//!     &tilescan::fov::FovParams { move_distance: 1.0, settle_ms: 0 },
//! )?;
//! let region = ScanRegion { center_x: 12.0, center_y: 9.0, width: 12.0, height: 9.0, focus_z: Some(0.0) };
//! let grid = plan_rect_grid(&region, &fov, 50.0)?;
//! let scan = acquire(&mut rig, &grid, &ScanConfig::default())?;
//! println!("{} tiles placed", scan.report.placed());
//! # Ok(())
//! # }
//! ```

pub use tilescan_core as core;
pub use tilescan_focus as focus;
pub use tilescan_fov as fov;
pub use tilescan_mosaic as mosaic;
pub use tilescan_plan as plan;

pub mod acquire;
pub mod io;
pub mod jog;
pub mod sim;

pub use acquire::{acquire, spot_check, Scan, ScanConfig, ScanError, ScanReport, TileReport};
pub use io::IoError;
pub use jog::{JogController, JogEvent, JogState, JogStatus};
