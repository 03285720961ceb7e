use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use tilescan::core::{SensorInfo, StagePosition};
use tilescan::focus::{FocusController, FocusParams};
use tilescan::fov::{measure_field_of_view, FovParams};
use tilescan::io::{load_corners, load_gray, load_json, load_region, save_gray, save_json, stitch_tile_dir};
use tilescan::mosaic::{MosaicMode, RegistrationParams};
use tilescan::plan::{plan_quad_grid, plan_rect_grid, QuadGridParams, ScanRegion, TileGrid};
use tilescan::sim::{sim_rig, SimOptics};
use tilescan::{acquire, ScanConfig};

/// Tiled stage+camera acquisition tools.
#[derive(Debug, Parser)]
#[command(author, version, about = "Plan, acquire and stitch tiled scans")]
struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a grid inside four calibrated corners.
    PlanQuad {
        /// Corner JSON keyed by bottom_left, bottom_right, top_right, top_left.
        #[arg(long)]
        corners: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        step_x: f64,
        #[arg(long, default_value_t = 1.0)]
        step_y: f64,
        /// Write the plan here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Plan a grid covering a rectangular region from a measured field of view.
    PlanRect {
        #[arg(long)]
        region: PathBuf,
        #[arg(long)]
        fov: PathBuf,
        /// Overlap between neighboring tiles, percent.
        #[arg(long, default_value_t = 20.0)]
        overlap: f64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Assemble a directory of img_x{c}_y{r}.png tiles.
    Stitch {
        #[arg(long)]
        tiles: PathBuf,
        #[arg(long, default_value = "naive")]
        mode: MosaicMode,
        /// Output raster; defaults to mosaic.png inside the tile directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Calibrate, plan, acquire and assemble against a simulated rig.
    Simulate {
        /// Grayscale specimen raster the simulated camera looks at.
        #[arg(long)]
        specimen: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 50.0)]
        overlap: f64,
        #[arg(long, default_value = "registered")]
        mode: MosaicMode,
        #[arg(long, default_value_t = 160)]
        sensor_width: usize,
        #[arg(long, default_value_t = 120)]
        sensor_height: usize,
        /// Specimen pixels per stage unit on both axes.
        #[arg(long, default_value_t = 20.0)]
        pixels_per_unit: f64,
        /// Height of the simulated focal plane.
        #[arg(long, default_value_t = 2.0)]
        focal_z: f64,
        /// Stage move used for field-of-view calibration.
        #[arg(long, default_value_t = 1.0)]
        fov_move: f64,
        /// JSON ScanConfig overriding the built-in defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::PlanQuad {
            corners,
            step_x,
            step_y,
            out,
        } => {
            let corners = load_corners(&corners)?;
            let grid = plan_quad_grid(&corners, &QuadGridParams { step_x, step_y })?;
            emit(&grid, out.as_deref())
        }
        Command::PlanRect {
            region,
            fov,
            overlap,
            out,
        } => {
            let region = load_region(&region)?;
            let fov = load_json(&fov)?;
            let grid = plan_rect_grid(&region, &fov, overlap)?;
            emit(&grid, out.as_deref())
        }
        Command::Stitch { tiles, mode, out } => {
            let assembler = stitch_tile_dir(&tiles, mode, &RegistrationParams::default())?;
            let out = out.unwrap_or_else(|| tiles.join("mosaic.png"));
            save_gray(&out, assembler.canvas())?;
            println!("{}", out.display());
            Ok(())
        }
        Command::Simulate {
            specimen,
            out,
            overlap,
            mode,
            sensor_width,
            sensor_height,
            pixels_per_unit,
            focal_z,
            fov_move,
            config,
        } => {
            let config = match config {
                Some(path) => load_json(&path)?,
                None => ScanConfig {
                    move_settle_ms: 0,
                    focus: FocusParams {
                        local_settle_ms: 0,
                        sweep_settle_ms: 0,
                        ..FocusParams::default()
                    },
                    ..ScanConfig::default()
                },
            };
            let sim = SimulateArgs {
                overlap,
                mode,
                sensor: SensorInfo {
                    width: sensor_width,
                    height: sensor_height,
                },
                optics: SimOptics {
                    pixels_per_unit_x: pixels_per_unit,
                    pixels_per_unit_y: pixels_per_unit,
                    focal_z,
                    ..SimOptics::default()
                },
                fov_move,
            };
            simulate(&specimen, &out, &sim, config)
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_verbose: bool) {
    tilescan::core::init_tracing(false);
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = tilescan::core::init_with_level(level);
}

fn emit(grid: &TileGrid, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match out {
        Some(path) => {
            save_json(path, grid)?;
            log::info!("wrote {} targets to {}", grid.len(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(grid)?),
    }
    Ok(())
}

struct SimulateArgs {
    overlap: f64,
    mode: MosaicMode,
    sensor: SensorInfo,
    optics: SimOptics,
    fov_move: f64,
}

fn simulate(
    specimen: &Path,
    out: &Path,
    args: &SimulateArgs,
    mut config: ScanConfig,
) -> Result<(), Box<dyn Error>> {
    let specimen = load_gray(specimen)?;
    let (ppx, ppy) = (args.optics.pixels_per_unit_x, args.optics.pixels_per_unit_y);
    let extent_x = specimen.width as f64 / ppx;
    let extent_y = specimen.height as f64 / ppy;
    let center = StagePosition::new(extent_x / 2.0, extent_y / 2.0, 0.0);
    let mut rig = sim_rig(specimen, args.sensor, args.optics.clone(), center);

    let focus = FocusController::new(config.focus.clone()).calibrate(&mut rig)?;
    save_json(out.join("focus.json"), &focus)?;

    let fov = measure_field_of_view(
        &mut rig,
        &FovParams {
            move_distance: args.fov_move,
            settle_ms: 0,
        },
    )?;
    save_json(out.join("fov.json"), &fov)?;

    let region = ScanRegion {
        center_x: center.x,
        center_y: center.y,
        width: extent_x - fov.width,
        height: extent_y - fov.height,
        focus_z: Some(focus.optimal_z),
    };
    let grid = plan_rect_grid(&region, &fov, args.overlap)?;
    save_json(out.join("plan.json"), &grid)?;

    config.mode = args.mode;
    config.tile_dir = Some(out.join("tiles"));
    let scan = acquire(&mut rig, &grid, &config)?;
    save_gray(out.join("mosaic.png"), &scan.composite)?;
    save_json(out.join("report.json"), &scan.report)?;
    rig.disconnect()?;

    println!(
        "{} x {} tiles, {} placed, {} unregistered",
        scan.report.columns,
        scan.report.rows,
        scan.report.placed(),
        scan.report.unregistered()
    );
    Ok(())
}
