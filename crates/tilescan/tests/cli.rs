use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tilescan::core::GrayImage;
use tilescan::io::{load_gray, save_gray};
use tilescan::mosaic::tile_filename;
use tilescan::plan::TileGrid;
use tilescan::sim::block_specimen;
use tilescan::ScanReport;

fn tilescan() -> Command {
    Command::cargo_bin("tilescan").unwrap()
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

#[test]
fn plan_quad_prints_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    let corners = dir.path().join("corners.json");
    write(
        &corners,
        r#"{
            "bottom_left":  {"X": 0.0, "Y": 0.0, "Z": 1.0},
            "bottom_right": {"X": 2.0, "Y": 0.0, "Z": 1.0},
            "top_right":    {"X": 2.0, "Y": 1.0, "Z": 1.0},
            "top_left":     {"X": 0.0, "Y": 1.0, "Z": 1.0}
        }"#,
    );

    let out = tilescan()
        .args(["plan-quad", "--corners"])
        .arg(&corners)
        .output()
        .unwrap();
    assert!(out.status.success());
    let grid: TileGrid = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!((grid.columns, grid.rows), (3, 2));
    assert_eq!(grid.targets.len(), 6);
}

#[test]
fn plan_rect_writes_the_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    let region = dir.path().join("region.json");
    let fov = dir.path().join("fov.json");
    let plan = dir.path().join("out/plan.json");
    write(
        &region,
        r#"{"slide_center_x": 10.0, "slide_center_y": 5.0,
            "slide_width": 8.0, "slide_height": 3.0, "optimal_z_position": 0.7}"#,
    );
    write(
        &fov,
        r#"{"width": 2.0, "height": 1.5, "pixels_per_unit_x": 320.0,
            "pixels_per_unit_y": 320.0, "pixel_width": 640, "pixel_height": 480}"#,
    );

    tilescan()
        .args(["plan-rect", "--overlap", "0", "--region"])
        .arg(&region)
        .arg("--fov")
        .arg(&fov)
        .arg("--out")
        .arg(&plan)
        .assert()
        .success();

    let grid: TileGrid = serde_json::from_str(&fs::read_to_string(&plan).unwrap()).unwrap();
    assert_eq!((grid.columns, grid.rows), (4, 2));
    assert!(grid.targets.iter().all(|t| t.focus_z == Some(0.7)));
}

#[test]
fn invalid_overlap_fails_with_a_message() {
    let dir = tempfile::tempdir().unwrap();
    let region = dir.path().join("region.json");
    let fov = dir.path().join("fov.json");
    write(
        &region,
        r#"{"center_x": 0.0, "center_y": 0.0, "width": 4.0, "height": 4.0}"#,
    );
    write(
        &fov,
        r#"{"width": 1.0, "height": 1.0, "pixels_per_unit_x": 100.0,
            "pixels_per_unit_y": 100.0, "pixel_width": 100, "pixel_height": 100}"#,
    );

    tilescan()
        .args(["plan-rect", "--overlap", "100", "--region"])
        .arg(&region)
        .arg("--fov")
        .arg(&fov)
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlap"));
}

#[test]
fn unknown_mode_is_rejected() {
    tilescan()
        .args(["stitch", "--tiles", ".", "--mode", "feathered"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("feathered"));
}

#[test]
fn stitch_assembles_a_tile_directory() {
    let dir = tempfile::tempdir().unwrap();
    for (c, r) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let tile = GrayImage::from_fn(6, 4, |_, _| (40 * (1 + c + 2 * r)) as u8);
        save_gray(dir.path().join(tile_filename(c, r)), &tile).unwrap();
    }
    let out = dir.path().join("stitched.png");

    tilescan()
        .args(["stitch", "--mode", "naive", "--tiles"])
        .arg(dir.path())
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("stitched.png"));

    let mosaic = load_gray(&out).unwrap();
    assert_eq!(mosaic.dimensions(), (12, 8));
    assert_eq!(mosaic.get(0, 0), 40);
    assert_eq!(mosaic.get(11, 7), 160);
}

#[test]
fn simulate_runs_the_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let specimen = dir.path().join("specimen.png");
    save_gray(&specimen, &block_specimen(300, 240, 11)).unwrap();
    let out = dir.path().join("run");

    tilescan()
        .args(["simulate", "--overlap", "50", "--specimen"])
        .arg(&specimen)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 x 2 tiles"));

    for name in ["focus.json", "fov.json", "plan.json", "report.json", "mosaic.png"] {
        assert!(out.join(name).is_file(), "{name} missing");
    }
    for (c, r) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        assert!(out.join("tiles").join(tile_filename(c, r)).is_file());
    }
    let report: ScanReport =
        serde_json::from_str(&fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(report.tiles.len(), 4);
    assert_eq!(load_gray(out.join("mosaic.png")).unwrap().dimensions(), (320, 240));
}
