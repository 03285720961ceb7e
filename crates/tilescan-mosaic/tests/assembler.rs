use nalgebra::Point2;
use tilescan_core::{GrayImage, RegistrationFailure, RegistrationOutcome};
use tilescan_mosaic::{MosaicAssembler, MosaicError, MosaicMode, RansacParams, RegistrationParams};

const TILE_W: usize = 160;
const TILE_H: usize = 120;

/// Random 7x7 blocks of gray; aperiodic and corner-rich.
fn specimen(width: usize, height: usize) -> GrayImage {
    let block = |bx: usize, by: usize| {
        let mut v = (bx as u32).wrapping_mul(73_856_093) ^ (by as u32).wrapping_mul(19_349_663);
        v ^= v >> 13;
        v = v.wrapping_mul(0x5bd1_e995);
        v ^= v >> 15;
        (v % 200) as u8 + 28
    };
    GrayImage::from_fn(width, height, |x, y| block(x / 7, y / 7))
}

fn crop(src: &GrayImage, x0: usize, y0: usize) -> GrayImage {
    src.view().crop(x0 as i64, y0 as i64, TILE_W, TILE_H)
}

#[test]
fn naive_tiles_occupy_their_cells() {
    let mut asm = MosaicAssembler::new(MosaicMode::Naive, 3, 2, 4, 3);
    for row in 0..2 {
        for col in 0..3 {
            let v = (10 * (row * 3 + col) + 10) as u8;
            let outcome = asm
                .place_image(&GrayImage::from_fn(4, 3, |_, _| v), col, row)
                .expect("place");
            assert_eq!(outcome, RegistrationOutcome::Naive);
        }
    }
    let canvas = asm.canvas();
    assert_eq!(canvas.dimensions(), (12, 6));
    for y in 0..6 {
        for x in 0..12 {
            let (col, row) = (x / 4, y / 3);
            assert_eq!(canvas.get(x, y), (10 * (row * 3 + col) + 10) as u8, "({x}, {y})");
        }
    }
}

#[test]
fn misuse_is_reported() {
    let mut asm = MosaicAssembler::new(MosaicMode::Naive, 2, 2, 4, 4);
    assert_eq!(
        asm.place_image(&GrayImage::new(4, 4), 2, 0),
        Err(MosaicError::CellOutOfBounds {
            column: 2,
            row: 0,
            columns: 2,
            rows: 2
        })
    );
    assert_eq!(
        asm.place_image(&GrayImage::new(5, 4), 0, 0),
        Err(MosaicError::TileSizeMismatch {
            expected: (4, 4),
            got: (5, 4)
        })
    );
    assert_eq!(asm.outcome(0, 0), None);
}

#[test]
fn featureless_neighbor_stays_unregistered() {
    let scene = specimen(400, 300);
    let mut asm = MosaicAssembler::new(MosaicMode::Registered, 2, 2, TILE_W, TILE_H);

    let anchor = asm.place_image(&crop(&scene, 0, 0), 0, 0).expect("anchor");
    assert!(matches!(anchor, RegistrationOutcome::Registered { .. }));
    let before = asm.canvas().clone();

    let flat = GrayImage::from_fn(TILE_W, TILE_H, |_, _| 128);
    let outcome = asm.place_image(&flat, 1, 0).expect("place");
    assert_eq!(
        outcome,
        RegistrationOutcome::Unregistered {
            reason: RegistrationFailure::InsufficientMatches {
                found: 0,
                required: 10
            }
        }
    );
    assert_eq!(asm.canvas(), &before);

    // left neighbor missing, upper neighbor unregistered
    let outcome = asm.place_image(&crop(&scene, 80, 60), 1, 1).expect("place");
    assert_eq!(
        outcome,
        RegistrationOutcome::Unregistered {
            reason: RegistrationFailure::ReferenceUnplaced
        }
    );
    assert_eq!(asm.canvas(), &before);
}

#[test]
fn overlapping_crops_register_to_their_offsets() {
    let scene = specimen(400, 300);
    let mut asm = MosaicAssembler::new(MosaicMode::Registered, 2, 2, TILE_W, TILE_H);

    for row in 0..2 {
        for col in 0..2 {
            let tile = crop(&scene, col * 80, row * 60);
            let outcome = asm.place_image(&tile, col, row).expect("place");
            let RegistrationOutcome::Registered { transform } = outcome else {
                panic!("tile ({col}, {row}) not registered: {outcome:?}");
            };
            let (ox, oy) = ((col * 80) as f32, (row * 60) as f32);
            for (x, y) in [(0.0, 0.0), (159.0, 0.0), (0.0, 119.0), (159.0, 119.0)] {
                let p = transform.apply(Point2::new(x, y));
                assert!(
                    (p.x - (x + ox)).abs() < 1.0 && (p.y - (y + oy)).abs() < 1.0,
                    "tile ({col}, {row}) maps ({x}, {y}) to {p:?}"
                );
            }
        }
    }

    // block centers of the composite agree with the specimen
    let canvas = asm.canvas();
    for (x, y) in [(101, 38), (178, 101), (199, 150), (227, 164)] {
        let d = canvas.get(x, y) as i32 - scene.get(x, y) as i32;
        assert!(d.abs() <= 2, "({x}, {y}): {d}");
    }
}

#[test]
fn rejected_fit_leaves_the_canvas_alone() {
    let scene = specimen(400, 300);
    let params = RegistrationParams {
        ransac: RansacParams {
            min_inliers: 100_000,
            ..RansacParams::default()
        },
        ..RegistrationParams::default()
    };
    let mut asm =
        MosaicAssembler::with_params(MosaicMode::Registered, 2, 1, TILE_W, TILE_H, params);
    asm.place_image(&crop(&scene, 0, 0), 0, 0).expect("anchor");
    let before = asm.canvas().clone();

    let outcome = asm.place_image(&crop(&scene, 80, 0), 1, 0).expect("place");
    let RegistrationOutcome::Unregistered {
        reason: RegistrationFailure::HomographyFailed { matches },
    } = outcome
    else {
        panic!("expected a failed fit, got {outcome:?}");
    };
    assert!(matches >= 10, "{matches} matches");
    assert_eq!(asm.canvas(), &before);
    assert_eq!(asm.outcome(1, 0), Some(outcome));
}

#[test]
fn unregistered_left_neighbor_defers_to_the_tile_above() {
    let scene = specimen(400, 300);
    let mut asm = MosaicAssembler::new(MosaicMode::Registered, 2, 2, TILE_W, TILE_H);
    asm.place_image(&crop(&scene, 0, 0), 0, 0).expect("anchor");
    asm.place_image(&crop(&scene, 80, 0), 1, 0).expect("place");
    let flat = GrayImage::from_fn(TILE_W, TILE_H, |_, _| 128);
    let left = asm.place_image(&flat, 0, 1).expect("place");
    assert!(matches!(left, RegistrationOutcome::Unregistered { .. }));

    let outcome = asm.place_image(&crop(&scene, 80, 60), 1, 1).expect("place");
    let RegistrationOutcome::Registered { transform } = outcome else {
        panic!("not registered against the tile above: {outcome:?}");
    };
    let p = transform.apply(Point2::new(0.0, 0.0));
    assert!((p.x - 80.0).abs() < 1.0 && (p.y - 60.0).abs() < 1.0, "{p:?}");
}
