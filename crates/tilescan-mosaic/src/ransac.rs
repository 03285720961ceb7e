//! RANSAC homography fitting.

use nalgebra::Point2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tilescan_core::{estimate_homography, homography_from_4pt, Homography};

const SAMPLE_SIZE: usize = 4;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Reprojection distance in pixels below which a correspondence is an inlier.
    pub inlier_threshold: f64,
    pub max_iterations: usize,
    /// Target probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Smallest consensus set accepted as a fit.
    pub min_inliers: usize,
    /// Fixed seed for reproducible fits; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            inlier_threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            min_inliers: 8,
            seed: Some(0x5eed),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RansacFit {
    /// Maps `src` points onto `dst` points.
    pub homography: Homography,
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

/// Robustly fit `dst ~ H * src`.
///
/// Minimal samples with three (nearly) collinear points on either side are
/// skipped. The best consensus set is refit by least squares and re-scored.
/// Returns `None` when fewer than `max(4, min_inliers)` inliers support any
/// non-degenerate model.
pub fn fit_homography(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    params: &RansacParams,
) -> Option<RansacFit> {
    let n = src.len();
    if n != dst.len() || n < SAMPLE_SIZE {
        return None;
    }
    let required = params.min_inliers.max(SAMPLE_SIZE);
    let mut rng: ChaCha8Rng = match params.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let mut best: Option<(Homography, Vec<usize>)> = None;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    let mut limit = params.max_iterations;
    let mut iterations = 0;

    while iterations < limit {
        iterations += 1;
        random_sample_into(&mut rng, n, SAMPLE_SIZE, &mut sample);
        let s: [Point2<f32>; 4] = std::array::from_fn(|i| src[sample[i]]);
        let d: [Point2<f32>; 4] = std::array::from_fn(|i| dst[sample[i]]);
        if has_collinear_triple(&s) || has_collinear_triple(&d) {
            continue;
        }
        let Some(h) = homography_from_4pt(&s, &d) else {
            continue;
        };
        if h.is_degenerate() {
            continue;
        }
        let inliers = inliers_of(&h, src, dst, params.inlier_threshold);
        if inliers.len() > best.as_ref().map_or(0, |(_, b)| b.len()) {
            let ratio = inliers.len() as f64 / n as f64;
            limit = limit.min(adaptive_iterations(ratio, params.confidence));
            best = Some((h, inliers));
        }
    }

    let (mut h, mut inliers) = best?;
    if inliers.len() < required {
        log::debug!(
            "ransac: best consensus {} of {n} below {required}",
            inliers.len()
        );
        return None;
    }

    let (s, d): (Vec<_>, Vec<_>) = inliers.iter().map(|&i| (src[i], dst[i])).unzip();
    if let Some(refit) = estimate_homography(&s, &d) {
        let refit_inliers = inliers_of(&refit, src, dst, params.inlier_threshold);
        if !refit.is_degenerate() && refit_inliers.len() >= inliers.len() {
            h = refit;
            inliers = refit_inliers;
        }
    }

    log::debug!(
        "ransac: {} / {n} inliers after {iterations} iterations",
        inliers.len()
    );
    Some(RansacFit {
        homography: h,
        inliers,
        iterations,
    })
}

fn inliers_of(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    threshold: f64,
) -> Vec<usize> {
    let t2 = (threshold * threshold) as f32;
    src.iter()
        .zip(dst.iter())
        .enumerate()
        .filter_map(|(i, (s, d))| {
            let p = h.apply(*s);
            let err = (p - *d).norm_squared();
            (err.is_finite() && err <= t2).then_some(i)
        })
        .collect()
}

/// Floyd's sampling of `k` distinct indices from `0..n`.
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    buffer.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if buffer.contains(&t) {
            buffer.push(j);
        } else {
            buffer.push(t);
        }
    }
}

/// Iterations needed to draw an all-inlier sample with `confidence`.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    let w_n = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if w_n >= 1.0 {
        return 1;
    }
    let log_outlier = (1.0 - w_n).ln();
    if log_outlier >= 0.0 {
        return usize::MAX;
    }
    ((1.0 - confidence).ln() / log_outlier).ceil().max(1.0) as usize
}

fn has_collinear_triple(p: &[Point2<f32>; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(a, b, c)| {
        let ab = p[b] - p[a];
        let ac = p[c] - p[a];
        let cross = (ab.x * ac.y - ab.y * ac.x).abs();
        let scale = ab.norm().max(ac.norm()).max(1e-6);
        // off-line distance under one pixel
        cross / scale < 1.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_points() -> Vec<Point2<f32>> {
        let mut pts = Vec::new();
        for j in 0..6 {
            for i in 0..8 {
                pts.push(Point2::new(
                    12.0 + i as f32 * 17.0 + (j % 2) as f32 * 3.0,
                    9.0 + j as f32 * 13.0,
                ));
            }
        }
        pts
    }

    #[test]
    fn recovers_translation_despite_outliers() {
        let src = grid_points();
        let truth = Homography::translation(-80.0, 2.5);
        let mut dst: Vec<_> = src.iter().map(|p| truth.apply(*p)).collect();
        // corrupt a quarter of the correspondences
        for (k, d) in dst.iter_mut().enumerate() {
            if k % 4 == 1 {
                *d = Point2::new(d.y * 0.7 + 40.0, d.x * 0.3 - 11.0);
            }
        }

        let fit = fit_homography(&src, &dst, &RansacParams::default()).expect("fit");
        assert_eq!(fit.inliers.len(), src.len() - src.len() / 4);
        let h = fit.homography.to_array();
        let s = h[2][2];
        assert_relative_eq!(h[0][2] / s, -80.0, epsilon = 1e-3);
        assert_relative_eq!(h[1][2] / s, 2.5, epsilon = 1e-3);
        assert_relative_eq!(h[0][0] / s, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn inconsistent_matches_do_not_fit() {
        let src = grid_points();
        let dst: Vec<_> = src
            .iter()
            .enumerate()
            .map(|(k, _)| {
                let v = (k as u32).wrapping_mul(2_654_435_761);
                Point2::new((v % 200) as f32, ((v >> 8) % 150) as f32)
            })
            .collect();
        assert!(fit_homography(&src, &dst, &RansacParams::default()).is_none());
    }

    #[test]
    fn collinear_samples_are_flagged() {
        let line = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.2),
            Point2::new(20.0, 0.0),
            Point2::new(5.0, 30.0),
        ];
        assert!(has_collinear_triple(&line));
        let quad = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(!has_collinear_triple(&quad));
    }

    #[test]
    fn adaptive_iterations_shrink_with_inlier_ratio() {
        assert!(adaptive_iterations(0.9, 0.995) < adaptive_iterations(0.5, 0.995));
        assert_eq!(adaptive_iterations(1.0, 0.995), 1);
    }
}
