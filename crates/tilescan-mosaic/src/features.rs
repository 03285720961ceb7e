//! Oriented FAST keypoints with rotated binary descriptors.
//!
//! Keypoints come from a FAST-9 segment test with 3x3 non-maximum
//! suppression on every level of a bilinear image pyramid. Each keypoint is
//! oriented by the intensity centroid of a radius-15 disk, and described by
//! 256 pairwise intensity comparisons on a box-smoothed copy of its level,
//! with the sampling pattern rotated to the keypoint orientation.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tilescan_core::{box_blur, sample_bilinear_u8, GrayImage, GrayImageView};

/// Radius of the orientation disk and descriptor patch.
const PATCH_RADIUS: i32 = 15;
/// Keypoints closer than this to a level border are dropped.
const BORDER: usize = 16;
const PATTERN_SEED: u64 = 0x7113_5ca7;

/// Bresenham circle of radius 3 in clockwise order.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];
const ARC: usize = 9;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Strongest keypoints kept across all levels.
    pub max_features: usize,
    /// Intensity margin for the segment test.
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    /// Box-blur radius applied before descriptor sampling.
    pub smoothing_radius: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            max_features: 1000,
            fast_threshold: 20,
            pyramid_levels: 4,
            scale_factor: 1.2,
            smoothing_radius: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// Position in full-resolution pixel coordinates.
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
    pub level: u8,
}

/// 256-bit binary descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    #[inline]
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

/// Keypoint detector and descriptor with a fixed sampling pattern.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    params: FeatureParams,
    pattern: Vec<[(i32, i32); 2]>,
    disk: Vec<i32>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureParams::default())
    }
}

struct Candidate {
    level: usize,
    x: usize,
    y: usize,
    response: f32,
}

impl FeatureExtractor {
    pub fn new(params: FeatureParams) -> Self {
        Self {
            params,
            pattern: sampling_pattern(),
            disk: disk_half_widths(PATCH_RADIUS),
        }
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    /// Detect and describe up to `max_features` keypoints, strongest first.
    pub fn extract(&self, img: &GrayImageView<'_>) -> Vec<Feature> {
        let levels = self.pyramid(img);

        let mut candidates = Vec::new();
        for (level, (image, _)) in levels.iter().enumerate() {
            for (x, y, response) in fast_corners(&image.view(), self.params.fast_threshold) {
                candidates.push(Candidate {
                    level,
                    x,
                    y,
                    response,
                });
            }
        }
        candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
        candidates.truncate(self.params.max_features);

        let smoothed: Vec<GrayImage> = levels
            .iter()
            .map(|(image, _)| box_blur(&image.view(), self.params.smoothing_radius))
            .collect();

        candidates
            .iter()
            .map(|c| {
                let (image, scale) = &levels[c.level];
                let angle = self.orientation(&image.view(), c.x, c.y);
                let descriptor = self.describe(&smoothed[c.level].view(), c.x, c.y, angle);
                Feature {
                    keypoint: Keypoint {
                        x: (c.x as f32 + 0.5) * scale - 0.5,
                        y: (c.y as f32 + 0.5) * scale - 0.5,
                        angle,
                        response: c.response,
                        level: c.level as u8,
                    },
                    descriptor,
                }
            })
            .collect()
    }

    /// Level images with their scale relative to full resolution.
    fn pyramid(&self, img: &GrayImageView<'_>) -> Vec<(GrayImage, f32)> {
        let min_side = 2 * BORDER + 1;
        let mut levels = vec![(img.to_owned_image(), 1.0f32)];
        let factor = self.params.scale_factor.max(1.0 + f32::EPSILON);
        for l in 1..self.params.pyramid_levels {
            let scale = factor.powi(l as i32);
            let w = (img.width as f32 / scale).round() as usize;
            let h = (img.height as f32 / scale).round() as usize;
            if w < min_side || h < min_side {
                break;
            }
            let level = GrayImage::from_fn(w, h, |x, y| {
                let sx = (x as f32 + 0.5) * scale - 0.5;
                let sy = (y as f32 + 0.5) * scale - 0.5;
                sample_bilinear_u8(img, sx, sy)
            });
            levels.push((level, scale));
        }
        levels
    }

    fn orientation(&self, img: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
        let (mut m10, mut m01) = (0.0f64, 0.0f64);
        for (row, &half) in self.disk.iter().enumerate() {
            let dy = row as i32 - PATCH_RADIUS;
            for dx in -half..=half {
                let v = pixel(img, x as i32 + dx, y as i32 + dy) as f64;
                m10 += dx as f64 * v;
                m01 += dy as f64 * v;
            }
        }
        m01.atan2(m10) as f32
    }

    fn describe(&self, img: &GrayImageView<'_>, x: usize, y: usize, angle: f32) -> Descriptor {
        let (sin, cos) = angle.sin_cos();
        let rotate = |(px, py): (i32, i32)| {
            let (px, py) = (px as f32, py as f32);
            let rx = (px * cos - py * sin).round() as i32;
            let ry = (px * sin + py * cos).round() as i32;
            pixel(img, x as i32 + rx, y as i32 + ry)
        };

        let mut bits = [0u64; 4];
        for (i, [a, b]) in self.pattern.iter().enumerate() {
            if rotate(*a) < rotate(*b) {
                bits[i / 64] |= 1 << (i % 64);
            }
        }
        Descriptor(bits)
    }
}

/// FAST-9 corners with 3x3 non-maximum suppression.
///
/// Returns `(x, y, response)` where the response is the summed excess
/// contrast over the winning arc polarity.
pub fn fast_corners(img: &GrayImageView<'_>, threshold: u8) -> Vec<(usize, usize, f32)> {
    let (w, h) = (img.width, img.height);
    if w < 2 * BORDER + 1 || h < 2 * BORDER + 1 {
        return Vec::new();
    }

    let mut score = vec![0.0f32; w * h];
    for y in BORDER..h - BORDER {
        for x in BORDER..w - BORDER {
            score[y * w + x] = segment_score(img, x, y, threshold as i32);
        }
    }

    let mut out = Vec::new();
    for y in BORDER..h - BORDER {
        for x in BORDER..w - BORDER {
            let s = score[y * w + x];
            if s <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nbr: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let n = score[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize];
                    // equal scores: the earlier pixel in raster order wins
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if n > s || (n == s && earlier) {
                        is_max = false;
                        break 'nbr;
                    }
                }
            }
            if is_max {
                out.push((x, y, s));
            }
        }
    }
    out
}

/// Segment-test score, or 0 when no run of `ARC` contiguous circle pixels
/// is uniformly brighter or darker than the center by more than `t`.
fn segment_score(img: &GrayImageView<'_>, x: usize, y: usize, t: i32) -> f32 {
    let c = img.get(x, y) as i32;
    let mut diff = [0i32; 16];
    for (d, &(dx, dy)) in diff.iter_mut().zip(CIRCLE.iter()) {
        *d = img.get((x as i32 + dx) as usize, (y as i32 + dy) as usize) as i32 - c;
    }

    let mut best = 0.0f32;
    for sign in [1i32, -1] {
        let mut run = 0usize;
        let mut found = false;
        for k in 0..16 + ARC {
            if diff[k % 16] * sign > t {
                run += 1;
                if run >= ARC {
                    found = true;
                    break;
                }
            } else {
                run = 0;
            }
        }
        if found {
            let s: i32 = diff
                .iter()
                .map(|&d| d * sign - t)
                .filter(|&e| e > 0)
                .sum();
            best = best.max(s as f32);
        }
    }
    best
}

#[inline]
fn pixel(img: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, img.width as i32 - 1) as usize;
    let y = y.clamp(0, img.height as i32 - 1) as usize;
    img.get(x, y)
}

/// 256 point pairs uniformly distributed inside the patch disk.
fn sampling_pattern() -> Vec<[(i32, i32); 2]> {
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    let r2 = PATCH_RADIUS * PATCH_RADIUS;
    let mut point = move || loop {
        let x = rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS);
        let y = rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS);
        if x * x + y * y <= r2 {
            return (x, y);
        }
    };
    let mut pattern = Vec::with_capacity(256);
    while pattern.len() < 256 {
        let a = point();
        let b = point();
        if a != b {
            pattern.push([a, b]);
        }
    }
    pattern
}

/// Half-width of each disk row, top to bottom.
fn disk_half_widths(radius: i32) -> Vec<i32> {
    (-radius..=radius)
        .map(|dy| (((radius * radius - dy * dy) as f64).sqrt()).floor() as i32)
        .collect()
}
