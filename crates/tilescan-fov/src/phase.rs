//! Integer-pixel translation estimate by phase correlation.
//!
//! Both frames are transformed with a full-size 2D FFT (no padding, no
//! windowing), the cross-power spectrum `F1 * conj(F2)` is normalized to
//! unit magnitude, and the peak of the inverse transform's magnitude gives
//! the offset. Peak coordinates past half the frame wrap to negative values.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use tilescan_core::GrayImageView;

/// Signed pixel offset between two frames.
///
/// For `moved` equal to `reference` translated by `(sx, sy)`, the estimate
/// is `(-sx, -sy)`: the shift that brings `moved` back onto `reference`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
    /// Correlation peak magnitude in `[0, 1]`.
    pub peak: f64,
}

/// Cached FFT plans for one frame size.
pub struct PhaseCorrelator {
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for PhaseCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseCorrelator")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl PhaseCorrelator {
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            col_forward: planner.plan_fft_forward(height),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    /// Returns `None` if either frame does not match the planned size.
    pub fn correlate(
        &self,
        reference: &GrayImageView<'_>,
        moved: &GrayImageView<'_>,
    ) -> Option<Displacement> {
        let (w, h) = (self.width, self.height);
        if w == 0 || h == 0 {
            return None;
        }
        for img in [reference, moved] {
            if img.width != w || img.height != h || img.data.len() != w * h {
                return None;
            }
        }

        let mut f1 = to_complex(reference.data);
        let mut f2 = to_complex(moved.data);
        self.fft_2d(&mut f1, false);
        self.fft_2d(&mut f2, false);

        let mut cross: Vec<Complex<f64>> = f1
            .iter()
            .zip(f2.iter())
            .map(|(&a, &b)| {
                let product = a * b.conj();
                let magnitude = product.norm();
                if magnitude > 1e-12 {
                    product / magnitude
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();
        self.fft_2d(&mut cross, true);

        let norm = 1.0 / (w * h) as f64;
        let mut best = (0usize, 0usize, f64::NEG_INFINITY);
        for y in 0..h {
            for x in 0..w {
                let m = cross[y * w + x].norm() * norm;
                if m > best.2 {
                    best = (x, y, m);
                }
            }
        }

        let (px, py, peak) = best;
        Some(Displacement {
            dx: unwrap_peak(px, w),
            dy: unwrap_peak(py, h),
            peak,
        })
    }

    /// In-place 2D transform: rows first, then columns through a scratch line.
    fn fft_2d(&self, data: &mut [Complex<f64>], inverse: bool) {
        let (w, h) = (self.width, self.height);
        let (rows, cols) = if inverse {
            (&self.row_inverse, &self.col_inverse)
        } else {
            (&self.row_forward, &self.col_forward)
        };

        for row in data.chunks_exact_mut(w) {
            rows.process(row);
        }

        let mut column = vec![Complex::new(0.0, 0.0); h];
        for x in 0..w {
            for (y, c) in column.iter_mut().enumerate() {
                *c = data[y * w + x];
            }
            cols.process(&mut column);
            for (y, c) in column.iter().enumerate() {
                data[y * w + x] = *c;
            }
        }
    }
}

/// Convenience wrapper planning for the reference frame size.
pub fn phase_correlate(
    reference: &GrayImageView<'_>,
    moved: &GrayImageView<'_>,
) -> Option<Displacement> {
    PhaseCorrelator::new(reference.width, reference.height).correlate(reference, moved)
}

fn to_complex(data: &[u8]) -> Vec<Complex<f64>> {
    data.iter().map(|&v| Complex::new(v as f64, 0.0)).collect()
}

/// Peaks past half the dimension are negative offsets.
#[inline]
fn unwrap_peak(p: usize, dim: usize) -> f64 {
    if p > dim / 2 {
        p as f64 - dim as f64
    } else {
        p as f64
    }
}
