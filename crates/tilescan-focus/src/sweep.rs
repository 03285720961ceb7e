use serde::{Deserialize, Serialize};

/// One scored focus height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FocusSample {
    pub z: f64,
    pub sharpness: f64,
}

/// Heights `center - range/2, ..., center + range/2` spaced by `step`.
///
/// Both ends are included when `range` is a multiple of `step`.
pub fn stepped_heights(center: f64, range: f64, step: f64) -> Vec<f64> {
    if step.is_nan() || step <= 0.0 || range.is_nan() || range < 0.0 {
        return vec![center];
    }
    let count = (range / step + 1e-9).floor() as usize + 1;
    let start = center - range / 2.0;
    (0..count).map(|i| start + i as f64 * step).collect()
}

/// `count` heights spread evenly over `[center - range/2, center + range/2]`.
pub fn spread_heights(center: f64, range: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![center],
        n => {
            let start = center - range / 2.0;
            let step = range / (n - 1) as f64;
            (0..n).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// Best sample of a sweep together with whatever the evaluator kept for it.
#[derive(Clone, Debug)]
pub struct SweepOutcome<T> {
    pub best: FocusSample,
    pub payload: T,
    pub samples: Vec<FocusSample>,
}

/// Score every height in order and keep the maximum.
///
/// Ties keep the earliest height; no interpolation between samples. The
/// evaluator returns the score plus a payload (typically the frame) that is
/// retained only for the current best. Returns `Ok(None)` for an empty
/// height list.
pub fn sweep<T, E>(
    heights: &[f64],
    mut evaluate: impl FnMut(f64) -> Result<(f64, T), E>,
) -> Result<Option<SweepOutcome<T>>, E> {
    let mut samples = Vec::with_capacity(heights.len());
    let mut best: Option<(FocusSample, T)> = None;
    for &z in heights {
        let (sharpness, payload) = evaluate(z)?;
        log::debug!("z={z:.3}: sharpness={sharpness:.1}");
        let sample = FocusSample { z, sharpness };
        samples.push(sample);
        let better = match &best {
            Some((b, _)) => sharpness > b.sharpness,
            None => true,
        };
        if better {
            best = Some((sample, payload));
        }
    }
    Ok(best.map(|(best, payload)| SweepOutcome {
        best,
        payload,
        samples,
    }))
}

/// First sample with the maximum score.
pub fn select_best(samples: &[FocusSample]) -> Option<FocusSample> {
    samples.iter().copied().fold(None, |acc, s| match acc {
        Some(b) if s.sharpness <= b.sharpness => Some(b),
        _ => Some(s),
    })
}
