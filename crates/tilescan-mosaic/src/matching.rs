//! Brute-force Hamming matching with a mutual (cross-check) filter.

use crate::features::Descriptor;

/// A descriptor correspondence `query[query_idx] <-> train[train_idx]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

/// Index and distance of the nearest descriptor; ties keep the lowest index.
fn nearest(d: &Descriptor, set: &[Descriptor]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, cand) in set.iter().enumerate() {
        let dist = d.distance(cand);
        match best {
            Some((_, b)) if dist >= b => {}
            _ => {
                best = Some((i, dist));
                if dist == 0 {
                    break;
                }
            }
        }
    }
    best
}

/// One-to-one matches where each descriptor is the other's nearest neighbor.
///
/// Results are ordered by query index.
pub fn mutual_matches(query: &[Descriptor], train: &[Descriptor]) -> Vec<Match> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }
    let backward: Vec<Option<usize>> = train
        .iter()
        .map(|t| nearest(t, query).map(|(i, _)| i))
        .collect();

    query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, distance) = nearest(q, train)?;
            (backward[ti] == Some(qi)).then_some(Match {
                query_idx: qi,
                train_idx: ti,
                distance,
            })
        })
        .collect()
}
