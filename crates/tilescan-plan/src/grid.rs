use serde::{Deserialize, Serialize};
use tilescan_core::StagePosition;

/// One planned capture position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileTarget {
    pub column: usize,
    pub row: usize,
    pub x: f64,
    pub y: f64,
    /// Expected focus height; `None` leaves the focus axis where it is.
    pub focus_z: Option<f64>,
}

impl TileTarget {
    pub fn has_expected_focus(&self) -> bool {
        self.focus_z.is_some()
    }

    /// Full stage position, using `fallback_z` when no focus height is planned.
    pub fn position(&self, fallback_z: f64) -> StagePosition {
        StagePosition::new(self.x, self.y, self.focus_z.unwrap_or(fallback_z))
    }
}

/// Row-major grid of capture targets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    pub columns: usize,
    pub rows: usize,
    /// Nominal spacing between neighboring targets.
    pub step_x: f64,
    pub step_y: f64,
    pub targets: Vec<TileTarget>,
}

impl TileGrid {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, column: usize, row: usize) -> Option<&TileTarget> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.targets.get(row * self.columns + column)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TileTarget> {
        self.targets.iter()
    }

    /// Indices of the four extreme targets for a quick coverage check:
    /// first, end of the first row, last, start of the last row.
    ///
    /// Duplicates collapse for single-row or single-column grids.
    pub fn spot_check_indices(&self) -> Vec<usize> {
        let total = self.targets.len();
        if total == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(4);
        for idx in [
            0,
            self.columns.saturating_sub(1),
            total - 1,
            total.saturating_sub(self.columns),
        ] {
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a TileGrid {
    type Item = &'a TileTarget;
    type IntoIter = std::slice::Iter<'a, TileTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}
