use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Planar projective transform acting on pixel coordinates: `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Pure translation by `(tx, ty)` pixels.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(Matrix3::new(
            1.0, 0.0, tx, //
            0.0, 1.0, ty, //
            0.0, 0.0, 1.0,
        ))
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        std::array::from_fn(|r| std::array::from_fn(|c| self.h[(r, c)]))
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// `self ∘ inner`: first apply `inner`, then `self`.
    pub fn compose(&self, inner: &Homography) -> Self {
        Self::new(self.h * inner.h)
    }

    /// Reject transforms that cannot describe a physical tile placement:
    /// non-finite entries, near-singular matrices, or orientation flips.
    pub fn is_degenerate(&self) -> bool {
        if self.h.iter().any(|v| !v.is_finite()) {
            return true;
        }
        let s = self.h[(2, 2)];
        if s.abs() < 1e-12 {
            return true;
        }
        let hn = self.h / s;
        let det = hn.determinant();
        if !det.is_finite() || det.abs() < 1e-6 {
            return true;
        }
        // upper-left 2x2 determinant < 0 means the tile would be mirrored
        let det2 = hn[(0, 0)] * hn[(1, 1)] - hn[(0, 1)] * hn[(1, 0)];
        det2 <= 0.0
    }
}

/// Similarity taking a point set to zero centroid and mean radius sqrt(2).
struct Conditioner {
    t: Matrix3<f64>,
}

impl Conditioner {
    fn fit(pts: &[Point2<f32>]) -> Self {
        let n = pts.len() as f64;
        let centroid = pts
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + to_f64(*p))
            / n;
        let spread = pts
            .iter()
            .map(|p| (to_f64(*p) - centroid).norm())
            .sum::<f64>()
            / n;
        let k = if spread > 1e-12 {
            std::f64::consts::SQRT_2 / spread
        } else {
            1.0
        };
        Self {
            t: Matrix3::new(
                k, 0.0, -k * centroid.x, //
                0.0, k, -k * centroid.y, //
                0.0, 0.0, 1.0,
            ),
        }
    }

    fn map(&self, p: Point2<f32>) -> (f64, f64) {
        let v = self.t * Vector3::new(p.x as f64, p.y as f64, 1.0);
        (v.x, v.y)
    }

    /// `dst_t^-1 * hn * src_t`, scaled so `h33 = 1`.
    fn restore(hn: Matrix3<f64>, src: &Self, dst: &Self) -> Option<Homography> {
        let h = dst.t.try_inverse()? * hn * src.t;
        let s = h[(2, 2)];
        (s.abs() >= 1e-12).then(|| Homography::new(h / s))
    }
}

fn to_f64(p: Point2<f32>) -> Vector2<f64> {
    Vector2::new(p.x as f64, p.y as f64)
}

/// Least-squares DLT estimate of H such that `dst ~ H * src`.
///
/// Exactly four correspondences are routed through [`homography_from_4pt`].
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if let (Ok(s), Ok(d)) = (
        <&[Point2<f32>; 4]>::try_from(src),
        <&[Point2<f32>; 4]>::try_from(dst),
    ) {
        return homography_from_4pt(s, d);
    }

    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);

    // two rows per correspondence; h is the null vector of A
    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (k, (&p, &q)) in src.iter().zip(dst).enumerate() {
        let (x, y) = cs.map(p);
        let (u, v) = cd.map(q);
        let ex = [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u];
        let ey = [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v];
        for c in 0..9 {
            a[(2 * k, c)] = ex[c];
            a[(2 * k + 1, c)] = ey[c];
        }
    }

    // thin SVD of a 2N x 9 matrix gives a full 9 x 9 V^T once N >= 5
    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|l, r| l.1.total_cmp(r.1))
        .map(|(i, _)| i)?;
    let null = vt.row(smallest);
    let hn = Matrix3::from_fn(|r, c| null[3 * r + c]);

    Conditioner::restore(hn, &cs, &cd)
}

/// Exact H with `h33 = 1` from four correspondences, `dst ~ H * src`.
///
/// Corner order must match between `src` and `dst`. `None` for singular
/// layouts such as three collinear points.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);

    // unknowns h11..h32; u = (h11 x + h12 y + h13) - u (h31 x + h32 y), same for v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (&p, &q)) in src.iter().zip(dst).enumerate() {
        let (x, y) = cs.map(p);
        let (u, v) = cd.map(q);
        let ex = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y];
        let ey = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y];
        for c in 0..8 {
            a[(2 * k, c)] = ex[c];
            a[(2 * k + 1, c)] = ey[c];
        }
        b[2 * k] = u;
        b[2 * k + 1] = v;
    }

    let sol = a.lu().solve(&b)?;
    if sol.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let hn = Matrix3::from_fn(|r, c| if r == 2 && c == 2 { 1.0 } else { sol[3 * r + c] });
    Conditioner::restore(hn, &cs, &cd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near(a: Point2<f32>, b: Point2<f32>, tol: f32) -> bool {
        (a - b).norm() < tol
    }

    fn assert_close(a: Point2<f32>, b: Point2<f32>, tol: f32) {
        assert!(near(a, b, tol), "{a:?} vs {b:?} (tol {tol})");
    }

    #[test]
    fn chained_offsets_compose_and_invert() {
        // canvas <- left neighbor <- new tile, each 80 px to the right
        let canvas_from_left = Homography::translation(80.0, 0.0);
        let left_from_new = Homography::translation(80.0, 1.5);
        let canvas_from_new = canvas_from_left.compose(&left_from_new);
        assert_close(
            canvas_from_new.apply(Point2::new(0.0, 0.0)),
            Point2::new(160.0, 1.5),
            1e-4,
        );

        let back = canvas_from_new.inverse().expect("invertible");
        for p in [Point2::new(3.0_f32, 4.0), Point2::new(159.0, 119.0)] {
            assert_close(back.apply(canvas_from_new.apply(p)), p, 1e-3);
        }
    }

    #[test]
    fn four_corners_recover_a_keystoned_tile() {
        let truth = Homography::from_array([
            [1.02, 0.01, 40.0],
            [-0.015, 0.98, 25.0],
            [2e-4, -1e-4, 1.0],
        ]);
        let src = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(160.0, 0.0),
            Point2::new(160.0, 120.0),
            Point2::new(0.0, 120.0),
        ];
        let dst = src.map(|p| truth.apply(p));

        let fit = homography_from_4pt(&src, &dst).expect("solvable");
        for p in [Point2::new(80.0_f32, 60.0), Point2::new(12.0, 101.0)] {
            assert_close(fit.apply(p), truth.apply(p), 1e-3);
        }
        let a = fit.to_array();
        assert!((a[2][2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dlt_recovers_tile_offset() {
        let shift = Homography::translation(-96.0, 3.5);
        let src: Vec<Point2<f32>> = (0..4)
            .flat_map(|y| (0..4).map(move |x| Point2::new(x as f32 * 37.0, y as f32 * 29.0)))
            .collect();
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| shift.apply(p)).collect();

        let estimated = estimate_homography(&src, &dst).expect("estimate");
        assert_close(
            estimated.apply(Point2::new(10.0, 10.0)),
            Point2::new(-86.0, 13.5),
            1e-3,
        );
        assert!(!estimated.is_degenerate());
    }

    #[test]
    fn mirrored_transform_is_degenerate() {
        let mirror = Homography::from_array([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(mirror.is_degenerate());
        assert!(!Homography::identity().is_degenerate());
    }

    #[test]
    fn mismatched_input_lengths_fail() {
        let src = [Point2::new(0.0_f32, 0.0); 4];
        let dst = [Point2::new(1.0_f32, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
    }
}
