//! Plane-to-image homographies for square markers.

use nalgebra::{DMatrix, Matrix2, Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};

/// Planar projective map `p_dst ~ H * p_src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        Point2::new(v[0] / w, v[1] / w)
    }

    /// Jacobian of [`Homography::apply`] at `p`.
    ///
    /// Returns `None` when `p` maps to the line at infinity.
    pub fn jacobian_at(&self, p: Point2<f64>) -> Option<Matrix2<f64>> {
        let h = &self.h;
        let w = h[(2, 0)] * p.x + h[(2, 1)] * p.y + h[(2, 2)];
        if w.abs() < 1e-12 {
            return None;
        }
        let q = self.apply(p);
        Some(
            Matrix2::new(
                h[(0, 0)] - h[(2, 0)] * q.x,
                h[(0, 1)] - h[(2, 1)] * q.x,
                h[(1, 0)] - h[(2, 0)] * q.y,
                h[(1, 1)] - h[(2, 1)] * q.y,
            ) / w,
        )
    }
}

/// Similarity that moves a point set to zero mean and `sqrt(2)` mean radius,
/// keeping the linear solves well conditioned for pixel-scale inputs.
#[derive(Clone, Copy, Debug)]
struct Conditioner {
    centre: Vector2<f64>,
    scale: f64,
}

impl Conditioner {
    fn fit(points: &[Point2<f64>]) -> Option<Self> {
        let n = points.len() as f64;
        let centre = points.iter().map(|p| p.coords).sum::<Vector2<f64>>() / n;
        let radius = points.iter().map(|p| (p.coords - centre).norm()).sum::<f64>() / n;
        (radius > 1e-12 && radius.is_finite()).then(|| Self {
            centre,
            scale: std::f64::consts::SQRT_2 / radius,
        })
    }

    #[inline]
    fn apply(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from((p.coords - self.centre) * self.scale)
    }

    fn matrix(&self) -> Matrix3<f64> {
        let (s, c) = (self.scale, self.centre);
        Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0)
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let (k, c) = (1.0 / self.scale, self.centre);
        Matrix3::new(k, 0.0, c.x, 0.0, k, c.y, 0.0, 0.0, 1.0)
    }

    /// Undo both conditioners and fix the scale so `h[(2, 2)] == 1`.
    fn restore(src: &Self, dst: &Self, hn: Matrix3<f64>) -> Option<Homography> {
        let h = dst.inverse_matrix() * hn * src.matrix();
        let w = h[(2, 2)];
        (w.abs() > 1e-12 && h.iter().all(|v| v.is_finite())).then(|| Homography::new(h / w))
    }
}

/// Two DLT rows for `(x, y) -> (u, v)`, unknowns ordered row-major.
fn dlt_rows(s: Point2<f64>, d: Point2<f64>) -> [[f64; 9]; 2] {
    let (x, y, u, v) = (s.x, s.y, d.x, d.y);
    [
        [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u],
        [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v],
    ]
}

/// Estimate H such that `dst ~ H * src` from four or more correspondences.
///
/// Exactly four points use the closed-form solve; more points use the
/// normalized DLT.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if let (Ok(s), Ok(d)) = (<&[_; 4]>::try_from(src), <&[_; 4]>::try_from(dst)) {
        return homography_from_4pt(s, d);
    }

    let (cs, cd) = (Conditioner::fit(src)?, Conditioner::fit(dst)?);
    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        for (r, row) in dlt_rows(cs.apply(s), cd.apply(d)).iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                a[(2 * k + r, c)] = value;
            }
        }
    }

    // Null vector of A: right singular vector of the smallest singular value.
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let h = v_t.row(smallest);
    let hn = Matrix3::from_iterator(h.iter().copied()).transpose();
    Conditioner::restore(&cs, &cd, hn)
}

/// Compute H such that `dst ~ H * src` from exactly 4 correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Fixes
/// `h33 = 1` and solves the remaining 8 unknowns directly.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let (cs, cd) = (Conditioner::fit(src)?, Conditioner::fit(dst)?);
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        for (r, row) in dlt_rows(cs.apply(s), cd.apply(d)).iter().enumerate() {
            for (c, &value) in row[..8].iter().enumerate() {
                a[(2 * k + r, c)] = value;
            }
            b[2 * k + r] = -row[8];
        }
    }
    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
    Conditioner::restore(&cs, &cd, hn)
}
