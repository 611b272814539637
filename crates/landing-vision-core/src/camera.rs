//! Pinhole intrinsics with Brown-Conrady distortion.
//!
//! The model is loaded once from a calibration file and shared read-only by
//! every pose solve.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Intrinsic calibration errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("camera matrix bottom row must be [0, 0, 1], got {0:?}")]
    NotAffine([f64; 3]),
    #[error("focal lengths must be finite and non-zero (fx={fx}, fy={fy})")]
    InvalidFocal { fx: f64, fy: f64 },
    #[error("camera matrix contains non-finite values")]
    NonFinite,
    #[error("unsupported distortion model with {0} coefficients (expected 4 or 5)")]
    UnsupportedDistortion(usize),
}

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Build intrinsics from a row-major 3×3 camera matrix.
    pub fn from_matrix(k: [[f64; 3]; 3]) -> Result<Self, CameraModelError> {
        if k.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CameraModelError::NonFinite);
        }
        if k[2] != [0.0, 0.0, 1.0] {
            return Err(CameraModelError::NotAffine(k[2]));
        }
        let intrinsics = Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
            skew: k[0][1],
        };
        if !intrinsics.is_valid() {
            return Err(CameraModelError::InvalidFocal {
                fx: intrinsics.fx,
                fy: intrinsics.fy,
            });
        }
        Ok(intrinsics)
    }

    /// Returns `true` when all entries are finite and focal lengths are non-zero.
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.skew.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// Convert pixel coordinates to normalized pinhole coordinates.
    pub fn pixel_to_normalized(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        if !self.is_valid() {
            return None;
        }
        let y = (pixel.y - self.cy) / self.fy;
        let x = (pixel.x - self.cx - self.skew * y) / self.fx;
        (x.is_finite() && y.is_finite()).then(|| Point2::new(x, y))
    }

    /// Convert normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(&self, normalized: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * normalized.x + self.skew * normalized.y + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
}

impl Distortion {
    /// Parse the conventional `[k1, k2, p1, p2(, k3)]` coefficient vector.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, CameraModelError> {
        if coeffs.iter().any(|v| !v.is_finite()) {
            return Err(CameraModelError::NonFinite);
        }
        match *coeffs {
            [k1, k2, p1, p2] => Ok(Self {
                k1,
                k2,
                p1,
                p2,
                k3: 0.0,
            }),
            [k1, k2, p1, p2, k3] => Ok(Self { k1, k2, p1, p2, k3 }),
            _ => Err(CameraModelError::UnsupportedDistortion(coeffs.len())),
        }
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, distorted: Point2<f64>) -> Option<Point2<f64>> {
        const MAX_ITERS: usize = 20;
        const EPS: f64 = 1e-12;

        let (mut x, mut y) = (distorted.x, distorted.y);
        for _ in 0..MAX_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let dx_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let x_next = (distorted.x - dx_tan) / radial;
            let y_next = (distorted.y - dy_tan) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }
            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step <= EPS {
                break;
            }
        }
        Some(Point2::new(x, y))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Complete camera model (intrinsics + distortion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Distortion,
}

impl CameraModel {
    /// Build a model from a 3×3 camera matrix and a distortion coefficient vector.
    pub fn from_calibration(
        camera_matrix: [[f64; 3]; 3],
        dist_coeffs: &[f64],
    ) -> Result<Self, CameraModelError> {
        Ok(Self {
            intrinsics: CameraIntrinsics::from_matrix(camera_matrix)?,
            distortion: Distortion::from_coeffs(dist_coeffs)?,
        })
    }

    /// Map an observed (distorted) pixel to undistorted normalized coordinates.
    pub fn normalize(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        let distorted = self.intrinsics.pixel_to_normalized(pixel)?;
        if self.distortion.is_zero() {
            return Some(distorted);
        }
        self.distortion.undistort(distorted)
    }

    /// Project a camera-frame point to (distorted) pixel coordinates.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p: Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 1e-12 {
            return None;
        }
        let n = self.distortion.distort(Point2::new(p.x / p.z, p.y / p.z));
        let px = self.intrinsics.normalized_to_pixel(n);
        (px.x.is_finite() && px.y.is_finite()).then_some(px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_camera() -> CameraModel {
        CameraModel::from_calibration(
            [[900.0, 0.0, 640.0], [0.0, 920.0, 360.0], [0.0, 0.0, 1.0]],
            &[-0.12, 0.03, 0.001, -0.0008, 0.0],
        )
        .expect("valid calibration")
    }

    #[test]
    fn rejects_zero_focal() {
        let err =
            CameraIntrinsics::from_matrix([[0.0, 0.0, 1.0], [0.0, 500.0, 1.0], [0.0, 0.0, 1.0]])
                .unwrap_err();
        assert!(matches!(err, CameraModelError::InvalidFocal { .. }));
    }

    #[test]
    fn rejects_projective_bottom_row() {
        let err =
            CameraIntrinsics::from_matrix([[1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.1, 0.0, 1.0]])
                .unwrap_err();
        assert_eq!(err, CameraModelError::NotAffine([0.1, 0.0, 1.0]));
    }

    #[test]
    fn rejects_rational_distortion_models() {
        let err = Distortion::from_coeffs(&[0.0; 8]).unwrap_err();
        assert_eq!(err, CameraModelError::UnsupportedDistortion(8));
        assert_eq!(Distortion::from_coeffs(&[0.1, 0.2, 0.0, 0.0]).unwrap().k3, 0.0);
    }

    #[test]
    fn project_then_normalize_round_trips() {
        let cam = sample_camera();
        for p in [
            Point3::new(0.0, 0.0, 1000.0),
            Point3::new(120.0, -80.0, 900.0),
            Point3::new(-300.0, 200.0, 1500.0),
        ] {
            let px = cam.project(p).expect("in front of camera");
            let n = cam.normalize(px).expect("undistortable");
            assert!((n.x - p.x / p.z).abs() < 1e-9);
            assert!((n.y - p.y / p.z).abs() < 1e-9);
        }
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        assert!(sample_camera().project(Point3::new(0.0, 0.0, -1.0)).is_none());
    }
}
