use landing_vision_core::CameraModel;
use nalgebra::{Point2, Point3, Rotation3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::ippe::{check_correspondence, solve_planar};
use crate::PoseSolveError;

/// Camera-relative pose of one marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerPose {
    /// Axis-angle rotation, marker → camera.
    pub rvec: Vector3<f64>,
    /// Marker origin in the camera frame, in the object units (millimeters).
    pub tvec: Vector3<f64>,
    /// RMS corner reprojection error in pixels.
    pub reprojection_rmse_px: f64,
}

/// Square-marker pose estimator bound to one calibrated camera.
#[derive(Clone, Debug)]
pub struct PoseEstimator {
    camera: CameraModel,
}

impl PoseEstimator {
    pub fn new(camera: CameraModel) -> Self {
        Self { camera }
    }

    #[inline]
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Solve the pose of a square marker from its four detected corners.
    ///
    /// `reference` and `corners` must use the same corner order.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn estimate(
        &self,
        reference: &[Point3<f64>; 4],
        corners: &[Point2<f64>; 4],
    ) -> Result<MarkerPose, PoseSolveError> {
        self.estimate_correspondences(reference, corners)
    }

    /// Solve from an arbitrary planar correspondence set in pixel coordinates.
    pub fn estimate_correspondences(
        &self,
        object: &[Point3<f64>],
        pixels: &[Point2<f64>],
    ) -> Result<MarkerPose, PoseSolveError> {
        if object.len() != pixels.len() {
            return Err(PoseSolveError::MismatchedLengths {
                object: object.len(),
                image: pixels.len(),
            });
        }
        if pixels.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(PoseSolveError::NonFinite);
        }
        check_correspondence(pixels)?;

        let normalized = pixels
            .iter()
            .enumerate()
            .map(|(i, &p)| self.camera.normalize(p).ok_or(PoseSolveError::Undistort(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let solution = solve_planar(object, &normalized)?;
        let best = solution.best;
        log::trace!(
            "ippe candidates: rmse {:.3e} vs {:.3e}",
            best.rmse,
            solution.alternative.rmse
        );

        let rvec = best.rotation.scaled_axis();
        let reprojection_rmse_px =
            self.reprojection_rmse_px(&rvec, &best.translation, object, pixels);
        Ok(MarkerPose {
            rvec,
            tvec: best.translation,
            reprojection_rmse_px,
        })
    }

    fn reprojection_rmse_px(
        &self,
        rvec: &Vector3<f64>,
        tvec: &Vector3<f64>,
        object: &[Point3<f64>],
        pixels: &[Point2<f64>],
    ) -> f64 {
        let r = Rotation3::from_scaled_axis(*rvec);
        let mut sum = 0.0;
        for (x, px) in object.iter().zip(pixels) {
            let Some(p) = self.camera.project(Point3::from(r * x.coords + tvec)) else {
                return f64::INFINITY;
            };
            sum += (p - px).norm_squared();
        }
        (sum / object.len().max(1) as f64).sqrt()
    }
}
