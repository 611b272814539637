//! Marker reference geometry and rotation decomposition.

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

/// Below this `sqrt(r00² + r10²)` the roll/yaw decomposition is treated as
/// gimbal-locked.
pub const GIMBAL_LOCK_EPS: f64 = 1e-6;

/// 3D corners of a centered square marker with edge length `size`, on Z = 0.
///
/// Order is left-bottom, right-bottom, right-top, left-top, matching the
/// detector's corner order.
pub fn reference_corners(size: f64) -> [Point3<f64>; 4] {
    let h = size / 2.0;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// Rotation matrix for an axis-angle (Rodrigues) vector.
#[inline]
pub fn rotation_matrix(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(*rvec).into_inner()
}

/// Roll, pitch, yaw in degrees for an axis-angle rotation vector.
pub fn euler_from_rotation(rvec: &Vector3<f64>) -> [f64; 3] {
    euler_from_matrix(&rotation_matrix(rvec))
}

/// Roll, pitch, yaw in degrees for a rotation matrix.
///
/// At the singularity yaw is forced to zero and roll absorbs the remaining
/// rotation about the vertical axis.
pub fn euler_from_matrix(r: &Matrix3<f64>) -> [f64; 3] {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();
    let singular = sy < GIMBAL_LOCK_EPS;

    let (x, y, z) = if !singular {
        (
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        (
            (-r[(1, 2)]).atan2(r[(1, 1)]),
            (-r[(2, 0)]).atan2(sy),
            0.0,
        )
    };

    [x.to_degrees(), y.to_degrees(), z.to_degrees()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn reference_corners_follow_detector_order() {
        let c = reference_corners(120.0);
        assert_eq!(c[0], Point3::new(-60.0, 60.0, 0.0));
        assert_eq!(c[1], Point3::new(60.0, 60.0, 0.0));
        assert_eq!(c[2], Point3::new(60.0, -60.0, 0.0));
        assert_eq!(c[3], Point3::new(-60.0, -60.0, 0.0));
    }

    #[test]
    fn identity_has_zero_angles() {
        assert_eq!(euler_from_rotation(&Vector3::zeros()), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn recovers_composed_angles() {
        let (roll, pitch, yaw) = (10.0_f64, -20.0_f64, 30.0_f64);
        let r = Rotation3::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians());
        let out = euler_from_rotation(&r.scaled_axis());
        assert_relative_eq!(out[0], roll, epsilon = 1e-9);
        assert_relative_eq!(out[1], pitch, epsilon = 1e-9);
        assert_relative_eq!(out[2], yaw, epsilon = 1e-9);
    }

    #[test]
    fn singular_branch_forces_zero_yaw() {
        // pitch = +90°: r00 = r10 = 0
        let r = Matrix3::new(
            0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, //
            -1.0, 0.0, 0.0,
        );
        let [roll, pitch, yaw] = euler_from_matrix(&r);
        assert_eq!(yaw, 0.0);
        assert_relative_eq!(pitch, 90.0, epsilon = 1e-12);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_branch_from_rotation_vector() {
        // yaw then pitch to +90°: the yaw must fold into roll
        let r = Rotation3::from_euler_angles(0.0, FRAC_PI_2, 0.4);
        let [roll, pitch, yaw] = euler_from_rotation(&r.scaled_axis());
        assert_eq!(yaw, 0.0);
        assert_relative_eq!(pitch, 90.0, epsilon = 1e-4);
        assert!(roll.is_finite());
    }
}
