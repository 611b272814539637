//! Infinitesimal plane-based pose estimation (IPPE).
//!
//! Recovers the pose of a planar target from four or more correspondences
//! in normalized pinhole coordinates. The homography Jacobian at the target
//! centroid fixes the rotation up to a two-fold ambiguity; translation is
//! then a linear least-squares problem, and the two candidates are ranked
//! by reprojection error.

use landing_vision_core::{estimate_homography, Homography};
use nalgebra::{Matrix2, Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};

use crate::PoseSolveError;

/// Relative tolerance for coincident and colinear corners.
const DEGENERACY_TOL: f64 = 1e-6;

/// One rigid pose candidate: `x_cam = rotation * x_obj + translation`.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanarPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// RMS reprojection error in normalized image units.
    pub rmse: f64,
}

/// Both IPPE candidates, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct IppeSolution {
    pub best: PlanarPose,
    pub alternative: PlanarPose,
}

/// Reject coincident points and, for four-point sets, colinear triples.
pub fn check_correspondence(points: &[Point2<f64>]) -> Result<(), PoseSolveError> {
    let extent = points
        .iter()
        .flat_map(|a| points.iter().map(move |b| (a - b).norm()))
        .fold(0.0_f64, f64::max);

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if (points[i] - points[j]).norm() <= DEGENERACY_TOL * extent {
                return Err(PoseSolveError::DuplicateCorners(i, j));
            }
        }
    }

    if points.len() == 4 {
        for (i, j, k) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
            let ab = points[j] - points[i];
            let ac = points[k] - points[i];
            let cross = ab.x * ac.y - ab.y * ac.x;
            if cross.abs() <= DEGENERACY_TOL * ab.norm() * ac.norm() {
                return Err(PoseSolveError::ColinearCorners(i, j, k));
            }
        }
    }
    Ok(())
}

/// Solve the pose of a planar (Z = 0) target from normalized image points.
pub fn solve_planar(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Result<IppeSolution, PoseSolveError> {
    if object.len() != image.len() {
        return Err(PoseSolveError::MismatchedLengths {
            object: object.len(),
            image: image.len(),
        });
    }
    if object.len() < 4 {
        return Err(PoseSolveError::InsufficientCorrespondences {
            required: 4,
            actual: object.len(),
        });
    }
    let finite = object.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
        && image.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
    if !finite {
        return Err(PoseSolveError::NonFinite);
    }
    if object.iter().any(|p| p.z.abs() > 1e-9) {
        return Err(PoseSolveError::NonPlanar);
    }

    let plane: Vec<Point2<f64>> = object.iter().map(|p| p.xy()).collect();
    check_correspondence(&plane)?;
    check_correspondence(image)?;

    // Centre the plane so the Jacobian is evaluated at the target centroid.
    let centroid = plane
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.coords)
        / plane.len() as f64;
    let centred: Vec<Point2<f64>> = plane
        .iter()
        .map(|p| Point2::from(p.coords - centroid))
        .collect();

    let h = estimate_homography(&centred, image).ok_or(PoseSolveError::DegenerateHomography)?;
    let [r1, r2] = candidate_rotations(&h)?;

    let mut candidates = [r1, r2].map(|rotation| {
        let translation = solve_translation(&rotation, object, image);
        let rmse = translation
            .map(|t| reprojection_rmse(&rotation, &t, object, image))
            .unwrap_or(f64::INFINITY);
        PlanarPose {
            rotation,
            translation: translation.unwrap_or_else(Vector3::zeros),
            rmse,
        }
    });
    if candidates[1].rmse < candidates[0].rmse {
        candidates.swap(0, 1);
    }
    let [best, alternative] = candidates;

    if !best.rmse.is_finite() {
        return Err(PoseSolveError::DegenerateHomography);
    }
    if best.translation.z <= 0.0 {
        return Err(PoseSolveError::BehindCamera);
    }
    Ok(IppeSolution { best, alternative })
}

/// The two rotations consistent with the homography Jacobian at the origin.
fn candidate_rotations(h: &Homography) -> Result<[Rotation3<f64>; 2], PoseSolveError> {
    let origin = Point2::origin();
    let v = h.apply(origin);
    let j = h
        .jacobian_at(origin)
        .ok_or(PoseSolveError::DegenerateHomography)?;
    if !v.x.is_finite() || !v.y.is_finite() {
        return Err(PoseSolveError::DegenerateHomography);
    }

    // Rv rotates the optical axis onto the viewing ray through v.
    let ray = Vector3::new(v.x, v.y, 1.0).normalize();
    let rv = Rotation3::rotation_between(&Vector3::z(), &ray)
        .unwrap_or_else(Rotation3::identity)
        .into_inner();

    let b = Matrix2::new(
        rv[(0, 0)] - v.x * rv[(2, 0)],
        rv[(0, 1)] - v.x * rv[(2, 1)],
        rv[(1, 0)] - v.y * rv[(2, 0)],
        rv[(1, 1)] - v.y * rv[(2, 1)],
    );
    let a = b.try_inverse().ok_or(PoseSolveError::DegenerateHomography)? * j;

    let ata00 = a[(0, 0)] * a[(0, 0)] + a[(1, 0)] * a[(1, 0)];
    let ata01 = a[(0, 0)] * a[(0, 1)] + a[(1, 0)] * a[(1, 1)];
    let ata11 = a[(0, 1)] * a[(0, 1)] + a[(1, 1)] * a[(1, 1)];
    let gamma = (0.5 * (ata00 + ata11 + ((ata00 - ata11).powi(2) + 4.0 * ata01 * ata01).sqrt()))
        .sqrt();
    if !gamma.is_finite() || gamma < 1e-12 {
        return Err(PoseSolveError::DegenerateHomography);
    }

    let r = a / gamma;
    let b0 = (1.0 - r[(0, 0)].powi(2) - r[(1, 0)].powi(2)).max(0.0).sqrt();
    let mut b1 = (1.0 - r[(0, 1)].powi(2) - r[(1, 1)].powi(2)).max(0.0).sqrt();
    let sp = -(r[(0, 0)] * r[(0, 1)] + r[(1, 0)] * r[(1, 1)]);
    if sp < 0.0 {
        b1 = -b1;
    }

    let complete = |b0: f64, b1: f64| {
        let c1 = Vector3::new(r[(0, 0)], r[(1, 0)], b0);
        let c2 = Vector3::new(r[(0, 1)], r[(1, 1)], b1);
        let c3 = c1.cross(&c2);
        Rotation3::from_matrix(&(rv * Matrix3::from_columns(&[c1, c2, c3])))
    };

    Ok([complete(b0, b1), complete(-b0, -b1)])
}

/// Least-squares translation for a fixed rotation.
fn solve_translation(
    rotation: &Rotation3<f64>,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Option<Vector3<f64>> {
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for (x, u) in object.iter().zip(image) {
        let rx = rotation * x.coords;
        let rows = [
            (Vector3::new(1.0, 0.0, -u.x), u.x * rx.z - rx.x),
            (Vector3::new(0.0, 1.0, -u.y), u.y * rx.z - rx.y),
        ];
        for (a, b) in rows {
            ata += a * a.transpose();
            atb += a * b;
        }
    }
    ata.lu().solve(&atb)
}

fn reprojection_rmse(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> f64 {
    let mut sum = 0.0;
    for (x, u) in object.iter().zip(image) {
        let p = rotation * x.coords + translation;
        if p.z <= 0.0 {
            return f64::INFINITY;
        }
        sum += (Point2::new(p.x / p.z, p.y / p.z) - u).norm_squared();
    }
    (sum / object.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use landing_vision_core::reference_corners;

    fn project(r: &Rotation3<f64>, t: &Vector3<f64>, pts: &[Point3<f64>]) -> Vec<Point2<f64>> {
        pts.iter()
            .map(|x| {
                let p = r * x.coords + t;
                Point2::new(p.x / p.z, p.y / p.z)
            })
            .collect()
    }

    #[test]
    fn recovers_oblique_pose_exactly() {
        let obj = reference_corners(120.0);
        let r = Rotation3::from_euler_angles(0.3, -0.2, 0.9);
        let t = Vector3::new(40.0, -25.0, 750.0);
        let img = project(&r, &t, &obj);

        let sol = solve_planar(&obj, &img).expect("solvable");
        assert!(sol.best.rmse < 1e-9);
        assert!(sol.best.rotation.angle_to(&r) < 1e-8);
        assert!((sol.best.translation - t).norm() < 1e-6);
        assert!(sol.alternative.rmse >= sol.best.rmse);
    }

    #[test]
    fn fronto_parallel_pose_is_identity() {
        let obj = reference_corners(40.0);
        let t = Vector3::new(0.0, 0.0, 500.0);
        let img = project(&Rotation3::identity(), &t, &obj);

        let sol = solve_planar(&obj, &img).expect("solvable");
        assert!(sol.best.rotation.angle() < 1e-8);
        assert!((sol.best.translation - t).norm() < 1e-6);
    }

    #[test]
    fn off_centre_planar_targets_are_supported() {
        let obj: Vec<Point3<f64>> = [
            (0.0, 0.0),
            (100.0, 0.0),
            (100.0, 60.0),
            (0.0, 60.0),
            (50.0, 30.0),
        ]
        .iter()
        .map(|&(x, y)| Point3::new(x, y, 0.0))
        .collect();
        let r = Rotation3::from_euler_angles(-0.1, 0.25, -0.5);
        let t = Vector3::new(-60.0, 10.0, 900.0);
        let img = project(&r, &t, &obj);

        let sol = solve_planar(&obj, &img).expect("solvable");
        assert!(sol.best.rotation.angle_to(&r) < 1e-8);
        assert!((sol.best.translation - t).norm() < 1e-6);
    }

    #[test]
    fn rejects_coincident_corners() {
        let obj = reference_corners(100.0);
        let img = [
            Point2::new(0.1, 0.1),
            Point2::new(0.2, 0.1),
            Point2::new(0.2, 0.1),
            Point2::new(0.1, 0.2),
        ];
        assert_eq!(
            solve_planar(&obj, &img).unwrap_err(),
            PoseSolveError::DuplicateCorners(1, 2)
        );
    }

    #[test]
    fn rejects_colinear_corners() {
        let obj = reference_corners(100.0);
        let img = [
            Point2::new(0.0, 0.0),
            Point2::new(0.1, 0.1),
            Point2::new(0.2, 0.2),
            Point2::new(0.0, 0.2),
        ];
        assert_eq!(
            solve_planar(&obj, &img).unwrap_err(),
            PoseSolveError::ColinearCorners(0, 1, 2)
        );
    }

    #[test]
    fn rejects_short_and_mismatched_inputs() {
        let obj = reference_corners(100.0);
        let img = [Point2::new(0.0, 0.0); 3];
        assert_eq!(
            solve_planar(&obj[..3], &img).unwrap_err(),
            PoseSolveError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            }
        );
        assert!(matches!(
            solve_planar(&obj, &img).unwrap_err(),
            PoseSolveError::MismatchedLengths { object: 4, image: 3 }
        ));
    }

    #[test]
    fn rejects_non_planar_objects() {
        let mut obj = reference_corners(100.0);
        obj[2].z = 5.0;
        let img = project(&Rotation3::identity(), &Vector3::new(0.0, 0.0, 500.0), &obj);
        assert_eq!(solve_planar(&obj, &img).unwrap_err(), PoseSolveError::NonPlanar);
    }
}
